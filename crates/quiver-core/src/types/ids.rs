//! Interned identifiers used across the cluster.
//!
//! Labels, property keys and edge types are interned to small integer ids by
//! the [`NameRegistry`](crate::registry::NameRegistry); storage and wire
//! messages only ever carry the ids.

use serde::{Deserialize, Serialize};

macro_rules! interned_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(u32);

        impl $name {
            /// Creates an id from its raw value.
            #[inline]
            #[must_use]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Returns the raw value.
            #[inline]
            #[must_use]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

interned_id! {
    /// An interned vertex label.
    LabelId
}

interned_id! {
    /// An interned property key.
    PropertyId
}

interned_id! {
    /// An interned edge type.
    EdgeTypeId
}

/// A worker's id within the cluster.
///
/// Worker 0 is the master. Ids must fit in the address tag bits, so at most
/// [`WorkerId::MAX_WORKERS`] workers are addressable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(u16);

impl WorkerId {
    /// The number of addressable workers (10 tag bits).
    pub const MAX_WORKERS: u16 = 1 << 10;

    /// The master's worker id.
    pub const MASTER: Self = Self(0);

    /// Creates a worker id.
    ///
    /// # Panics
    ///
    /// Panics if `raw` does not fit in the address tag bits.
    #[inline]
    #[must_use]
    pub fn new(raw: u16) -> Self {
        assert!(raw < Self::MAX_WORKERS, "worker id out of range");
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns `true` if this is the master.
    #[inline]
    #[must_use]
    pub const fn is_master(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "W{}", self.0)
    }
}

/// A worker-local graph element id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Gid(u64);

impl Gid {
    /// The number of bits a gid occupies inside a [`GlobalAddress`].
    ///
    /// [`GlobalAddress`]: crate::types::address::GlobalAddress
    pub const BITS: u32 = 54;

    /// Creates a gid from its raw value.
    ///
    /// # Panics
    ///
    /// Panics if `raw` does not fit in [`Gid::BITS`] bits.
    #[inline]
    #[must_use]
    pub fn new(raw: u64) -> Self {
        assert!(raw < (1 << Self::BITS), "gid out of range");
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Gid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A transaction id, allocated by the master's transaction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// A transaction-local command id.
///
/// Advancing the command makes prior same-transaction mutations visible
/// under the OLD view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommandId(pub u64);

impl CommandId {
    /// The first command of a transaction.
    pub const FIRST: Self = Self(1);

    /// Returns the next command id.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Identifies a dispatched sub-plan on the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlanId(pub u64);

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "plan{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_ids_roundtrip() {
        let label = LabelId::new(7);
        assert_eq!(label.raw(), 7);
        assert_eq!(LabelId::new(7), label);
        assert_ne!(LabelId::new(8), label);
    }

    #[test]
    fn worker_id_master() {
        assert!(WorkerId::MASTER.is_master());
        assert!(!WorkerId::new(1).is_master());
    }

    #[test]
    #[should_panic(expected = "worker id out of range")]
    fn worker_id_out_of_range() {
        let _ = WorkerId::new(WorkerId::MAX_WORKERS);
    }

    #[test]
    fn command_id_advances() {
        assert_eq!(CommandId::FIRST.next(), CommandId(2));
    }
}
