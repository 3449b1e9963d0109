//! Global addressing of graph elements.

use serde::{Deserialize, Serialize};

use super::ids::{Gid, WorkerId};

/// A tagged 64-bit address of a vertex or edge anywhere in the cluster.
///
/// The high 10 bits carry the owning worker's id, the low 54 bits the
/// worker-local gid. An address is *local* to a worker when the tag bits
/// match that worker's id; otherwise it is a remote reference that the
/// per-transaction `DataManager` can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalAddress(u64);

impl GlobalAddress {
    /// Creates an address from an owner and a gid.
    #[inline]
    #[must_use]
    pub fn new(worker: WorkerId, gid: Gid) -> Self {
        Self((u64::from(worker.raw()) << Gid::BITS) | gid.raw())
    }

    /// The worker owning the addressed element.
    #[inline]
    #[must_use]
    pub fn worker(self) -> WorkerId {
        WorkerId::new((self.0 >> Gid::BITS) as u16)
    }

    /// The worker-local id of the addressed element.
    #[inline]
    #[must_use]
    pub fn gid(self) -> Gid {
        Gid::new(self.0 & ((1 << Gid::BITS) - 1))
    }

    /// Returns `true` when the element lives on the given worker.
    #[inline]
    #[must_use]
    pub fn is_local(self, worker: WorkerId) -> bool {
        self.worker() == worker
    }

    /// The raw tagged word.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for GlobalAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.worker(), self.gid())
    }
}
