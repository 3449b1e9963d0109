//! Version chains and MVCC visibility.
//!
//! Every vertex and edge is a chain of immutable-once-superseded versions.
//! A version carries the transaction and command that created it and,
//! optionally, the transaction and command that deleted it. Visibility is
//! decided against the reading transaction's snapshot and command clock:
//!
//! - versions created by a transaction committed before the reader's
//!   snapshot are visible;
//! - versions created by the reader itself are visible under the NEW view
//!   from the creating command onwards, and under the OLD view only from
//!   the *following* command (this is what `advance_command` exposes);
//! - deletions mirror the creation rule.
//!
//! Chains also carry the record-level write lock: the first writer wins,
//! later concurrent writers wait briefly and then fail.

use quiver_core::{CommandId, TxId};
use serde::{Deserialize, Serialize};

/// Which MVCC state of a record an accessor observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum View {
    /// The state as of the start of the current command.
    Old,
    /// The state including the current command's own writes.
    New,
}

/// The `(transaction, command)` stamp on a version boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStamp {
    /// The transaction that produced the boundary.
    pub tx: TxId,
    /// The transaction-local command that produced it.
    pub cmd: CommandId,
}

impl VersionStamp {
    /// Creates a stamp.
    #[inline]
    #[must_use]
    pub const fn new(tx: TxId, cmd: CommandId) -> Self {
        Self { tx, cmd }
    }

    /// Whether this boundary is visible to a reader at `(tx, cmd)` under
    /// `view`, given the reader's snapshot predicate for foreign
    /// transactions.
    pub fn visible_to(
        self,
        tx: TxId,
        cmd: CommandId,
        view: View,
        sees_committed: impl Fn(TxId) -> bool,
    ) -> bool {
        if self.tx == tx {
            match view {
                View::Old => self.cmd < cmd,
                View::New => self.cmd <= cmd,
            }
        } else {
            sees_committed(self.tx)
        }
    }
}

/// One version of a record.
#[derive(Debug, Clone)]
pub struct Version<T> {
    /// The creating boundary.
    pub created: VersionStamp,
    /// The deleting boundary, if the record was deleted.
    pub deleted: Option<VersionStamp>,
    /// The record payload.
    pub data: T,
}

/// A record's version chain, newest version last.
#[derive(Debug)]
pub struct VersionChain<T> {
    versions: Vec<Version<T>>,
    /// The uncommitted writer currently holding this record, if any.
    lock: Option<TxId>,
}

impl<T: Clone> VersionChain<T> {
    /// Creates a chain with a single version created at `stamp` and locks
    /// it for the creating transaction.
    #[must_use]
    pub fn create(stamp: VersionStamp, data: T) -> Self {
        Self { versions: vec![Version { created: stamp, deleted: None, data }], lock: Some(stamp.tx) }
    }

    /// The transaction currently holding the record lock.
    #[inline]
    #[must_use]
    pub fn lock_holder(&self) -> Option<TxId> {
        self.lock
    }

    /// Takes or confirms the record lock for `tx`.
    ///
    /// The caller must have established that any previous holder is no
    /// longer active.
    pub fn acquire_lock(&mut self, tx: TxId) {
        self.lock = Some(tx);
    }

    /// Releases the lock if `tx` holds it.
    pub fn release_lock(&mut self, tx: TxId) {
        if self.lock == Some(tx) {
            self.lock = None;
        }
    }

    /// Finds the version visible to a reader at `(tx, cmd)` under `view`.
    ///
    /// Returns `None` when no version is visible, which covers both
    /// never-visible records and records whose visible version is deleted.
    pub fn visible(
        &self,
        tx: TxId,
        cmd: CommandId,
        view: View,
        sees_committed: &dyn Fn(TxId) -> bool,
    ) -> Option<&Version<T>> {
        for version in self.versions.iter().rev() {
            if !version.created.visible_to(tx, cmd, view, sees_committed) {
                continue;
            }
            let deleted = version
                .deleted
                .is_some_and(|d| d.visible_to(tx, cmd, view, sees_committed));
            return if deleted { None } else { Some(version) };
        }
        None
    }

    /// Returns `true` when any version boundary of this chain belongs to
    /// `tx` (used to release locks and inspect own writes).
    #[must_use]
    pub fn touched_by(&self, tx: TxId) -> bool {
        self.versions
            .iter()
            .any(|v| v.created.tx == tx || v.deleted.is_some_and(|d| d.tx == tx))
    }

    /// The creation and deletion stamps of the newest version, used for
    /// write-write conflict detection.
    #[must_use]
    pub fn newest_stamps(&self) -> Option<(VersionStamp, Option<VersionStamp>)> {
        self.versions.last().map(|v| (v.created, v.deleted))
    }

    /// Mutates the record for a writer at `(tx, cmd)`.
    ///
    /// The caller must already hold the record lock. If the newest version
    /// was created by this `(tx, cmd)` it is updated in place; otherwise
    /// the currently visible NEW version is cloned into a fresh version
    /// stamped `(tx, cmd)` so that the OLD view keeps observing the prior
    /// state until the command advances.
    ///
    /// Returns `None` when there is no visible version to update (the
    /// record is deleted or invisible).
    pub fn update<R>(
        &mut self,
        tx: TxId,
        cmd: CommandId,
        sees_committed: &dyn Fn(TxId) -> bool,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        debug_assert_eq!(self.lock, Some(tx), "update without the record lock");

        let in_place = self
            .versions
            .last()
            .is_some_and(|v| v.created == VersionStamp::new(tx, cmd) && v.deleted.is_none());
        if in_place {
            let last = self.versions.last_mut()?;
            return Some(f(&mut last.data));
        }

        let base = self.visible(tx, cmd, View::New, sees_committed)?.data.clone();
        let mut version = Version { created: VersionStamp::new(tx, cmd), deleted: None, data: base };
        let result = f(&mut version.data);
        self.versions.push(version);
        Some(result)
    }

    /// Marks the visible version deleted at `(tx, cmd)`.
    ///
    /// Returns `false` when nothing was visible to delete.
    pub fn delete(
        &mut self,
        tx: TxId,
        cmd: CommandId,
        sees_committed: &dyn Fn(TxId) -> bool,
    ) -> bool {
        debug_assert_eq!(self.lock, Some(tx), "delete without the record lock");

        let index = self
            .versions
            .iter()
            .enumerate()
            .rev()
            .find(|(_, v)| {
                v.created.visible_to(tx, cmd, View::New, sees_committed)
                    && !v.deleted.is_some_and(|d| d.visible_to(tx, cmd, View::New, sees_committed))
            })
            .map(|(i, _)| i);
        match index {
            Some(i) => {
                self.versions[i].deleted = Some(VersionStamp::new(tx, cmd));
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none_committed(_: TxId) -> bool {
        false
    }

    #[test]
    fn own_writes_visible_under_new_not_old() {
        let tx = TxId(1);
        let cmd = CommandId::FIRST;
        let chain = VersionChain::create(VersionStamp::new(tx, cmd), 10u32);

        assert!(chain.visible(tx, cmd, View::New, &none_committed).is_some());
        assert!(chain.visible(tx, cmd, View::Old, &none_committed).is_none());
        // After a command advance the write is OLD-visible.
        assert!(chain.visible(tx, cmd.next(), View::Old, &none_committed).is_some());
    }

    #[test]
    fn foreign_writes_visible_only_when_snapshotted() {
        let writer = TxId(1);
        let reader = TxId(2);
        let chain = VersionChain::create(VersionStamp::new(writer, CommandId::FIRST), 10u32);

        assert!(chain.visible(reader, CommandId::FIRST, View::Old, &none_committed).is_none());
        let sees = |tx: TxId| tx == writer;
        assert!(chain.visible(reader, CommandId::FIRST, View::Old, &sees).is_some());
    }

    #[test]
    fn update_in_same_command_is_in_place() {
        let tx = TxId(1);
        let cmd = CommandId::FIRST;
        let mut chain = VersionChain::create(VersionStamp::new(tx, cmd), 10u32);

        chain.update(tx, cmd, &none_committed, |v| *v = 11);
        let version = chain.visible(tx, cmd, View::New, &none_committed).unwrap();
        assert_eq!(version.data, 11);
        // No extra version was pushed.
        assert_eq!(chain.versions.len(), 1);
    }

    #[test]
    fn update_after_advance_creates_version() {
        let tx = TxId(1);
        let mut chain = VersionChain::create(VersionStamp::new(tx, CommandId::FIRST), 10u32);
        let next = CommandId::FIRST.next();

        chain.update(tx, next, &none_committed, |v| *v = 20);
        assert_eq!(chain.versions.len(), 2);
        // OLD at the advanced command still sees the original value.
        assert_eq!(chain.visible(tx, next, View::Old, &none_committed).unwrap().data, 10);
        assert_eq!(chain.visible(tx, next, View::New, &none_committed).unwrap().data, 20);
    }

    #[test]
    fn delete_hides_record_under_new() {
        let tx = TxId(1);
        let cmd = CommandId::FIRST;
        let mut chain = VersionChain::create(VersionStamp::new(tx, cmd), 10u32);

        assert!(chain.delete(tx, cmd, &none_committed));
        assert!(chain.visible(tx, cmd, View::New, &none_committed).is_none());
        // Deleting again finds nothing.
        assert!(!chain.delete(tx, cmd, &none_committed));
    }

    #[test]
    fn aborted_writer_stays_invisible() {
        let writer = TxId(1);
        let reader = TxId(2);
        let chain = VersionChain::create(VersionStamp::new(writer, CommandId::FIRST), 10u32);
        // The reader's snapshot never includes the aborted writer, so the
        // version simply never becomes visible; no physical cleanup needed.
        assert!(chain.visible(reader, CommandId::FIRST, View::New, &none_committed).is_none());
    }
}
