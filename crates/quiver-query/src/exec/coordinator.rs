//! The distributed coordinator seam.
//!
//! Operators never talk to the RPC fabric directly; they consume this
//! trait. The cluster crate implements it over the in-process fabric and
//! [`LocalCoordinator`] serves single-worker deployments, in the same way
//! a null accessor backs storage-less execution elsewhere in the stack.

use quiver_core::{PlanId, TxId, WorkerId};
use quiver_storage::{DbAccessor, EdgeEntry};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::symbols::Symbol;
use crate::value::{Parameters, TypedValue};

/// The outcome class of one remote pull response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullState {
    /// The remote cursor is exhausted; the frames are final.
    Exhausted,
    /// More rows remain; re-issue the pull.
    InProgress,
    /// The remote worker hit a serialization conflict.
    Serialization,
    /// The remote worker exceeded a lock wait bound.
    LockTimeout,
    /// The remote worker touched a deleted record.
    UpdateDeleted,
    /// The remote worker could not project a record into the view.
    Reconstruction,
    /// Any other query error on the remote worker.
    QueryError,
}

impl PullState {
    /// Maps an error state to the query error surfaced by PullRemote and
    /// Synchronize; `None` for the two success states.
    #[must_use]
    pub fn to_error(self, during: &str) -> Option<QueryError> {
        use quiver_storage::StorageError;
        match self {
            Self::Exhausted | Self::InProgress => None,
            Self::Serialization => Some(QueryError::Storage(StorageError::Serialization(
                format!("serialization error during {during}"),
            ))),
            Self::LockTimeout => Some(QueryError::Storage(StorageError::LockTimeout(format!(
                "lock timeout during {during}"
            )))),
            Self::UpdateDeleted => {
                Some(QueryError::Runtime(format!("record deleted during {during}")))
            }
            Self::Reconstruction => {
                Some(QueryError::Runtime(format!("reconstruction error during {during}")))
            }
            Self::QueryError => {
                Some(QueryError::Runtime(format!("query runtime error during {during}")))
            }
        }
    }
}

/// Frames pulled from one worker, already rebound to the local
/// transaction (remote records cached in the DataManager).
#[derive(Debug)]
pub struct RemoteFrames {
    /// Rows, one `Vec<TypedValue>` per shipped symbol set.
    pub frames: Vec<Vec<TypedValue>>,
    /// The response state.
    pub state: PullState,
}

/// A pending remote pull.
pub trait PendingPull: Send {
    /// Whether the response has arrived.
    fn is_ready(&self) -> bool;

    /// Consumes the handle and returns the response, blocking if needed.
    fn take(self: Box<Self>) -> QueryResult<RemoteFrames>;
}

/// A pending remote record fetch (Expand's remote edges).
///
/// Completion means the records are in the transaction's DataManager; the
/// handle itself carries no payload.
pub trait PendingFetch: Send {
    /// The incidence entry being resolved.
    fn entry(&self) -> EdgeEntry;

    /// Whether the fetch has completed.
    fn is_ready(&self) -> bool;

    /// Consumes the handle, surfacing any fetch error.
    fn take(self: Box<Self>) -> QueryResult<()>;
}

/// What the operator library needs from the cluster.
pub trait Coordinator: Send + Sync {
    /// Every worker in the cluster, the executing one included.
    fn worker_ids(&self) -> Vec<WorkerId>;

    /// Starts an asynchronous pull against a dispatched sub-plan on one
    /// worker.
    #[allow(clippy::too_many_arguments)]
    fn remote_pull(
        &self,
        dba: &DbAccessor,
        worker: WorkerId,
        plan_id: PlanId,
        parameters: &Parameters,
        symbols: &[Symbol],
        accumulate: bool,
        batch_size: usize,
    ) -> QueryResult<Box<dyn PendingPull>>;

    /// Starts an asynchronous fetch of the records behind an incidence
    /// entry (edge and peer vertex) into the transaction's DataManager.
    fn fetch_entry(&self, dba: &DbAccessor, entry: EdgeEntry) -> Box<dyn PendingFetch>;

    /// Applies deferred updates everywhere: on every peer worker and on
    /// the local updates server. Drives phase five of the barrier.
    fn apply_deferred_updates(&self, dba: &DbAccessor) -> QueryResult<()>;

    /// Tells every peer worker the transaction's command advanced.
    fn notify_command_advanced(&self, tx: TxId) -> QueryResult<()>;
}

/// The single-worker coordinator: no peers, no deferred updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCoordinator;

impl Coordinator for LocalCoordinator {
    fn worker_ids(&self) -> Vec<WorkerId> {
        vec![WorkerId::MASTER]
    }

    fn remote_pull(
        &self,
        _dba: &DbAccessor,
        worker: WorkerId,
        _plan_id: PlanId,
        _parameters: &Parameters,
        _symbols: &[Symbol],
        _accumulate: bool,
        _batch_size: usize,
    ) -> QueryResult<Box<dyn PendingPull>> {
        Err(QueryError::Network(format!("no cluster attached, cannot pull from {worker}")))
    }

    fn fetch_entry(&self, _dba: &DbAccessor, entry: EdgeEntry) -> Box<dyn PendingFetch> {
        Box::new(FailedFetch { entry })
    }

    fn apply_deferred_updates(&self, _dba: &DbAccessor) -> QueryResult<()> {
        Ok(())
    }

    fn notify_command_advanced(&self, _tx: TxId) -> QueryResult<()> {
        Ok(())
    }
}

/// A fetch that fails on take; single-worker stores never produce remote
/// addresses, so reaching this is a logic error surfaced as network.
struct FailedFetch {
    entry: EdgeEntry,
}

impl PendingFetch for FailedFetch {
    fn entry(&self) -> EdgeEntry {
        self.entry
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn take(self: Box<Self>) -> QueryResult<()> {
        Err(QueryError::Network(format!(
            "no cluster attached, cannot fetch remote edge {}",
            self.entry.edge
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_state_error_mapping() {
        assert!(PullState::Exhausted.to_error("x").is_none());
        assert!(PullState::InProgress.to_error("x").is_none());
        assert!(matches!(
            PullState::Serialization.to_error("x"),
            Some(QueryError::Storage(quiver_storage::StorageError::Serialization(_)))
        ));
        assert!(matches!(PullState::QueryError.to_error("x"), Some(QueryError::Runtime(_))));
    }

    #[test]
    fn local_coordinator_has_one_worker() {
        assert_eq!(LocalCoordinator.worker_ids(), vec![WorkerId::MASTER]);
    }
}
