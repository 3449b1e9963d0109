//! Error types for the cluster crate.

use quiver_core::{PlanId, TxId, WorkerId};
use thiserror::Error;

/// Errors that can occur in the distributed fabric.
#[derive(Debug, Clone, Error)]
pub enum ClusterError {
    /// The addressed worker is not registered.
    #[error("unknown worker {0}")]
    UnknownWorker(WorkerId),

    /// A worker did not become reachable during discovery.
    #[error("worker {0} did not become reachable")]
    WorkerUnreachable(WorkerId),

    /// A sub-plan was pulled before being dispatched.
    #[error("plan {0} is not dispatched")]
    PlanMissing(PlanId),

    /// A request thread died before responding.
    #[error("rpc channel closed: {0}")]
    ChannelClosed(String),

    /// A transaction is unknown to the engine.
    #[error("{0} is not active on this cluster")]
    UnknownTransaction(TxId),

    /// A message payload failed to serialize or deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An internal lock was poisoned (a thread panicked while holding it).
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;
