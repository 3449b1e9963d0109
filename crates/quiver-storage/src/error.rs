//! Error types for the storage crate.

use quiver_core::GlobalAddress;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A write conflicted with a concurrent transaction.
    ///
    /// The client may retry the whole transaction.
    #[error("serialization conflict: {0}")]
    Serialization(String),

    /// A record lock could not be acquired within the wait bound.
    ///
    /// The client may retry the whole transaction.
    #[error("lock wait timed out: {0}")]
    LockTimeout(String),

    /// A mutation targeted a record already deleted in this view.
    #[error("record deleted: {0}")]
    RecordDeleted(GlobalAddress),

    /// A vertex still has incident edges and DETACH was not requested.
    #[error("vertex {0} has existing connections, consider using DETACH DELETE")]
    VertexHasEdges(GlobalAddress),

    /// The addressed record does not exist (or is invisible to this
    /// transaction).
    #[error("record not found: {0}")]
    NotFound(GlobalAddress),

    /// A remote record could not be projected into the current view.
    #[error("cannot reconstruct record {0} in the current view")]
    Reconstruction(GlobalAddress),

    /// The requested label-property index has not been built.
    #[error("no index on ({label}, {property})")]
    IndexMissing {
        /// The label half of the index key.
        label: String,
        /// The property half of the index key.
        property: String,
    },

    /// An operation required remote access but no cluster is attached.
    #[error("no remote storage channel: {0}")]
    NoRemote(String),

    /// A property value was rejected by the store.
    #[error("'{0}' cannot be used as a property value")]
    InvalidPropertyValue(String),

    /// An internal lock was poisoned (a thread panicked while holding it).
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
