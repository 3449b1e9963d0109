//! Error types for the facade crate.

use thiserror::Error;

/// Errors that can occur when using Quiver.
#[derive(Debug, Error)]
pub enum Error {
    /// A query interpretation or execution error.
    #[error(transparent)]
    Query(#[from] quiver_query::QueryError),

    /// A core-layer error (type mismatch, name registry).
    #[error(transparent)]
    Core(#[from] quiver_core::CoreError),

    /// A storage error outside query execution (transaction begin,
    /// direct accessor use).
    #[error(transparent)]
    Storage(#[from] quiver_storage::StorageError),

    /// A cluster fabric error.
    #[error(transparent)]
    Cluster(#[from] quiver_cluster::ClusterError),

    /// The database has been shut down.
    #[error("database is shut down")]
    Shutdown,
}

impl Error {
    /// Whether retrying the whole transaction may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Query(e) => e.is_retriable(),
            Self::Storage(e) => matches!(
                e,
                quiver_storage::StorageError::Serialization(_)
                    | quiver_storage::StorageError::LockTimeout(_)
            ),
            _ => false,
        }
    }
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_classification() {
        let err: Error =
            quiver_storage::StorageError::Serialization("conflict".into()).into();
        assert!(err.is_retriable());
        assert!(!Error::Shutdown.is_retriable());
    }
}
