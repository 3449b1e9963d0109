//! Error types for query execution.

use quiver_core::CoreError;
use quiver_storage::StorageError;
use thiserror::Error;

/// Errors that can occur while interpreting or executing a query.
///
/// The propagation policy follows one rule: only `Merge`'s empty match
/// branch and `Optional`'s empty sub-branch are recovered inside an
/// operator; every other kind unwinds through the cursor tree, aborting
/// the transaction where the table in the design says so.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The parser rejected the query. No transaction side effects.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Symbol or type resolution failed before planning.
    #[error("semantic error: {0}")]
    Semantic(String),

    /// A runtime type error or invalid operation inside an operator.
    #[error("{0}")]
    Runtime(String),

    /// The transaction was asked to terminate (killer or client).
    #[error("transaction was asked to abort")]
    HintedAbort,

    /// The operation is not supported (e.g. resetting a distributed
    /// cursor).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Index creation inside an explicit multi-statement transaction.
    #[error("index creation is not allowed in multicommand transactions")]
    IndexInMulticommand,

    /// A stream or auth operation inside an explicit multi-statement
    /// transaction.
    #[error("{operation} is not allowed in multicommand transactions")]
    AdminInMulticommand {
        /// The rejected operation, for the message.
        operation: String,
    },

    /// A `$parameter` was not bound at execution time.
    #[error("parameter ${0} not provided")]
    UnprovidedParameter(String),

    /// A peer worker became unreachable mid-query.
    #[error("network error: {0}")]
    Network(String),

    /// An internal lock was poisoned (a thread panicked while holding it).
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),

    /// A storage-layer failure (serialization, lock timeout, deleted
    /// record, reconstruction, ...).
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A core-layer failure (type mismatch, validation).
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl QueryError {
    /// Whether retrying the whole transaction may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Storage(StorageError::Serialization(_) | StorageError::LockTimeout(_))
        )
    }
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;
