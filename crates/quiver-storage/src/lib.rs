//! MVCC graph storage for Quiver.
//!
//! Each worker owns one [`GraphStore`]: vertex and edge version chains with
//! incidence lists, plus the label and label-property indexes. Transactions
//! are coordinated by the cluster-shared [`TransactionEngine`]; queries see
//! the store through a [`DbAccessor`], which bundles the store, the
//! transaction, the per-transaction [`DataManager`] cache of remote records
//! and the [`RemoteGraph`] channel used for cross-worker reads and deferred
//! writes.
//!
//! # Modules
//!
//! - [`mvcc`] - Version chains and visibility
//! - [`records`] - Vertex and edge record payloads
//! - [`store`] - The per-worker graph store and indexes
//! - [`txn`] - Transaction engine, handles and the transaction killer
//! - [`accessor`] - `DbAccessor` and the vertex/edge accessors
//! - [`data_manager`] - Per-transaction cache of remote records
//! - [`remote`] - The cross-worker storage channel trait
//! - [`error`] - Storage error kinds

pub mod accessor;
pub mod data_manager;
pub mod error;
pub mod index;
pub mod mvcc;
pub mod records;
pub mod remote;
pub mod store;
pub mod txn;

pub use accessor::{DbAccessor, EdgeAccessor, VertexAccessor};
pub use data_manager::DataManager;
pub use error::{StorageError, StorageResult};
pub use index::Bound;
pub use mvcc::View;
pub use records::{EdgeEntry, EdgeRecord, VertexRecord};
pub use remote::{DeferredUpdate, LocalOnlyRemote, RemoteGraph};
pub use store::{GraphStore, StoreConfig};
pub use txn::{Transaction, TransactionEngine, TransactionKiller, TxStatus};
