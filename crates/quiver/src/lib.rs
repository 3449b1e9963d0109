//! Quiver: a distributed property-graph database core.
//!
//! The crate wires the stack together: MVCC storage
//! ([`quiver_storage`]), the pull-based Cypher execution engine
//! ([`quiver_query`]) and the distributed fabric ([`quiver_cluster`])
//! behind two embedding surfaces:
//!
//! - [`Database`] - one worker, no cluster
//! - [`Cluster`] - a master plus N workers with remote pulls, deferred
//!   updates and barrier synchronization
//!
//! # Example
//!
//! ```
//! use quiver::Database;
//!
//! let db = Database::in_memory();
//! let tx = db.begin(None).unwrap();
//! let dba = db.accessor(&tx).unwrap();
//! dba.insert_vertex().unwrap();
//! db.commit(&tx).unwrap();
//! ```

pub mod cluster;
pub mod database;
pub mod error;

pub use cluster::{Cluster, ClusterConfig};
pub use database::Database;
pub use error::{Error, Result};

pub use quiver_core::{GlobalAddress, NameRegistry, PropertyValue, WorkerId};
pub use quiver_query::{
    ExecutionConfig, ExecutionContext, Frame, Interpreter, Parameters, PlanNode, Symbol,
    SymbolTable, TypedValue,
};
pub use quiver_storage::{DbAccessor, Transaction, View};
