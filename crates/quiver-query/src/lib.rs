//! Query execution for Quiver.
//!
//! This crate is the query execution core: the runtime value type, the
//! per-row [`Frame`], the expression evaluator, the plan-node sum with its
//! cursor implementations, and the interpreter entry that maps query
//! strings onto executing cursors.
//!
//! # Layers
//!
//! - [`value`] - [`TypedValue`] and [`Path`], the runtime value sum
//! - [`frame`] / [`symbols`] - rows and planner-assigned positions
//! - [`expr`] - expression trees and the evaluator
//! - [`plan`] - the logical operator sum shipped to workers
//! - [`exec`] - the cursor protocol, execution context, the operator
//!   library and the distributed coordinator seam
//! - [`interpreter`] - literal stripping, AST and plan caches, the query
//!   entry point

pub mod error;
pub mod exec;
pub mod expr;
pub mod frame;
pub mod interpreter;
pub mod plan;
pub mod symbols;
pub mod value;

pub use error::{QueryError, QueryResult};
pub use exec::context::{ExecutionConfig, ExecutionContext};
pub use exec::coordinator::{
    Coordinator, LocalCoordinator, PendingFetch, PendingPull, PullState, RemoteFrames,
};
pub use exec::cursor::{make_cursor, BoxedCursor, Cursor};
pub use expr::{evaluate, evaluate_filter, Expression, GraphView};
pub use frame::Frame;
pub use interpreter::Interpreter;
pub use plan::PlanNode;
pub use symbols::{Symbol, SymbolTable, SymbolType};
pub use value::{Parameters, Path, TypedValue};
