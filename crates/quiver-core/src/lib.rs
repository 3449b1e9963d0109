//! Quiver core types.
//!
//! This crate holds the types shared by every layer of Quiver: the storable
//! [`PropertyValue`] sum, the interned ids for labels, properties and edge
//! types, the tagged [`GlobalAddress`] used to address vertices and edges
//! across workers, and the cluster-wide [`NameRegistry`].
//!
//! # Modules
//!
//! - [`types`] - Property values, ids and addresses
//! - [`registry`] - The name ↔ id interner
//! - [`error`] - Error types for the core crate

pub mod error;
pub mod registry;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use registry::NameRegistry;
pub use types::address::GlobalAddress;
pub use types::ids::{CommandId, EdgeTypeId, Gid, LabelId, PlanId, PropertyId, TxId, WorkerId};
pub use types::value::PropertyValue;
