//! The distributed fabric for Quiver.
//!
//! This crate implements the coordinator seam the query crate defines: an
//! in-process RPC fabric with one [`WorkerNode`] per worker, a
//! [`WorkerRegistry`] name service, pull/update/data clients backed by
//! [`RpcFuture`] completion handles, plan dispatch and the durability RPC
//! boundary. Wire framing is out of scope; the message *shapes* in
//! [`rpc`] are the protocol.
//!
//! # Modules
//!
//! - [`rpc`] - Message shapes and the wire value sum
//! - [`future`] - Completion handles over spawned request threads
//! - [`worker`] - The per-worker server side
//! - [`registry`] - Worker discovery and lookup
//! - [`updates`] - The deferred-update server
//! - [`dispatch`] - Plan dispatch
//! - [`durability`] - The snapshot/recovery RPC boundary
//! - [`coordinator`] - The `Coordinator`/`RemoteGraph` implementation and
//!   transaction coordination

pub mod coordinator;
pub mod dispatch;
pub mod durability;
pub mod error;
pub mod future;
pub mod registry;
pub mod rpc;
pub mod updates;
pub mod worker;

pub use coordinator::ClusterCoordinator;
pub use dispatch::PlanDispatcher;
pub use durability::{DurabilityHooks, DurabilityRpcMaster, NoopDurability};
pub use error::{ClusterError, ClusterResult};
pub use future::RpcFuture;
pub use registry::WorkerRegistry;
pub use rpc::{RemotePullReq, RemotePullRes, UpdateResult, WireValue};
pub use worker::WorkerNode;
