//! The durability RPC boundary.
//!
//! Snapshot and WAL formats belong to the durability component; this
//! module only carries the RPC surface the admin layer drives: a snapshot
//! fan-out over every worker and the recovery entry point.

use std::sync::Arc;

use quiver_core::{TxId, WorkerId};
use tracing::info;

use crate::future::RpcFuture;
use crate::registry::WorkerRegistry;
use crate::rpc::SnapshotRes;

/// What the durability component provides to each worker.
pub trait DurabilityHooks: Send + Sync {
    /// Writes a durable snapshot observing `tx`. Returns success.
    fn make_snapshot(&self, worker: WorkerId, tx: TxId) -> bool;

    /// Recovers the store and its indexes from durable state at boot.
    ///
    /// Returns the number of recovered elements.
    fn recover_wal_and_indexes(&self, worker: WorkerId) -> usize;
}

/// The no-durability stand-in: snapshots trivially succeed, recovery
/// finds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDurability;

impl DurabilityHooks for NoopDurability {
    fn make_snapshot(&self, _worker: WorkerId, _tx: TxId) -> bool {
        true
    }

    fn recover_wal_and_indexes(&self, _worker: WorkerId) -> usize {
        0
    }
}

/// The master side of the durability RPC.
#[derive(Clone)]
pub struct DurabilityRpcMaster {
    registry: Arc<WorkerRegistry>,
}

impl DurabilityRpcMaster {
    /// Creates the master handle.
    #[must_use]
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }

    /// Asks every worker for a snapshot observing `tx`.
    ///
    /// Returns `true` only when every worker reports success.
    #[must_use]
    pub fn make_snapshot(&self, tx: TxId) -> bool {
        let futures: Vec<RpcFuture<SnapshotRes>> = self
            .registry
            .workers()
            .into_iter()
            .map(|worker| RpcFuture::spawn("snapshot", move || worker.make_snapshot(tx)))
            .collect();
        let ok = futures.into_iter().all(|f| f.wait().map_or(false, |res| res.ok));
        info!(tx = %tx, ok, "cluster snapshot finished");
        ok
    }
}
