//! Worker discovery and lookup.
//!
//! The registry is the process-wide name service: workers register their
//! "main" channel (here, themselves) under their id, and the master polls
//! until every expected worker is reachable, sleeping one second between
//! sweeps. During startup an unreachable worker is transient; during
//! query execution it is fatal and surfaces as a network error.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use quiver_core::WorkerId;
use tracing::{info, warn};

use crate::error::{ClusterError, ClusterResult};
use crate::worker::WorkerNode;

/// The interval between discovery sweeps.
const DISCOVERY_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// The process-wide worker name service.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<WorkerId, Arc<WorkerNode>>>,
}

impl WorkerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a worker under its id.
    ///
    /// A poisoned registry drops the registration; discovery then reports
    /// the worker unreachable, which is the honest outcome.
    pub fn register(&self, worker: Arc<WorkerNode>) {
        info!(worker = %worker.id(), "worker registered");
        match self.workers.write() {
            Ok(mut workers) => {
                workers.insert(worker.id(), worker);
            }
            Err(_) => warn!(worker = %worker.id(), "registry poisoned, registration dropped"),
        }
    }

    /// Looks up a worker.
    pub fn get(&self, id: WorkerId) -> ClusterResult<Arc<WorkerNode>> {
        self.workers
            .read()
            .map_err(|_| ClusterError::LockPoisoned("worker registry".into()))?
            .get(&id)
            .cloned()
            .ok_or(ClusterError::UnknownWorker(id))
    }

    /// Every registered worker id, sorted. Degrades to empty when the
    /// registry is poisoned; per-worker calls then fail through `get`.
    #[must_use]
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self
            .workers
            .read()
            .map(|workers| workers.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Every registered worker, sorted by id.
    #[must_use]
    pub fn workers(&self) -> Vec<Arc<WorkerNode>> {
        let mut workers: Vec<Arc<WorkerNode>> = self
            .workers
            .read()
            .map(|workers| workers.values().cloned().collect())
            .unwrap_or_default();
        workers.sort_by_key(|w| w.id());
        workers
    }

    /// Polls until every expected worker is reachable.
    ///
    /// Returns `WorkerUnreachable` for the first missing worker once the
    /// timeout passes.
    pub fn await_workers(&self, expected: &[WorkerId], timeout: Duration) -> ClusterResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let missing: Vec<WorkerId> = match self.workers.read() {
                Ok(workers) => {
                    expected.iter().copied().filter(|id| !workers.contains_key(id)).collect()
                }
                // A poisoned registry keeps everything unreachable.
                Err(_) => expected.to_vec(),
            };
            if missing.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ClusterError::WorkerUnreachable(missing[0]));
            }
            info!(?missing, "waiting for workers to register");
            std::thread::sleep(DISCOVERY_SWEEP_INTERVAL.min(timeout));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durability::NoopDurability;
    use quiver_core::NameRegistry;
    use quiver_query::ExecutionConfig;
    use quiver_storage::TransactionEngine;

    fn node(id: u16) -> Arc<WorkerNode> {
        Arc::new(WorkerNode::new(
            WorkerId::new(id),
            Arc::new(TransactionEngine::new()),
            Arc::new(NameRegistry::new()),
            Arc::new(NoopDurability),
            ExecutionConfig::default(),
        ))
    }

    #[test]
    fn register_and_lookup() {
        let registry = WorkerRegistry::new();
        registry.register(node(0));
        registry.register(node(2));
        registry.register(node(1));

        assert!(registry.get(WorkerId::new(1)).is_ok());
        assert!(matches!(
            registry.get(WorkerId::new(9)),
            Err(ClusterError::UnknownWorker(_))
        ));
        assert_eq!(
            registry.worker_ids(),
            vec![WorkerId::new(0), WorkerId::new(1), WorkerId::new(2)]
        );
    }

    #[test]
    fn await_workers_times_out_on_missing() {
        let registry = WorkerRegistry::new();
        registry.register(node(0));
        let err = registry
            .await_workers(&[WorkerId::new(0), WorkerId::new(1)], Duration::from_millis(1))
            .unwrap_err();
        assert!(matches!(err, ClusterError::WorkerUnreachable(id) if id == WorkerId::new(1)));
    }
}
