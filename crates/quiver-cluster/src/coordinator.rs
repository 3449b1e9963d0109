//! The coordinator: the cluster-side implementation of the seams the
//! lower crates define.
//!
//! One `ClusterCoordinator` serves the whole cluster. It implements the
//! query crate's `Coordinator` (remote pulls, remote-edge fetches, the
//! barrier's update application) and the storage crate's `RemoteGraph`
//! (record fetches and deferred writes), and it drives per-transaction
//! commit/abort across every worker.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use quiver_core::{GlobalAddress, LabelId, PlanId, PropertyId, PropertyValue, TxId, WorkerId};
use quiver_query::exec::coordinator::{Coordinator, PendingFetch, PendingPull, RemoteFrames};
use quiver_query::{Parameters, QueryError, QueryResult, Symbol, TypedValue};
use quiver_storage::{
    DbAccessor, DeferredUpdate, EdgeEntry, EdgeRecord, RemoteGraph, StorageError, StorageResult,
    Transaction, TransactionEngine, VertexRecord,
};
use tracing::debug;

use crate::error::ClusterError;
use crate::future::RpcFuture;
use crate::registry::WorkerRegistry;
use crate::rpc::{RemotePullReq, RemotePullRes, TxnMessage, UpdateResult};

struct CoordinatorInner {
    registry: Arc<WorkerRegistry>,
    engine: Arc<TransactionEngine>,
}

/// The cluster coordinator. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct ClusterCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for ClusterCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCoordinator")
            .field("workers", &self.inner.registry.worker_ids())
            .finish()
    }
}

impl ClusterCoordinator {
    /// Creates a coordinator over a registry and the shared engine.
    #[must_use]
    pub fn new(registry: Arc<WorkerRegistry>, engine: Arc<TransactionEngine>) -> Self {
        Self { inner: Arc::new(CoordinatorInner { registry, engine }) }
    }

    /// The worker registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.inner.registry
    }

    /// The shared transaction engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<TransactionEngine> {
        &self.inner.engine
    }

    fn worker(&self, id: WorkerId) -> Result<Arc<crate::worker::WorkerNode>, ClusterError> {
        self.inner.registry.get(id)
    }

    // ------------------------------------------------------------------
    // Transaction coordination
    // ------------------------------------------------------------------

    /// Begins a cluster transaction.
    pub fn begin(&self, max_duration: Option<Duration>) -> StorageResult<Transaction> {
        self.inner.engine.begin(max_duration)
    }

    /// Commits a transaction cluster-wide.
    ///
    /// The master collects the workers' outstanding deferred writes
    /// first (the 2PC prepare); any failure turns the commit into an
    /// abort.
    pub fn commit(&self, tx: &Transaction) -> QueryResult<()> {
        debug!(message = ?TxnMessage::CommitRequest { tx: tx.id() }, "commit requested");
        for worker in self.inner.registry.workers() {
            if let Some(error) = worker.apply_updates(tx.id()).to_error() {
                self.abort(tx);
                return Err(error);
            }
        }
        if let Err(error) = self.inner.engine.commit(tx) {
            self.abort(tx);
            return Err(error.into());
        }
        debug!(message = ?TxnMessage::CommitDirective { tx: tx.id() }, "commit directed");
        for worker in self.inner.registry.workers() {
            worker.end_transaction(tx.id(), false);
        }
        Ok(())
    }

    /// Aborts a transaction cluster-wide. Idempotent.
    pub fn abort(&self, tx: &Transaction) {
        debug!(message = ?TxnMessage::AbortDirective { tx: tx.id() }, "abort directed");
        self.inner.engine.abort(tx);
        for worker in self.inner.registry.workers() {
            worker.end_transaction(tx.id(), true);
        }
    }
}

/// A pull in flight to one worker.
struct ClusterPendingPull {
    future: RpcFuture<RemotePullRes>,
    dba: DbAccessor,
}

impl PendingPull for ClusterPendingPull {
    fn is_ready(&self) -> bool {
        self.future.is_ready()
    }

    fn take(self: Box<Self>) -> QueryResult<RemoteFrames> {
        let response = self.future.wait().map_err(|e| QueryError::Network(e.to_string()))?;
        let frames: Vec<Vec<TypedValue>> = response
            .frames
            .into_iter()
            .map(|row| row.into_iter().map(|value| value.into_typed(&self.dba)).collect())
            .collect();
        Ok(RemoteFrames { frames, state: response.state })
    }
}

/// A remote incidence-entry fetch in flight.
struct ClusterPendingFetch {
    entry: EdgeEntry,
    future: RpcFuture<QueryResult<()>>,
}

impl PendingFetch for ClusterPendingFetch {
    fn entry(&self) -> EdgeEntry {
        self.entry
    }

    fn is_ready(&self) -> bool {
        self.future.is_ready()
    }

    fn take(self: Box<Self>) -> QueryResult<()> {
        self.future.wait().map_err(|e| QueryError::Network(e.to_string()))?
    }
}

impl Coordinator for ClusterCoordinator {
    fn worker_ids(&self) -> Vec<WorkerId> {
        self.inner.registry.worker_ids()
    }

    fn remote_pull(
        &self,
        dba: &DbAccessor,
        worker: WorkerId,
        plan_id: PlanId,
        parameters: &Parameters,
        symbols: &[Symbol],
        accumulate: bool,
        batch_size: usize,
    ) -> QueryResult<Box<dyn PendingPull>> {
        let node = self.worker(worker).map_err(|e| QueryError::Network(e.to_string()))?;
        let req = RemotePullReq {
            tx: dba.tx_id(),
            origin: dba.worker(),
            plan_id,
            params: parameters.iter().map(|(&p, v)| (p, v.clone())).collect(),
            symbols: symbols.to_vec(),
            accumulate,
            batch_size,
        };
        let coordinator: Arc<dyn Coordinator> = Arc::new(self.clone());
        let remote: Arc<dyn RemoteGraph> = Arc::new(self.clone());
        let future =
            RpcFuture::spawn("remote-pull", move || node.serve_pull(coordinator, remote, &req));
        Ok(Box::new(ClusterPendingPull { future, dba: dba.clone() }))
    }

    fn fetch_entry(&self, dba: &DbAccessor, entry: EdgeEntry) -> Box<dyn PendingFetch> {
        let coordinator = self.clone();
        let dba = dba.clone();
        let future = RpcFuture::spawn("remote-entry", move || {
            let tx = dba.tx_id();
            if !dba.is_local(entry.edge) && !dba.data_manager().contains_edge(entry.edge) {
                let record = coordinator.fetch_edge(tx, entry.edge)?;
                dba.data_manager().insert_edge(entry.edge, record);
            }
            if !dba.is_local(entry.peer) && !dba.data_manager().contains_vertex(entry.peer) {
                let record = coordinator.fetch_vertex(tx, entry.peer)?;
                dba.data_manager().insert_vertex(entry.peer, record);
            }
            Ok(())
        });
        Box::new(ClusterPendingFetch { entry, future })
    }

    fn apply_deferred_updates(&self, dba: &DbAccessor) -> QueryResult<()> {
        let tx = dba.tx_id();
        let own = dba.worker();

        // Fan out to every peer, apply locally, then check everyone.
        let futures: Vec<RpcFuture<UpdateResult>> = self
            .inner
            .registry
            .workers()
            .into_iter()
            .filter(|worker| worker.id() != own)
            .map(|worker| RpcFuture::spawn("apply-updates", move || worker.apply_updates(tx)))
            .collect();

        let local = self.worker(own).map_err(|e| QueryError::Network(e.to_string()))?;
        if let Some(error) = local.apply_updates(tx).to_error() {
            return Err(error);
        }
        for future in futures {
            let result = future.wait().map_err(|e| QueryError::Network(e.to_string()))?;
            if let Some(error) = result.to_error() {
                return Err(error);
            }
        }
        Ok(())
    }

    fn notify_command_advanced(&self, tx: TxId) -> QueryResult<()> {
        // The command clock is shared engine state, so peers already see
        // the advance; the notification keeps the protocol observable.
        debug!(tx = %tx, "command advance notified to all workers");
        Ok(())
    }
}

/// Maps fabric failures onto the storage error the accessor expects.
fn cluster_to_storage(error: ClusterError) -> StorageError {
    match error {
        ClusterError::LockPoisoned(what) => StorageError::LockPoisoned(what),
        other => StorageError::NoRemote(other.to_string()),
    }
}

impl RemoteGraph for ClusterCoordinator {
    fn fetch_vertex(&self, tx: TxId, address: GlobalAddress) -> StorageResult<VertexRecord> {
        let worker = self
            .worker(address.worker())
            .map_err(|e| StorageError::NoRemote(e.to_string()))?;
        worker.read_vertex(tx, address.gid())
    }

    fn fetch_edge(&self, tx: TxId, address: GlobalAddress) -> StorageResult<EdgeRecord> {
        let worker = self
            .worker(address.worker())
            .map_err(|e| StorageError::NoRemote(e.to_string()))?;
        worker.read_edge(tx, address.gid())
    }

    fn allocate_vertex(
        &self,
        tx: TxId,
        worker: WorkerId,
        labels: Vec<LabelId>,
        properties: BTreeMap<PropertyId, PropertyValue>,
    ) -> StorageResult<GlobalAddress> {
        let node =
            self.worker(worker).map_err(|e| StorageError::NoRemote(e.to_string()))?;
        node.allocate_remote_vertex(tx, labels, properties).map_err(cluster_to_storage)
    }

    fn allocate_edge(
        &self,
        tx: TxId,
        worker: WorkerId,
        record: EdgeRecord,
    ) -> StorageResult<GlobalAddress> {
        let node =
            self.worker(worker).map_err(|e| StorageError::NoRemote(e.to_string()))?;
        node.allocate_remote_edge(tx, record).map_err(cluster_to_storage)
    }

    fn defer(&self, tx: TxId, worker: WorkerId, update: DeferredUpdate) -> StorageResult<()> {
        let node =
            self.worker(worker).map_err(|e| StorageError::NoRemote(e.to_string()))?;
        node.updates().defer(tx, update).map_err(cluster_to_storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durability::NoopDurability;
    use crate::worker::WorkerNode;
    use quiver_core::NameRegistry;
    use quiver_query::ExecutionConfig;
    use quiver_storage::View;

    fn cluster(n: u16) -> ClusterCoordinator {
        let registry = Arc::new(WorkerRegistry::new());
        let engine = Arc::new(TransactionEngine::new());
        let names = Arc::new(NameRegistry::new());
        for id in 0..n {
            registry.register(Arc::new(WorkerNode::new(
                WorkerId::new(id),
                Arc::clone(&engine),
                Arc::clone(&names),
                Arc::new(NoopDurability),
                ExecutionConfig::default(),
            )));
        }
        ClusterCoordinator::new(registry, engine)
    }

    #[test]
    fn remote_vertex_creation_becomes_real_after_apply() {
        let coordinator = cluster(2);
        let tx = coordinator.begin(None).unwrap();
        let master = coordinator.registry().get(WorkerId::MASTER).unwrap();
        let dba = master
            .accessor(tx.id(), Arc::new(coordinator.clone()) as Arc<dyn RemoteGraph>)
            .unwrap();

        let remote_worker = WorkerId::new(1);
        let vertex = dba
            .insert_vertex_into_remote(remote_worker, Vec::new(), BTreeMap::new())
            .unwrap();
        assert_eq!(vertex.address().worker(), remote_worker);

        // Before the barrier the record lives only in the DataManager.
        let owner = coordinator.registry().get(remote_worker).unwrap();
        let owner_dba = owner
            .accessor(tx.id(), Arc::new(coordinator.clone()) as Arc<dyn RemoteGraph>)
            .unwrap();
        assert!(owner_dba.vertices(View::New).unwrap().is_empty());

        coordinator.apply_deferred_updates(&dba).unwrap();
        assert_eq!(owner_dba.vertices(View::New).unwrap().len(), 1);
    }

    #[test]
    fn fetch_entry_populates_the_data_manager() {
        let coordinator = cluster(2);
        let tx = coordinator.begin(None).unwrap();
        let names = Arc::new(NameRegistry::new());
        let edge_type = names.edge_type("T").unwrap();

        // Build an edge entirely on worker 1.
        let owner = coordinator.registry().get(WorkerId::new(1)).unwrap();
        let owner_dba = owner
            .accessor(tx.id(), Arc::new(coordinator.clone()) as Arc<dyn RemoteGraph>)
            .unwrap();
        let a = owner_dba.insert_vertex().unwrap();
        let b = owner_dba.insert_vertex().unwrap();
        let edge = owner_dba.insert_edge(&a, &b, edge_type).unwrap();

        // The master fetches the entry's records asynchronously.
        let master = coordinator.registry().get(WorkerId::MASTER).unwrap();
        let master_dba = master
            .accessor(tx.id(), Arc::new(coordinator.clone()) as Arc<dyn RemoteGraph>)
            .unwrap();
        let entry = EdgeEntry { peer: b.address(), edge: edge.address(), edge_type };
        let fetch = coordinator.fetch_entry(&master_dba, entry);
        fetch.take().unwrap();

        assert!(master_dba.data_manager().contains_edge(edge.address()));
        assert!(master_dba.data_manager().contains_vertex(b.address()));
    }

    #[test]
    fn commit_applies_outstanding_deferred_writes() {
        let coordinator = cluster(2);
        let tx = coordinator.begin(None).unwrap();
        let master = coordinator.registry().get(WorkerId::MASTER).unwrap();
        let dba = master
            .accessor(tx.id(), Arc::new(coordinator.clone()) as Arc<dyn RemoteGraph>)
            .unwrap();
        dba.insert_vertex_into_remote(WorkerId::new(1), Vec::new(), BTreeMap::new()).unwrap();

        coordinator.commit(&tx).unwrap();

        let reader = coordinator.begin(None).unwrap();
        let owner = coordinator.registry().get(WorkerId::new(1)).unwrap();
        let owner_dba = owner
            .accessor(reader.id(), Arc::new(coordinator.clone()) as Arc<dyn RemoteGraph>)
            .unwrap();
        assert_eq!(owner_dba.vertices(View::New).unwrap().len(), 1);
    }
}
