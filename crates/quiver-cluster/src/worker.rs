//! The per-worker server side of the fabric.
//!
//! A worker owns its share of the graph, its registry of dispatched
//! sub-plans, the cursors currently serving remote pulls, and its
//! deferred-update buffer. Serving one remote pull consumes one request
//! thread, which pulls the sub-plan's cursor against the worker's own
//! store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use quiver_core::{
    Gid, GlobalAddress, LabelId, NameRegistry, PlanId, PropertyId, PropertyValue, TxId, WorkerId,
};
use quiver_query::exec::coordinator::PullState;
use quiver_query::{
    make_cursor, BoxedCursor, ExecutionConfig, ExecutionContext, Frame, Parameters, PlanNode,
    QueryError, Symbol, SymbolTable,
};
use quiver_storage::{
    DbAccessor, EdgeRecord, GraphStore, RemoteGraph, StorageError, StorageResult, TransactionEngine,
    VertexRecord, View,
};
use tracing::debug;

use crate::durability::DurabilityHooks;
use crate::error::{ClusterError, ClusterResult};
use crate::rpc::{RemotePullReq, RemotePullRes, SnapshotRes, WireValue};
use crate::updates::UpdatesServer;

/// A dispatched sub-plan.
struct DispatchedPlan {
    plan: Arc<PlanNode>,
    symbol_table: SymbolTable,
}

/// A cursor kept alive between remote pull batches.
struct ServingCursor {
    cursor: BoxedCursor,
    frame: Frame,
    ctx: ExecutionContext,
    symbols: Vec<Symbol>,
    /// Rows buffered by an accumulate request, drained by later pulls.
    buffer: Vec<Vec<WireValue>>,
    exhausted: bool,
}

/// One worker of the cluster.
pub struct WorkerNode {
    id: WorkerId,
    store: Arc<GraphStore>,
    engine: Arc<TransactionEngine>,
    registry: Arc<NameRegistry>,
    updates: UpdatesServer,
    plans: RwLock<HashMap<PlanId, DispatchedPlan>>,
    active_cursors: Mutex<HashMap<(TxId, PlanId), ServingCursor>>,
    durability: Arc<dyn DurabilityHooks>,
    config: ExecutionConfig,
}

impl std::fmt::Debug for WorkerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerNode").field("id", &self.id).finish_non_exhaustive()
    }
}

impl WorkerNode {
    /// Creates a worker with its own store.
    #[must_use]
    pub fn new(
        id: WorkerId,
        engine: Arc<TransactionEngine>,
        registry: Arc<NameRegistry>,
        durability: Arc<dyn DurabilityHooks>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            id,
            store: Arc::new(GraphStore::new(id, Arc::clone(&engine))),
            engine: Arc::clone(&engine),
            registry,
            updates: UpdatesServer::new(),
            plans: RwLock::new(HashMap::new()),
            active_cursors: Mutex::new(HashMap::new()),
            durability,
            config,
        }
    }

    /// The worker's id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// The worker's store.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// The worker's deferred-update server.
    #[inline]
    #[must_use]
    pub fn updates(&self) -> &UpdatesServer {
        &self.updates
    }

    /// The shared transaction engine.
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &Arc<TransactionEngine> {
        &self.engine
    }

    /// Builds a `DbAccessor` for a transaction on this worker.
    pub fn accessor(
        &self,
        tx: TxId,
        remote: Arc<dyn RemoteGraph>,
    ) -> StorageResult<DbAccessor> {
        let transaction = self.engine.adopt(tx)?;
        Ok(DbAccessor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.engine),
            transaction,
            remote,
            Arc::clone(&self.registry),
        ))
    }

    // ------------------------------------------------------------------
    // Plan registry
    // ------------------------------------------------------------------

    /// Registers a dispatched sub-plan. Re-dispatching a plan id
    /// replaces it.
    pub fn dispatch_plan(
        &self,
        plan_id: PlanId,
        subplan: PlanNode,
        symbol_table: SymbolTable,
    ) -> ClusterResult<()> {
        debug!(worker = %self.id, plan = %plan_id, "plan dispatched");
        let mut plans = self
            .plans
            .write()
            .map_err(|_| ClusterError::LockPoisoned("plan registry".into()))?;
        plans.insert(plan_id, DispatchedPlan { plan: Arc::new(subplan), symbol_table });
        Ok(())
    }

    /// Unregisters a sub-plan. Cleanup, so a poisoned registry degrades
    /// to a no-op.
    pub fn remove_plan(&self, plan_id: PlanId) {
        if let Ok(mut plans) = self.plans.write() {
            plans.remove(&plan_id);
        }
    }

    /// Whether a sub-plan is registered.
    #[must_use]
    pub fn has_plan(&self, plan_id: PlanId) -> bool {
        self.plans.read().map(|plans| plans.contains_key(&plan_id)).unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Remote pull serving
    // ------------------------------------------------------------------

    /// Serves one remote pull request against a dispatched sub-plan.
    ///
    /// The cursor stays registered between batches under `(tx, plan)`;
    /// `accumulate` exhausts it into a server-side buffer that later
    /// batched pulls drain.
    pub fn serve_pull(
        &self,
        coordinator: Arc<dyn quiver_query::Coordinator>,
        remote: Arc<dyn RemoteGraph>,
        req: &RemotePullReq,
    ) -> RemotePullRes {
        let key = (req.tx, req.plan_id);
        // Response states already encode failure, so a poisoned cursor
        // table reports a query error instead of panicking the server.
        let Ok(mut cursors) = self.active_cursors.lock() else {
            return RemotePullRes { frames: Vec::new(), state: PullState::QueryError };
        };

        if !cursors.contains_key(&key) {
            match self.start_cursor(coordinator, remote, req) {
                Ok(serving) => {
                    cursors.insert(key, serving);
                }
                Err(state) => return RemotePullRes { frames: Vec::new(), state },
            }
        }
        let serving = cursors.get_mut(&key).expect("cursor was just ensured");

        let result = if req.accumulate {
            Self::accumulate(serving)
        } else {
            Self::batch(serving, req.batch_size)
        };
        match result {
            Ok(res) => {
                if res.state == PullState::Exhausted && !req.accumulate {
                    cursors.remove(&key);
                }
                res
            }
            Err(error) => {
                cursors.remove(&key);
                RemotePullRes { frames: Vec::new(), state: error_state(&error) }
            }
        }
    }

    fn start_cursor(
        &self,
        coordinator: Arc<dyn quiver_query::Coordinator>,
        remote: Arc<dyn RemoteGraph>,
        req: &RemotePullReq,
    ) -> Result<ServingCursor, PullState> {
        let Ok(plans) = self.plans.read() else {
            return Err(PullState::QueryError);
        };
        let Some(dispatched) = plans.get(&req.plan_id) else {
            return Err(PullState::QueryError);
        };
        let dba = self.accessor(req.tx, remote).map_err(|_| PullState::QueryError)?;
        let cursor = make_cursor(&dispatched.plan, &dba).map_err(|e| error_state(&e))?;

        let mut parameters = Parameters::new();
        for (position, value) in &req.params {
            parameters.add(*position, value.clone());
        }
        let ctx = ExecutionContext::new()
            .with_parameters(parameters)
            .with_config(self.config.clone())
            .with_coordinator(coordinator);

        Ok(ServingCursor {
            cursor,
            frame: Frame::new(dispatched.symbol_table.len()),
            ctx,
            symbols: req.symbols.clone(),
            buffer: Vec::new(),
            exhausted: false,
        })
    }

    /// Exhausts the cursor into the server-side buffer.
    fn accumulate(serving: &mut ServingCursor) -> Result<RemotePullRes, QueryError> {
        while !serving.exhausted {
            if serving.cursor.pull(&mut serving.frame, &mut serving.ctx)? {
                serving.buffer.push(encode_row(serving)?);
            } else {
                serving.exhausted = true;
            }
        }
        Ok(RemotePullRes { frames: Vec::new(), state: PullState::Exhausted })
    }

    /// Produces one batch, draining the buffer before pulling live.
    fn batch(serving: &mut ServingCursor, batch_size: usize) -> Result<RemotePullRes, QueryError> {
        let batch_size = batch_size.max(1);
        let mut frames = Vec::with_capacity(batch_size);

        while frames.len() < batch_size && !serving.buffer.is_empty() {
            frames.push(serving.buffer.remove(0));
        }
        while frames.len() < batch_size && !serving.exhausted {
            if serving.cursor.pull(&mut serving.frame, &mut serving.ctx)? {
                frames.push(encode_row(serving)?);
            } else {
                serving.exhausted = true;
            }
        }

        let state = if serving.exhausted && serving.buffer.is_empty() {
            PullState::Exhausted
        } else {
            PullState::InProgress
        };
        Ok(RemotePullRes { frames, state })
    }

    // ------------------------------------------------------------------
    // Remote data serving
    // ------------------------------------------------------------------

    /// Reads a vertex record for another worker.
    pub fn read_vertex(&self, tx: TxId, gid: Gid) -> StorageResult<VertexRecord> {
        let transaction = self.engine.adopt(tx)?;
        self.store.vertex_record(&transaction, gid, View::New)
    }

    /// Reads an edge record for another worker.
    pub fn read_edge(&self, tx: TxId, gid: Gid) -> StorageResult<EdgeRecord> {
        let transaction = self.engine.adopt(tx)?;
        self.store.edge_record(&transaction, gid, View::New)
    }

    /// Allocates a gid and buffers a remote vertex creation.
    pub fn allocate_remote_vertex(
        &self,
        tx: TxId,
        labels: Vec<LabelId>,
        properties: BTreeMap<PropertyId, PropertyValue>,
    ) -> ClusterResult<GlobalAddress> {
        let gid = self.store.allocate_gid();
        self.updates.defer(
            tx,
            quiver_storage::DeferredUpdate::CreateVertex { gid, labels, properties },
        )?;
        Ok(self.store.address(gid))
    }

    /// Allocates a gid and buffers a remote edge creation.
    pub fn allocate_remote_edge(&self, tx: TxId, record: EdgeRecord) -> ClusterResult<GlobalAddress> {
        let gid = self.store.allocate_gid();
        self.updates.defer(tx, quiver_storage::DeferredUpdate::CreateEdge { gid, record })?;
        Ok(self.store.address(gid))
    }

    /// Applies this worker's buffered deferred writes for `tx`.
    #[must_use]
    pub fn apply_updates(&self, tx: TxId) -> crate::rpc::UpdateResult {
        self.updates.apply(&self.store, &self.engine, tx)
    }

    // ------------------------------------------------------------------
    // Transaction lifecycle
    // ------------------------------------------------------------------

    /// Releases everything this worker holds for a finished transaction.
    /// Cleanup is best-effort throughout.
    pub fn end_transaction(&self, tx: TxId, aborted: bool) {
        if let Ok(mut cursors) = self.active_cursors.lock() {
            cursors.retain(|(cursor_tx, _), _| *cursor_tx != tx);
        }
        if aborted {
            self.updates.discard(tx);
        }
        self.store.release_locks(tx);
    }

    /// Writes a durable snapshot through the durability hook.
    #[must_use]
    pub fn make_snapshot(&self, tx: TxId) -> SnapshotRes {
        SnapshotRes { ok: self.durability.make_snapshot(self.id, tx) }
    }
}

/// Encodes the serving frame's shipped symbols as a wire row.
fn encode_row(serving: &ServingCursor) -> Result<Vec<WireValue>, QueryError> {
    serving.symbols.iter().map(|s| WireValue::from_typed(serving.frame.get(s))).collect()
}

/// Classifies a worker-side error for the response state.
fn error_state(error: &QueryError) -> PullState {
    match error {
        QueryError::Storage(StorageError::Serialization(_)) => PullState::Serialization,
        QueryError::Storage(StorageError::LockTimeout(_)) => PullState::LockTimeout,
        QueryError::Storage(StorageError::RecordDeleted(_) | StorageError::NotFound(_)) => {
            PullState::UpdateDeleted
        }
        QueryError::Storage(StorageError::Reconstruction(_)) => PullState::Reconstruction,
        _ => PullState::QueryError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durability::NoopDurability;
    use quiver_query::expr::GraphView;
    use quiver_query::symbols::SymbolType;
    use quiver_query::LocalCoordinator;
    use quiver_storage::LocalOnlyRemote;

    fn worker(id: u16) -> (Arc<TransactionEngine>, WorkerNode) {
        let engine = Arc::new(TransactionEngine::new());
        let worker = WorkerNode::new(
            WorkerId::new(id),
            Arc::clone(&engine),
            Arc::new(NameRegistry::new()),
            Arc::new(NoopDurability),
            ExecutionConfig::default(),
        );
        (engine, worker)
    }

    fn scan_plan(table: &mut SymbolTable) -> (PlanNode, Symbol) {
        let n = table.create("n", SymbolType::Vertex, true);
        let plan = PlanNode::ScanAll {
            input: Box::new(PlanNode::Once),
            output_symbol: n.clone(),
            view: GraphView::New,
        };
        (plan, n)
    }

    #[test]
    fn pull_batches_until_exhausted() {
        let (engine, worker) = worker(1);
        let tx = engine.begin(None).unwrap();
        let dba = worker.accessor(tx.id(), Arc::new(LocalOnlyRemote)).unwrap();
        for _ in 0..3 {
            dba.insert_vertex().unwrap();
        }

        let mut table = SymbolTable::new();
        let (plan, n) = scan_plan(&mut table);
        worker.dispatch_plan(PlanId(1), plan, table).unwrap();

        let mut req = RemotePullReq {
            tx: tx.id(),
            origin: WorkerId::MASTER,
            plan_id: PlanId(1),
            params: Vec::new(),
            symbols: vec![n],
            accumulate: false,
            batch_size: 2,
        };
        let res =
            worker.serve_pull(Arc::new(LocalCoordinator), Arc::new(LocalOnlyRemote), &req);
        assert_eq!(res.frames.len(), 2);
        assert_eq!(res.state, PullState::InProgress);

        req.batch_size = 10;
        let res =
            worker.serve_pull(Arc::new(LocalCoordinator), Arc::new(LocalOnlyRemote), &req);
        assert_eq!(res.frames.len(), 1);
        assert_eq!(res.state, PullState::Exhausted);
    }

    #[test]
    fn accumulate_buffers_then_streams() {
        let (engine, worker) = worker(1);
        let tx = engine.begin(None).unwrap();
        let dba = worker.accessor(tx.id(), Arc::new(LocalOnlyRemote)).unwrap();
        dba.insert_vertex().unwrap();
        dba.insert_vertex().unwrap();

        let mut table = SymbolTable::new();
        let (plan, n) = scan_plan(&mut table);
        worker.dispatch_plan(PlanId(1), plan, table).unwrap();

        let accumulate = RemotePullReq {
            tx: tx.id(),
            origin: WorkerId::MASTER,
            plan_id: PlanId(1),
            params: Vec::new(),
            symbols: vec![n.clone()],
            accumulate: true,
            batch_size: 0,
        };
        let res =
            worker.serve_pull(Arc::new(LocalCoordinator), Arc::new(LocalOnlyRemote), &accumulate);
        assert_eq!(res.state, PullState::Exhausted);
        assert!(res.frames.is_empty());

        // The buffered rows stream out of later batched pulls.
        let stream = RemotePullReq { accumulate: false, batch_size: 10, ..accumulate };
        let res =
            worker.serve_pull(Arc::new(LocalCoordinator), Arc::new(LocalOnlyRemote), &stream);
        assert_eq!(res.frames.len(), 2);
        assert_eq!(res.state, PullState::Exhausted);
    }

    #[test]
    fn missing_plan_is_a_query_error_state() {
        let (engine, worker) = worker(1);
        let tx = engine.begin(None).unwrap();
        let req = RemotePullReq {
            tx: tx.id(),
            origin: WorkerId::MASTER,
            plan_id: PlanId(99),
            params: Vec::new(),
            symbols: Vec::new(),
            accumulate: false,
            batch_size: 1,
        };
        let res = worker.serve_pull(Arc::new(LocalCoordinator), Arc::new(LocalOnlyRemote), &req);
        assert_eq!(res.state, PullState::QueryError);
    }
}
