//! The cluster embedding surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use quiver_cluster::{
    ClusterCoordinator, DurabilityHooks, DurabilityRpcMaster, NoopDurability, PlanDispatcher,
    WorkerNode, WorkerRegistry,
};
use quiver_core::{NameRegistry, PlanId, PropertyValue, TxId, WorkerId};
use quiver_query::{
    make_cursor, ExecutionConfig, ExecutionContext, Frame, Parameters, PlanNode, SymbolTable,
    TypedValue,
};
use quiver_storage::{DbAccessor, RemoteGraph, Transaction, TransactionEngine, TransactionKiller};
use tracing::info;

use crate::error::{Error, Result};

/// Cluster configuration, delivered at start and immutable afterwards.
#[derive(Clone)]
pub struct ClusterConfig {
    /// Number of workers, the master included. At least 1.
    pub workers: u16,
    /// Execution tuning knobs shared by every worker.
    pub execution: ExecutionConfig,
    /// Default transaction deadline enforced by the killer, if any.
    pub transaction_deadline: Option<Duration>,
    /// How often the transaction killer scans.
    pub killer_interval: Duration,
    /// The durability component behind the snapshot RPC.
    pub durability: Arc<dyn DurabilityHooks>,
}

impl ClusterConfig {
    /// The default configuration for `workers` workers.
    #[must_use]
    pub fn new(workers: u16) -> Self {
        Self {
            workers: workers.max(1),
            execution: ExecutionConfig::default(),
            transaction_deadline: None,
            killer_interval: Duration::from_millis(100),
            durability: Arc::new(NoopDurability),
        }
    }

    /// Sets the execution configuration.
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    /// Sets the default transaction deadline.
    #[must_use]
    pub fn with_transaction_deadline(mut self, deadline: Duration) -> Self {
        self.transaction_deadline = Some(deadline);
        self
    }

    /// Sets the durability hooks.
    #[must_use]
    pub fn with_durability(mut self, durability: Arc<dyn DurabilityHooks>) -> Self {
        self.durability = durability;
        self
    }
}

/// A master plus N-1 workers sharing one transaction engine and name
/// registry, exchanging rows and deferred updates over the in-process
/// fabric.
pub struct Cluster {
    coordinator: ClusterCoordinator,
    dispatcher: PlanDispatcher,
    durability_rpc: DurabilityRpcMaster,
    killer: TransactionKiller,
    config: ClusterConfig,
    names: Arc<NameRegistry>,
    shut_down: AtomicBool,
    shutdown_signal: (Mutex<bool>, Condvar),
}

impl Cluster {
    /// Starts a cluster with default configuration.
    #[must_use]
    pub fn start(workers: u16) -> Self {
        Self::with_config(ClusterConfig::new(workers))
    }

    /// Starts a cluster with explicit configuration.
    #[must_use]
    pub fn with_config(config: ClusterConfig) -> Self {
        let engine = Arc::new(TransactionEngine::new());
        let names = Arc::new(NameRegistry::new());
        let registry = Arc::new(WorkerRegistry::new());

        let expected: Vec<WorkerId> = (0..config.workers).map(WorkerId::new).collect();
        for &id in &expected {
            registry.register(Arc::new(WorkerNode::new(
                id,
                Arc::clone(&engine),
                Arc::clone(&names),
                Arc::clone(&config.durability),
                config.execution.clone(),
            )));
        }
        // In-process registration is immediate; the sweep still runs so
        // startup matches the discovery protocol.
        registry
            .await_workers(&expected, Duration::from_secs(30))
            .expect("in-process workers always register");

        let coordinator = ClusterCoordinator::new(Arc::clone(&registry), Arc::clone(&engine));
        let dispatcher = PlanDispatcher::new(Arc::clone(&registry));
        let durability_rpc = DurabilityRpcMaster::new(registry);
        let killer = TransactionKiller::spawn(engine, config.killer_interval);
        info!(workers = config.workers, "cluster started");

        Self {
            coordinator,
            dispatcher,
            durability_rpc,
            killer,
            config,
            names,
            shut_down: AtomicBool::new(false),
            shutdown_signal: (Mutex::new(false), Condvar::new()),
        }
    }

    /// The cluster-wide name registry.
    #[must_use]
    pub fn names(&self) -> &Arc<NameRegistry> {
        &self.names
    }

    /// The coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &ClusterCoordinator {
        &self.coordinator
    }

    /// The plan dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &PlanDispatcher {
        &self.dispatcher
    }

    /// Every worker id, master first.
    #[must_use]
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.coordinator.registry().worker_ids()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            Err(Error::Shutdown)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Begins a transaction; `deadline` overrides the configured default.
    pub fn begin(&self, deadline: Option<Duration>) -> Result<Transaction> {
        Ok(self.coordinator.begin(deadline.or(self.config.transaction_deadline))?)
    }

    /// Commits a transaction cluster-wide.
    pub fn commit(&self, tx: &Transaction) -> Result<()> {
        self.coordinator.commit(tx).map_err(Error::from)
    }

    /// Aborts a transaction cluster-wide. Idempotent.
    pub fn abort(&self, tx: &Transaction) {
        self.coordinator.abort(tx);
    }

    /// An accessor on a worker for a transaction.
    pub fn accessor_on(&self, worker: WorkerId, tx: &Transaction) -> Result<DbAccessor> {
        self.ensure_running()?;
        let node = self.coordinator.registry().get(worker)?;
        let remote: Arc<dyn RemoteGraph> = Arc::new(self.coordinator.clone());
        Ok(node.accessor(tx.id(), remote)?)
    }

    /// An accessor on the master for a transaction.
    pub fn accessor(&self, tx: &Transaction) -> Result<DbAccessor> {
        self.accessor_on(WorkerId::MASTER, tx)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// An execution context wired to this cluster.
    #[must_use]
    pub fn execution_context(&self, parameters: Parameters) -> ExecutionContext {
        ExecutionContext::new()
            .with_parameters(parameters)
            .with_config(self.config.execution.clone())
            .with_coordinator(Arc::new(self.coordinator.clone()))
    }

    /// Runs a plan on the master inside an existing transaction and
    /// collects the rows of its output symbols.
    pub fn pull_all(
        &self,
        tx: &Transaction,
        plan: &PlanNode,
        symbol_table: &SymbolTable,
        parameters: Parameters,
    ) -> Result<Vec<Vec<TypedValue>>> {
        self.ensure_running()?;
        let dba = self.accessor(tx)?;
        let mut cursor = make_cursor(plan, &dba)?;
        let mut ctx = self.execution_context(parameters);
        let mut frame = Frame::new(symbol_table.len());
        let output_symbols = plan.output_symbols();

        let mut rows = Vec::new();
        loop {
            match cursor.pull(&mut frame, &mut ctx) {
                Ok(true) => {
                    rows.push(output_symbols.iter().map(|s| frame.get(s).clone()).collect());
                }
                Ok(false) => break,
                Err(error) => {
                    // Every surfaced error aborts the transaction.
                    self.abort(tx);
                    return Err(error.into());
                }
            }
        }
        Ok(rows)
    }

    /// Runs a plan in a fresh transaction and commits it.
    pub fn execute(
        &self,
        plan: &PlanNode,
        symbol_table: &SymbolTable,
        parameters: Parameters,
    ) -> Result<Vec<Vec<TypedValue>>> {
        let tx = self.begin(None)?;
        let rows = self.pull_all(&tx, plan, symbol_table, parameters)?;
        self.commit(&tx)?;
        Ok(rows)
    }

    /// Dispatches a worker sub-plan cluster-wide.
    pub fn dispatch_plan(
        &self,
        plan_id: PlanId,
        subplan: &PlanNode,
        symbol_table: &SymbolTable,
    ) -> Result<()> {
        Ok(self.dispatcher.dispatch(plan_id, subplan, symbol_table)?)
    }

    /// Removes a dispatched sub-plan cluster-wide.
    pub fn remove_plan(&self, plan_id: PlanId) {
        self.dispatcher.remove(plan_id);
    }

    // ------------------------------------------------------------------
    // Admin surface
    // ------------------------------------------------------------------

    /// Writes a durable snapshot on every worker.
    pub fn make_snapshot(&self) -> Result<bool> {
        self.ensure_running()?;
        let tx = self.begin(None)?;
        let ok = self.durability_rpc.make_snapshot(tx.id());
        self.commit(&tx)?;
        Ok(ok)
    }

    /// Shuts the cluster down. Idempotent. A poisoned signal lock still
    /// shuts down; only waiters are left to time out on their own.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.killer.shutdown();
        let (lock, condvar) = &self.shutdown_signal;
        if let Ok(mut down) = lock.lock() {
            *down = true;
        }
        condvar.notify_all();
        info!("cluster shut down");
    }

    /// Blocks until `shutdown` has been called. Idempotent. A poisoned
    /// signal lock reads as already shut down.
    pub fn await_shutdown(&self) {
        let (lock, condvar) = &self.shutdown_signal;
        let Ok(mut down) = lock.lock() else {
            return;
        };
        while !*down {
            match condvar.wait(down) {
                Ok(guard) => down = guard,
                Err(_) => return,
            }
        }
    }

    /// Convenience: resolves user parameter names via a query's stripped
    /// positions is the interpreter's job; this helper just builds a
    /// positional parameter set from `(position, value)` pairs.
    #[must_use]
    pub fn parameters(pairs: &[(usize, PropertyValue)]) -> Parameters {
        let mut parameters = Parameters::new();
        for (position, value) in pairs {
            parameters.add(*position, value.clone());
        }
        parameters
    }

    /// Looks up a transaction's status for tests and tooling.
    pub fn tx_status(&self, tx: TxId) -> Result<quiver_storage::TxStatus> {
        Ok(self.coordinator.engine().status(tx)?)
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster").field("workers", &self.config.workers).finish_non_exhaustive()
    }
}
