//! Plan dispatch.
//!
//! At plan-build time the distributed planner ships each worker sub-plan
//! to every worker and refers to it by `plan_id`; when the cached plan is
//! dropped the sub-plans are removed again. The dispatcher is the
//! client side of that exchange.

use std::sync::Arc;

use quiver_core::PlanId;
use quiver_query::{PlanNode, SymbolTable};
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::registry::WorkerRegistry;
use crate::rpc::{PlanDispatchMsg, PlanRemoveMsg};

/// Ships sub-plans to every worker.
#[derive(Debug, Clone)]
pub struct PlanDispatcher {
    registry: Arc<WorkerRegistry>,
}

impl PlanDispatcher {
    /// Creates a dispatcher over a registry.
    #[must_use]
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatches a sub-plan to every worker.
    ///
    /// The message round-trips through its serialized form (the payload a
    /// wire transport would carry), so a plan that cannot ship is caught
    /// here rather than on a worker.
    pub fn dispatch(
        &self,
        plan_id: PlanId,
        subplan: &PlanNode,
        symbol_table: &SymbolTable,
    ) -> ClusterResult<()> {
        let msg = PlanDispatchMsg {
            plan_id,
            subplan: subplan.clone(),
            symbol_table: symbol_table.clone(),
        };
        let payload =
            serde_json::to_vec(&msg).map_err(|e| ClusterError::Serialization(e.to_string()))?;
        debug!(plan = %plan_id, bytes = payload.len(), "dispatching sub-plan to all workers");
        for worker in self.registry.workers() {
            let msg: PlanDispatchMsg = serde_json::from_slice(&payload)
                .map_err(|e| ClusterError::Serialization(e.to_string()))?;
            worker.dispatch_plan(msg.plan_id, msg.subplan, msg.symbol_table)?;
        }
        Ok(())
    }

    /// Removes a sub-plan from every worker.
    pub fn remove(&self, plan_id: PlanId) {
        let msg = PlanRemoveMsg { plan_id };
        for worker in self.registry.workers() {
            worker.remove_plan(msg.plan_id);
        }
    }
}

/// Keeps a dispatched plan registered for as long as it is alive.
///
/// Cached distributed plans hold one of these as their dispatch guard;
/// dropping the last clone removes the sub-plans cluster-wide.
pub struct DispatchGuard {
    dispatcher: PlanDispatcher,
    plan_id: PlanId,
}

impl DispatchGuard {
    /// Dispatches and guards a sub-plan.
    pub fn dispatch(
        dispatcher: PlanDispatcher,
        plan_id: PlanId,
        subplan: &PlanNode,
        symbol_table: &SymbolTable,
    ) -> ClusterResult<Self> {
        dispatcher.dispatch(plan_id, subplan, symbol_table)?;
        Ok(Self { dispatcher, plan_id })
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.dispatcher.remove(self.plan_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durability::NoopDurability;
    use crate::worker::WorkerNode;
    use quiver_core::{NameRegistry, WorkerId};
    use quiver_query::{ExecutionConfig, SymbolTable};
    use quiver_storage::TransactionEngine;

    fn registry_with_workers(n: u16) -> Arc<WorkerRegistry> {
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
        registry
    }

    #[test]
    fn dispatch_reaches_every_worker_and_guard_removes() {
        let registry = registry_with_workers(3);
        let dispatcher = PlanDispatcher::new(Arc::clone(&registry));
        let plan_id = PlanId(7);

        {
            let _guard = DispatchGuard::dispatch(
                dispatcher,
                plan_id,
                &PlanNode::Once,
                &SymbolTable::new(),
            )
            .unwrap();
            for worker in registry.workers() {
                assert!(worker.has_plan(plan_id));
            }
        }
        // Guard dropped: sub-plans removed everywhere.
        for worker in registry.workers() {
            assert!(!worker.has_plan(plan_id));
        }
    }
}
