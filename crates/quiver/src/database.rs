//! The single-worker embedding surface.

use std::collections::HashMap;
use std::time::Duration;

use quiver_core::PropertyValue;
use quiver_query::interpreter::PreparedQuery;
use quiver_query::{Interpreter, Parameters, PlanNode, SymbolTable, TypedValue};
use quiver_storage::{DbAccessor, Transaction};

use crate::cluster::{Cluster, ClusterConfig};
use crate::error::Result;

/// A single-worker database: the full execution engine without peers.
///
/// Internally this is a one-worker [`Cluster`], so code written against
/// the accessor and plan surfaces behaves identically when it later runs
/// distributed.
pub struct Database {
    cluster: Cluster,
    interpreter: Option<Interpreter>,
}

impl Database {
    /// Opens an in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self { cluster: Cluster::start(1), interpreter: None }
    }

    /// Opens an in-memory database with explicit configuration.
    #[must_use]
    pub fn with_config(config: ClusterConfig) -> Self {
        Self { cluster: Cluster::with_config(ClusterConfig { workers: 1, ..config }), interpreter: None }
    }

    /// Attaches a Cypher frontend (parser + planner), enabling
    /// [`Database::prepare`].
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: Interpreter) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    /// The underlying one-worker cluster.
    #[must_use]
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// The name registry.
    #[must_use]
    pub fn names(&self) -> &std::sync::Arc<quiver_core::NameRegistry> {
        self.cluster.names()
    }

    /// Begins a transaction.
    pub fn begin(&self, deadline: Option<Duration>) -> Result<Transaction> {
        self.cluster.begin(deadline)
    }

    /// Commits a transaction.
    pub fn commit(&self, tx: &Transaction) -> Result<()> {
        self.cluster.commit(tx)
    }

    /// Aborts a transaction. Idempotent.
    pub fn abort(&self, tx: &Transaction) {
        self.cluster.abort(tx);
    }

    /// An accessor for a transaction.
    pub fn accessor(&self, tx: &Transaction) -> Result<DbAccessor> {
        self.cluster.accessor(tx)
    }

    /// Runs a plan inside an existing transaction.
    pub fn pull_all(
        &self,
        tx: &Transaction,
        plan: &PlanNode,
        symbol_table: &SymbolTable,
        parameters: Parameters,
    ) -> Result<Vec<Vec<TypedValue>>> {
        self.cluster.pull_all(tx, plan, symbol_table, parameters)
    }

    /// Runs a plan in a fresh transaction and commits it.
    pub fn execute(
        &self,
        plan: &PlanNode,
        symbol_table: &SymbolTable,
        parameters: Parameters,
    ) -> Result<Vec<Vec<TypedValue>>> {
        self.cluster.execute(plan, symbol_table, parameters)
    }

    /// Prepares a query string through the attached frontend.
    ///
    /// Requires [`Database::with_interpreter`].
    pub fn prepare(
        &self,
        tx: &Transaction,
        query: &str,
        parameters: &HashMap<String, PropertyValue>,
    ) -> Result<PreparedQuery> {
        let interpreter = self.interpreter.as_ref().ok_or_else(|| {
            crate::error::Error::Query(quiver_query::QueryError::Unsupported(
                "no query frontend attached".into(),
            ))
        })?;
        let dba = self.accessor(tx)?;
        Ok(interpreter.prepare(&dba, query, parameters)?)
    }

    /// Shuts the database down. Idempotent.
    pub fn shutdown(&self) {
        self.cluster.shutdown();
    }

    /// Blocks until shutdown.
    pub fn await_shutdown(&self) {
        self.cluster.await_shutdown();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_storage::View;

    #[test]
    fn create_commit_and_read_back() {
        let db = Database::in_memory();
        let label = db.names().label("Person").unwrap();

        let tx = db.begin(None).unwrap();
        let dba = db.accessor(&tx).unwrap();
        let vertex = dba.insert_vertex().unwrap();
        vertex.add_label(label).unwrap();
        db.commit(&tx).unwrap();

        let tx = db.begin(None).unwrap();
        let dba = db.accessor(&tx).unwrap();
        assert_eq!(dba.vertices_by_label(label, View::New).unwrap().len(), 1);
        db.commit(&tx).unwrap();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let db = Database::in_memory();
        db.shutdown();
        db.shutdown();
        db.await_shutdown();
        // Accessor creation after shutdown fails.
        let tx = db.begin(None).unwrap();
        assert!(db.accessor(&tx).is_err());
    }
}
