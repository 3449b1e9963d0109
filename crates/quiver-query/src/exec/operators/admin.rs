//! DDL and admin operators: index creation, the stream boundary, auth.
//!
//! All of these are single-shot side-effect cursors and none of them may
//! run inside an explicit multi-statement transaction.

use quiver_core::{LabelId, PropertyId};
use quiver_storage::DbAccessor;
use tracing::info;

use crate::error::{QueryError, QueryResult};
use crate::exec::admin::{StreamStatusRow, StreamTestRow};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::Cursor;
use crate::frame::Frame;
use crate::plan::StreamSpec;
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// CREATE INDEX: builds a `(label, property)` index once. Creating an
/// index that already exists is ignored.
pub struct CreateIndexCursor {
    label: LabelId,
    property: PropertyId,
    dba: DbAccessor,
    did_create: bool,
}

impl CreateIndexCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(label: LabelId, property: PropertyId, dba: DbAccessor) -> Self {
        Self { label, property, dba, did_create: false }
    }
}

impl Cursor for CreateIndexCursor {
    fn pull(&mut self, _frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if self.did_create {
            return Ok(false);
        }
        if ctx.in_explicit_transaction {
            return Err(QueryError::IndexInMulticommand);
        }
        let built = self.dba.build_index(self.label, self.property)?;
        if built {
            info!(label = %self.label, property = %self.property, "index built");
        }
        ctx.is_index_created = true;
        self.did_create = true;
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.did_create = false;
        Ok(())
    }
}

/// Which single-shot stream statement runs.
enum StreamOp {
    Create(StreamSpec),
    Drop(String),
    Start { name: String, limit_batches: Option<i64> },
    Stop(String),
}

impl StreamOp {
    fn name(&self) -> &'static str {
        match self {
            Self::Create(_) => "CREATE STREAM",
            Self::Drop(_) => "DROP STREAM",
            Self::Start { .. } => "START STREAM",
            Self::Stop(_) => "STOP STREAM",
        }
    }
}

/// The shared cursor for the side-effect-only stream statements.
pub struct StreamCursor {
    op: StreamOp,
    did_run: bool,
}

impl StreamCursor {
    /// CREATE STREAM.
    #[must_use]
    pub fn create(spec: StreamSpec) -> Self {
        Self { op: StreamOp::Create(spec), did_run: false }
    }

    /// DROP STREAM.
    #[must_use]
    pub fn drop(name: String) -> Self {
        Self { op: StreamOp::Drop(name), did_run: false }
    }

    /// START STREAM.
    #[must_use]
    pub fn start(name: String, limit_batches: Option<i64>) -> Self {
        Self { op: StreamOp::Start { name, limit_batches }, did_run: false }
    }

    /// STOP STREAM.
    #[must_use]
    pub fn stop(name: String) -> Self {
        Self { op: StreamOp::Stop(name), did_run: false }
    }
}

impl Cursor for StreamCursor {
    fn pull(&mut self, _frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if self.did_run {
            return Ok(false);
        }
        if ctx.in_explicit_transaction {
            return Err(QueryError::AdminInMulticommand { operation: self.op.name().into() });
        }
        match &self.op {
            StreamOp::Create(spec) => ctx.admin.create_stream(spec)?,
            StreamOp::Drop(name) => ctx.admin.drop_stream(name)?,
            StreamOp::Start { name, limit_batches } => {
                ctx.admin.start_stream(name, *limit_batches)?;
            }
            StreamOp::Stop(name) => ctx.admin.stop_stream(name)?,
        }
        self.did_run = true;
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.did_run = false;
        Ok(())
    }
}

/// SHOW STREAMS: one row per registered stream.
pub struct ShowStreamsCursor {
    output_symbols: Vec<Symbol>,
    rows: Option<std::vec::IntoIter<StreamStatusRow>>,
}

impl ShowStreamsCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(output_symbols: Vec<Symbol>) -> Self {
        Self { output_symbols, rows: None }
    }
}

impl Cursor for ShowStreamsCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if self.rows.is_none() {
            if ctx.in_explicit_transaction {
                return Err(QueryError::AdminInMulticommand { operation: "SHOW STREAMS".into() });
            }
            self.rows = Some(ctx.admin.show_streams()?.into_iter());
        }
        let Some(row) = self.rows.as_mut().and_then(Iterator::next) else {
            return Ok(false);
        };
        let values = [row.name, row.uri, row.transform, row.status];
        for (symbol, value) in self.output_symbols.iter().zip(values) {
            frame.set(symbol, TypedValue::String(value));
        }
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.rows = None;
        Ok(())
    }
}

/// TEST STREAM: dry-runs a stream's transform.
pub struct TestStreamCursor {
    name: String,
    limit_batches: Option<i64>,
    output_symbols: Vec<Symbol>,
    rows: Option<std::vec::IntoIter<StreamTestRow>>,
}

impl TestStreamCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(name: String, limit_batches: Option<i64>, output_symbols: Vec<Symbol>) -> Self {
        Self { name, limit_batches, output_symbols, rows: None }
    }
}

impl Cursor for TestStreamCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if self.rows.is_none() {
            if ctx.in_explicit_transaction {
                return Err(QueryError::AdminInMulticommand { operation: "TEST STREAM".into() });
            }
            self.rows = Some(ctx.admin.test_stream(&self.name, self.limit_batches)?.into_iter());
        }
        let Some(row) = self.rows.as_mut().and_then(Iterator::next) else {
            return Ok(false);
        };
        let values = [row.query, row.parameters];
        for (symbol, value) in self.output_symbols.iter().zip(values) {
            frame.set(symbol, TypedValue::String(value));
        }
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.rows = None;
        Ok(())
    }
}

/// An auth statement handed to the delegate, its rows streamed back.
pub struct AuthQueryCursor {
    statement: String,
    output_symbols: Vec<Symbol>,
    rows: Option<std::vec::IntoIter<Vec<String>>>,
}

impl AuthQueryCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(statement: String, output_symbols: Vec<Symbol>) -> Self {
        Self { statement, output_symbols, rows: None }
    }
}

impl Cursor for AuthQueryCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if self.rows.is_none() {
            if ctx.in_explicit_transaction {
                return Err(QueryError::AdminInMulticommand { operation: "auth query".into() });
            }
            self.rows = Some(ctx.admin.auth_query(&self.statement)?.into_iter());
        }
        let Some(row) = self.rows.as_mut().and_then(Iterator::next) else {
            return Ok(false);
        };
        for (symbol, value) in self.output_symbols.iter().zip(row) {
            frame.set(symbol, TypedValue::String(value));
        }
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.rows = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::{NameRegistry, WorkerId};
    use quiver_storage::{GraphStore, LocalOnlyRemote, TransactionEngine};
    use std::sync::Arc;

    fn dba() -> DbAccessor {
        let engine = Arc::new(TransactionEngine::new());
        let store = Arc::new(GraphStore::new(WorkerId::MASTER, Arc::clone(&engine)));
        let tx = engine.begin(None).unwrap();
        DbAccessor::new(store, engine, tx, Arc::new(LocalOnlyRemote), Arc::new(NameRegistry::new()))
    }

    #[test]
    fn create_index_runs_once_and_flags_context() {
        let dba = dba();
        let label = dba.registry().label("L").unwrap();
        let property = dba.registry().property("p").unwrap();
        let mut cursor = CreateIndexCursor::new(label, property, dba.clone());

        let mut frame = Frame::new(0);
        let mut ctx = ExecutionContext::new();
        assert!(cursor.pull(&mut frame, &mut ctx).unwrap());
        assert!(ctx.is_index_created);
        assert!(!cursor.pull(&mut frame, &mut ctx).unwrap());
        assert!(dba.store().index_exists(label, property).unwrap());

        // Creating it again is not an error.
        let mut again = CreateIndexCursor::new(label, property, dba);
        let mut ctx = ExecutionContext::new();
        assert!(again.pull(&mut frame, &mut ctx).unwrap());
    }

    #[test]
    fn create_index_refuses_explicit_transactions() {
        let dba = dba();
        let label = dba.registry().label("L").unwrap();
        let property = dba.registry().property("p").unwrap();
        let mut cursor = CreateIndexCursor::new(label, property, dba);

        let mut frame = Frame::new(0);
        let mut ctx = ExecutionContext::new().in_explicit_transaction();
        assert!(matches!(
            cursor.pull(&mut frame, &mut ctx),
            Err(QueryError::IndexInMulticommand)
        ));
    }

    #[test]
    fn stream_ops_refuse_explicit_transactions() {
        let mut cursor = StreamCursor::drop("s".into());
        let mut frame = Frame::new(0);
        let mut ctx = ExecutionContext::new().in_explicit_transaction();
        assert!(matches!(
            cursor.pull(&mut frame, &mut ctx),
            Err(QueryError::AdminInMulticommand { .. })
        ));
    }

    #[test]
    fn show_streams_is_empty_without_a_backend() {
        let mut cursor = ShowStreamsCursor::new(Vec::new());
        let mut frame = Frame::new(0);
        let mut ctx = ExecutionContext::new();
        assert!(!cursor.pull(&mut frame, &mut ctx).unwrap());
    }
}
