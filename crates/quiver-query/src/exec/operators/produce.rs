//! The produce (projection) operator.

use quiver_storage::DbAccessor;

use crate::error::QueryResult;
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{BoxedCursor, Cursor};
use crate::expr::{evaluate, GraphView};
use crate::frame::Frame;
use crate::plan::NamedExpression;

/// Evaluates named expressions into the frame.
///
/// Produce always yields the latest results, so it evaluates under NEW.
pub struct ProduceCursor {
    named_expressions: Vec<NamedExpression>,
    input: BoxedCursor,
    dba: DbAccessor,
}

impl ProduceCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(named_expressions: Vec<NamedExpression>, input: BoxedCursor, dba: DbAccessor) -> Self {
        Self { named_expressions, input, dba }
    }
}

impl Cursor for ProduceCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        for named in &self.named_expressions {
            let value =
                evaluate(&named.expression, frame, &ctx.parameters, &self.dba, GraphView::New)?;
            frame.set(&named.symbol, value);
        }
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expression;
    use crate::symbols::{SymbolTable, SymbolType};
    use crate::value::TypedValue;
    use quiver_core::{NameRegistry, WorkerId};
    use quiver_storage::{GraphStore, LocalOnlyRemote, TransactionEngine};
    use std::sync::Arc;

    #[test]
    fn evaluates_projections() {
        let engine = Arc::new(TransactionEngine::new());
        let store = Arc::new(GraphStore::new(WorkerId::MASTER, Arc::clone(&engine)));
        let tx = engine.begin(None).unwrap();
        let dba = DbAccessor::new(
            store,
            engine,
            tx,
            Arc::new(LocalOnlyRemote),
            Arc::new(NameRegistry::new()),
        );

        let mut table = SymbolTable::new();
        let out = table.create("x", SymbolType::Any, true);
        let mut cursor = ProduceCursor::new(
            vec![NamedExpression {
                name: "x".into(),
                expression: Expression::int(1).add(Expression::int(2)),
                symbol: out.clone(),
            }],
            Box::new(super::super::once::OnceCursor::new()),
            dba,
        );

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        assert!(cursor.pull(&mut frame, &mut ctx).unwrap());
        assert_eq!(frame.get(&out), &TypedValue::Int(3));
        assert!(!cursor.pull(&mut frame, &mut ctx).unwrap());
    }
}
