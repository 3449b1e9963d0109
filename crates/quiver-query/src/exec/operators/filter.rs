//! The filter operator.

use quiver_storage::DbAccessor;

use crate::error::QueryResult;
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{check_abort, BoxedCursor, Cursor};
use crate::expr::{evaluate_filter, Expression, GraphView};
use crate::frame::Frame;

/// Drops rows whose predicate is not strictly true.
///
/// Filtering observes the OLD view: values set earlier in the same query
/// must not affect which rows pass.
pub struct FilterCursor {
    expression: Expression,
    input: BoxedCursor,
    dba: DbAccessor,
}

impl FilterCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(expression: Expression, input: BoxedCursor, dba: DbAccessor) -> Self {
        Self { expression, input, dba }
    }
}

impl Cursor for FilterCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        while self.input.pull(frame, ctx)? {
            check_abort(&self.dba)?;
            if evaluate_filter(&self.expression, frame, &ctx.parameters, &self.dba, GraphView::Old)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::operators::unwind::UnwindCursor;
    use crate::expr::BinaryOp;
    use crate::symbols::{SymbolTable, SymbolType};
    use crate::value::TypedValue;
    use quiver_core::{NameRegistry, PropertyValue, WorkerId};
    use quiver_storage::{GraphStore, LocalOnlyRemote, TransactionEngine};
    use std::sync::Arc;

    fn dba() -> DbAccessor {
        let engine = Arc::new(TransactionEngine::new());
        let store = Arc::new(GraphStore::new(WorkerId::MASTER, Arc::clone(&engine)));
        let tx = engine.begin(None).unwrap();
        DbAccessor::new(store, engine, tx, Arc::new(LocalOnlyRemote), Arc::new(NameRegistry::new()))
    }

    #[test]
    fn keeps_only_strictly_true_rows() {
        let dba = dba();
        let mut table = SymbolTable::new();
        let x = table.create("x", SymbolType::Any, true);

        // UNWIND [1, 2, 3, null] AS x WHERE x > 1
        let list = Expression::ListLiteral(vec![
            Expression::int(1),
            Expression::int(2),
            Expression::int(3),
            Expression::Literal(PropertyValue::Null),
        ]);
        let unwind = UnwindCursor::new(
            list,
            x.clone(),
            Box::new(super::super::once::OnceCursor::new()),
            dba.clone(),
        );
        let predicate = Expression::ident(x.clone()).binary(BinaryOp::Gt, Expression::int(1));
        let mut cursor = FilterCursor::new(predicate, Box::new(unwind), dba);

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut kept = Vec::new();
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            kept.push(frame.get(&x).clone());
        }
        // The Null comparison result drops the row rather than erroring.
        assert_eq!(kept, vec![TypedValue::Int(2), TypedValue::Int(3)]);
    }
}
