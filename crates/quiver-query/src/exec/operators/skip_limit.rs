//! The skip and limit operators.

use quiver_storage::DbAccessor;

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{BoxedCursor, Cursor};
use crate::expr::{evaluate_int, Expression, GraphView};
use crate::frame::Frame;

/// Skips the first N rows. The expression is evaluated on the first
/// successful input pull; a non-int or negative result is a runtime
/// error.
pub struct SkipCursor {
    expression: Expression,
    input: BoxedCursor,
    dba: DbAccessor,
    to_skip: Option<i64>,
    skipped: i64,
}

impl SkipCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(expression: Expression, input: BoxedCursor, dba: DbAccessor) -> Self {
        Self { expression, input, dba, to_skip: None, skipped: 0 }
    }
}

impl Cursor for SkipCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        while self.input.pull(frame, ctx)? {
            let to_skip = match self.to_skip {
                Some(n) => n,
                None => {
                    let n = evaluate_int(
                        &self.expression,
                        frame,
                        &ctx.parameters,
                        &self.dba,
                        GraphView::Old,
                        "result of SKIP expression",
                    )?;
                    if n < 0 {
                        return Err(QueryError::Runtime(
                            "result of SKIP expression must be greater or equal to zero".into(),
                        ));
                    }
                    self.to_skip = Some(n);
                    n
                }
            };
            if self.skipped < to_skip {
                self.skipped += 1;
                continue;
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()?;
        self.to_skip = None;
        self.skipped = 0;
        Ok(())
    }
}

/// Passes through at most N rows.
///
/// The expression is evaluated before the first input pull (it may be 0,
/// in which case the input must not be pulled at all); it may not contain
/// identifiers.
pub struct LimitCursor {
    expression: Expression,
    input: BoxedCursor,
    dba: DbAccessor,
    limit: Option<i64>,
    pulled: i64,
}

impl LimitCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(expression: Expression, input: BoxedCursor, dba: DbAccessor) -> Self {
        Self { expression, input, dba, limit: None, pulled: 0 }
    }
}

impl Cursor for LimitCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        let limit = match self.limit {
            Some(n) => n,
            None => {
                let n = evaluate_int(
                    &self.expression,
                    frame,
                    &ctx.parameters,
                    &self.dba,
                    GraphView::Old,
                    "result of LIMIT expression",
                )?;
                if n < 0 {
                    return Err(QueryError::Runtime(
                        "result of LIMIT expression must be greater or equal to zero".into(),
                    ));
                }
                self.limit = Some(n);
                n
            }
        };

        if self.pulled >= limit {
            return Ok(false);
        }
        self.pulled += 1;
        self.input.pull(frame, ctx)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()?;
        self.limit = None;
        self.pulled = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::operators::unwind::UnwindCursor;
    use crate::symbols::{Symbol, SymbolTable, SymbolType};
    use crate::value::TypedValue;
    use quiver_core::{NameRegistry, WorkerId};
    use quiver_storage::{GraphStore, LocalOnlyRemote, TransactionEngine};
    use std::sync::Arc;

    fn dba() -> DbAccessor {
        let engine = Arc::new(TransactionEngine::new());
        let store = Arc::new(GraphStore::new(WorkerId::MASTER, Arc::clone(&engine)));
        let tx = engine.begin(None).unwrap();
        DbAccessor::new(store, engine, tx, Arc::new(LocalOnlyRemote), Arc::new(NameRegistry::new()))
    }

    fn unwind_123(dba: &DbAccessor, x: &Symbol) -> BoxedCursor {
        Box::new(UnwindCursor::new(
            Expression::ListLiteral(vec![
                Expression::int(1),
                Expression::int(2),
                Expression::int(3),
            ]),
            x.clone(),
            Box::new(super::super::once::OnceCursor::new()),
            dba.clone(),
        ))
    }

    #[test]
    fn skip_drops_leading_rows() {
        let dba = dba();
        let mut table = SymbolTable::new();
        let x = table.create("x", SymbolType::Any, true);
        let mut cursor = SkipCursor::new(Expression::int(2), unwind_123(&dba, &x), dba);

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut values = Vec::new();
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            values.push(frame.get(&x).clone());
        }
        assert_eq!(values, vec![TypedValue::Int(3)]);
    }

    #[test]
    fn limit_caps_rows() {
        let dba = dba();
        let mut table = SymbolTable::new();
        let x = table.create("x", SymbolType::Any, true);
        let mut cursor = LimitCursor::new(Expression::int(2), unwind_123(&dba, &x), dba);

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut values = Vec::new();
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            values.push(frame.get(&x).clone());
        }
        assert_eq!(values, vec![TypedValue::Int(1), TypedValue::Int(2)]);
    }

    #[test]
    fn negative_skip_and_limit_are_runtime_errors() {
        let dba = dba();
        let mut table = SymbolTable::new();
        let x = table.create("x", SymbolType::Any, true);
        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();

        let mut skip = SkipCursor::new(Expression::int(-1), unwind_123(&dba, &x), dba.clone());
        assert!(matches!(skip.pull(&mut frame, &mut ctx), Err(QueryError::Runtime(_))));

        let mut limit = LimitCursor::new(Expression::int(-1), unwind_123(&dba, &x), dba);
        assert!(matches!(limit.pull(&mut frame, &mut ctx), Err(QueryError::Runtime(_))));
    }

    #[test]
    fn non_int_limit_is_a_runtime_error() {
        let dba = dba();
        let mut table = SymbolTable::new();
        let x = table.create("x", SymbolType::Any, true);
        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();

        let mut limit =
            LimitCursor::new(Expression::string("two"), unwind_123(&dba, &x), dba);
        assert!(matches!(limit.pull(&mut frame, &mut ctx), Err(QueryError::Runtime(_))));
    }
}
