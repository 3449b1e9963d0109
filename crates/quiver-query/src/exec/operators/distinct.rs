//! The distinct operator.

use std::collections::HashSet;

use crate::error::QueryResult;
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{BoxedCursor, Cursor};
use crate::frame::Frame;
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// Deduplicates rows on a symbol tuple.
///
/// Memory is bounded only by the number of distinct tuples in the input.
/// Keys compare with strict structural equality (`Int(1)` and
/// `Double(1.0)` are distinct).
pub struct DistinctCursor {
    value_symbols: Vec<Symbol>,
    input: BoxedCursor,
    seen_rows: HashSet<Vec<TypedValue>>,
}

impl DistinctCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(value_symbols: Vec<Symbol>, input: BoxedCursor) -> Self {
        Self { value_symbols, input, seen_rows: HashSet::new() }
    }
}

impl Cursor for DistinctCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        while self.input.pull(frame, ctx)? {
            let row: Vec<TypedValue> =
                self.value_symbols.iter().map(|s| frame.get(s).clone()).collect();
            if self.seen_rows.insert(row) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()?;
        self.seen_rows.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::operators::unwind::UnwindCursor;
    use crate::expr::Expression;
    use crate::symbols::{SymbolTable, SymbolType};
    use quiver_core::{NameRegistry, WorkerId};
    use quiver_storage::{DbAccessor, GraphStore, LocalOnlyRemote, TransactionEngine};
    use std::sync::Arc;

    #[test]
    fn deduplicates_rows() {
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
        let x = table.create("x", SymbolType::Any, true);
        let list = Expression::ListLiteral(vec![
            Expression::int(1),
            Expression::int(2),
            Expression::int(1),
            Expression::int(3),
            Expression::int(2),
        ]);
        let unwind = UnwindCursor::new(
            list,
            x.clone(),
            Box::new(super::super::once::OnceCursor::new()),
            dba,
        );
        let mut cursor = DistinctCursor::new(vec![x.clone()], Box::new(unwind));

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut values = Vec::new();
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            values.push(frame.get(&x).clone());
        }
        assert_eq!(values, vec![TypedValue::Int(1), TypedValue::Int(2), TypedValue::Int(3)]);
    }
}
