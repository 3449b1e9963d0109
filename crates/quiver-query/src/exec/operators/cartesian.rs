//! The cartesian product operator.

use crate::error::QueryResult;
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{BoxedCursor, Cursor};
use crate::frame::Frame;
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// Materializes the left branch fully; for each right row, replays every
/// left row, restoring both sides' symbols onto the frame.
pub struct CartesianCursor {
    left_symbols: Vec<Symbol>,
    right_symbols: Vec<Symbol>,
    left: BoxedCursor,
    right: BoxedCursor,
    left_frames: Vec<Vec<TypedValue>>,
    left_index: usize,
    right_frame: Vec<TypedValue>,
    initialized: bool,
}

impl CartesianCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        left_symbols: Vec<Symbol>,
        right_symbols: Vec<Symbol>,
        left: BoxedCursor,
        right: BoxedCursor,
    ) -> Self {
        Self {
            left_symbols,
            right_symbols,
            left,
            right,
            left_frames: Vec::new(),
            left_index: 0,
            right_frame: Vec::new(),
            initialized: false,
        }
    }

    fn restore(frame: &mut Frame, symbols: &[Symbol], saved: &[TypedValue]) {
        for symbol in symbols {
            frame.set(symbol, saved[symbol.position()].clone());
        }
    }
}

impl Cursor for CartesianCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.initialized {
            while self.left.pull(frame, ctx)? {
                self.left_frames.push(frame.snapshot());
            }
            // Position at the end so the first pull advances the right
            // branch.
            self.left_index = self.left_frames.len();
            self.initialized = true;
        }

        // No left rows: empty product.
        if self.left_frames.is_empty() {
            return Ok(false);
        }

        if self.left_index >= self.left_frames.len() {
            if !self.right.pull(frame, ctx)? {
                return Ok(false);
            }
            self.right_frame = frame.snapshot();
            self.left_index = 0;
        } else {
            // Make sure the right branch's last row is back on the frame.
            Self::restore(frame, &self.right_symbols, &self.right_frame);
        }

        Self::restore(frame, &self.left_symbols, &self.left_frames[self.left_index]);
        self.left_index += 1;
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.left.reset()?;
        self.right.reset()?;
        self.left_frames.clear();
        self.left_index = 0;
        self.right_frame.clear();
        self.initialized = false;
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
    fn produces_all_pairs() {
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
        let a = table.create("a", SymbolType::Any, true);
        let b = table.create("b", SymbolType::Any, true);

        let left = UnwindCursor::new(
            Expression::ListLiteral(vec![Expression::int(1), Expression::int(2)]),
            a.clone(),
            Box::new(super::super::once::OnceCursor::new()),
            dba.clone(),
        );
        let right = UnwindCursor::new(
            Expression::ListLiteral(vec![Expression::int(10), Expression::int(20)]),
            b.clone(),
            Box::new(super::super::once::OnceCursor::new()),
            dba,
        );
        let mut cursor = CartesianCursor::new(
            vec![a.clone()],
            vec![b.clone()],
            Box::new(left),
            Box::new(right),
        );

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut pairs = Vec::new();
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            pairs.push((
                frame.get(&a).as_int().unwrap(),
                frame.get(&b).as_int().unwrap(),
            ));
        }
        pairs.sort_unstable();
        assert_eq!(pairs, vec![(1, 10), (1, 20), (2, 10), (2, 20)]);
    }

    #[test]
    fn empty_left_yields_nothing() {
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
        let a = table.create("a", SymbolType::Any, true);
        let b = table.create("b", SymbolType::Any, true);

        let left = UnwindCursor::new(
            Expression::ListLiteral(Vec::new()),
            a.clone(),
            Box::new(super::super::once::OnceCursor::new()),
            dba.clone(),
        );
        let right = UnwindCursor::new(
            Expression::ListLiteral(vec![Expression::int(10)]),
            b.clone(),
            Box::new(super::super::once::OnceCursor::new()),
            dba,
        );
        let mut cursor =
            CartesianCursor::new(vec![a], vec![b], Box::new(left), Box::new(right));

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        assert!(!cursor.pull(&mut frame, &mut ctx).unwrap());
    }
}
