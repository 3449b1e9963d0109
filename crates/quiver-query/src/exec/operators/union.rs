//! The union operator.

use std::collections::HashMap;

use crate::error::QueryResult;
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{BoxedCursor, Cursor};
use crate::frame::Frame;
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// Streams the left branch to exhaustion, then the right branch, mapping
/// each branch's output symbols onto the union's output symbols by name.
pub struct UnionCursor {
    union_symbols: Vec<Symbol>,
    left_symbols: Vec<Symbol>,
    right_symbols: Vec<Symbol>,
    left: BoxedCursor,
    right: BoxedCursor,
}

impl UnionCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        union_symbols: Vec<Symbol>,
        left_symbols: Vec<Symbol>,
        right_symbols: Vec<Symbol>,
        left: BoxedCursor,
        right: BoxedCursor,
    ) -> Self {
        Self { union_symbols, left_symbols, right_symbols, left, right }
    }
}

impl Cursor for UnionCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        let mut results: HashMap<String, TypedValue> = HashMap::new();
        if self.left.pull(frame, ctx)? {
            for symbol in &self.left_symbols {
                results.insert(symbol.name().to_owned(), frame.get(symbol).clone());
            }
        } else if self.right.pull(frame, ctx)? {
            for symbol in &self.right_symbols {
                results.insert(symbol.name().to_owned(), frame.get(symbol).clone());
            }
        } else {
            return Ok(false);
        }

        for symbol in &self.union_symbols {
            let value = results.remove(symbol.name()).unwrap_or(TypedValue::Null);
            frame.set(symbol, value);
        }
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.left.reset()?;
        self.right.reset()
    }
}
