//! The optional-match operator.

use crate::error::QueryResult;
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{BoxedCursor, Cursor};
use crate::frame::Frame;
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// OPTIONAL MATCH: forwards the optional branch's rows; when the branch
/// yields nothing for a fresh input row, emits one row with the optional
/// symbols set to Null.
pub struct OptionalCursor {
    optional_symbols: Vec<Symbol>,
    input: BoxedCursor,
    optional: BoxedCursor,
    pull_input: bool,
}

impl OptionalCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(optional_symbols: Vec<Symbol>, input: BoxedCursor, optional: BoxedCursor) -> Self {
        Self { optional_symbols, input, optional, pull_input: true }
    }
}

impl Cursor for OptionalCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            if self.pull_input {
                if self.input.pull(frame, ctx)? {
                    // The optional branch's expand iterators keep state.
                    self.optional.reset()?;
                } else {
                    return Ok(false);
                }
            }

            if self.optional.pull(frame, ctx)? {
                self.pull_input = false;
                return Ok(true);
            }

            if self.pull_input {
                // Zero branch rows for a fresh input row: null the
                // optional symbols and emit.
                for symbol in &self.optional_symbols {
                    frame.set(symbol, TypedValue::Null);
                }
                self.pull_input = true;
                return Ok(true);
            }

            self.pull_input = true;
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()?;
        self.optional.reset()?;
        self.pull_input = true;
        Ok(())
    }
}
