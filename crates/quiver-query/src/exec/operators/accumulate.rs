//! The accumulate operator.

use quiver_storage::DbAccessor;

use crate::error::QueryResult;
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{check_abort, BoxedCursor, Cursor};
use crate::frame::Frame;
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// Buffers the entire input, optionally advances the command, then
/// re-emits the buffered rows.
///
/// The write/read barrier of a single query: everything before it runs to
/// completion before anything after it observes the frame again. With
/// `advance_command` the re-emitted accessor values observe the advanced
/// command (accessors re-resolve on demand, so no per-value reconstruction
/// is needed beyond the command bump itself).
pub struct AccumulateCursor {
    symbols: Vec<Symbol>,
    advance_command: bool,
    input: BoxedCursor,
    dba: DbAccessor,
    cache: std::vec::IntoIter<Vec<TypedValue>>,
    pulled_all_input: bool,
}

impl AccumulateCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        symbols: Vec<Symbol>,
        advance_command: bool,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        Self {
            symbols,
            advance_command,
            input,
            dba,
            cache: Vec::new().into_iter(),
            pulled_all_input: false,
        }
    }
}

impl Cursor for AccumulateCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.pulled_all_input {
            let mut cache = Vec::new();
            while self.input.pull(frame, ctx)? {
                check_abort(&self.dba)?;
                cache.push(self.symbols.iter().map(|s| frame.get(s).clone()).collect());
            }
            self.pulled_all_input = true;

            if self.advance_command {
                self.dba.advance_command();
            }
            self.cache = cache.into_iter();
        }

        match self.cache.next() {
            Some(row) => {
                for (symbol, value) in self.symbols.iter().zip(row) {
                    frame.set(symbol, value);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()?;
        self.cache = Vec::new().into_iter();
        self.pulled_all_input = false;
        Ok(())
    }
}
