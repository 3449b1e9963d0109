//! The `Once` operator.

use crate::error::QueryResult;
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::Cursor;
use crate::frame::Frame;

/// Yields one empty row, then exhausts. The initial driver for operators
/// without input.
#[derive(Debug, Default)]
pub struct OnceCursor {
    did_pull: bool,
}

impl OnceCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cursor for OnceCursor {
    fn pull(&mut self, _frame: &mut Frame, _ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if self.did_pull {
            return Ok(false);
        }
        self.did_pull = true;
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.did_pull = false;
        Ok(())
    }
}
