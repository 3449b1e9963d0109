//! The unwind operator.

use quiver_storage::DbAccessor;

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{check_abort, BoxedCursor, Cursor};
use crate::expr::{evaluate, Expression, GraphView};
use crate::frame::Frame;
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// Evaluates a list expression per input row and emits one row per
/// element. Non-list values are a runtime error.
pub struct UnwindCursor {
    list_expression: Expression,
    output_symbol: Symbol,
    input: BoxedCursor,
    dba: DbAccessor,
    elements: std::vec::IntoIter<TypedValue>,
}

impl UnwindCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        list_expression: Expression,
        output_symbol: Symbol,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        Self { list_expression, output_symbol, input, dba, elements: Vec::new().into_iter() }
    }
}

impl Cursor for UnwindCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            check_abort(&self.dba)?;

            if let Some(value) = self.elements.next() {
                frame.set(&self.output_symbol, value);
                return Ok(true);
            }

            if !self.input.pull(frame, ctx)? {
                return Ok(false);
            }
            let value =
                evaluate(&self.list_expression, frame, &ctx.parameters, &self.dba, GraphView::Old)?;
            let TypedValue::List(items) = value else {
                return Err(QueryError::Runtime(format!(
                    "UNWIND only accepts list values, got {}",
                    value.type_name()
                )));
            };
            self.elements = items.into_iter();
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()?;
        self.elements = Vec::new().into_iter();
        Ok(())
    }
}
