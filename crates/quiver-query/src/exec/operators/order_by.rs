//! The order-by operator.

use quiver_storage::DbAccessor;

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{check_abort, BoxedCursor, Cursor};
use crate::expr::{evaluate, Expression, GraphView};
use crate::frame::Frame;
use crate::plan::SortOrder;
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// Buffers the entire input, sorts it by the key expressions (Null sorts
/// after all non-nulls), then streams the sorted rows.
pub struct OrderByCursor {
    order_by: Vec<(SortOrder, Expression)>,
    output_symbols: Vec<Symbol>,
    input: BoxedCursor,
    dba: DbAccessor,
    cache: std::vec::IntoIter<(Vec<TypedValue>, Vec<TypedValue>)>,
    did_pull_all: bool,
}

impl OrderByCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        order_by: Vec<(SortOrder, Expression)>,
        output_symbols: Vec<Symbol>,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        Self {
            order_by,
            output_symbols,
            input,
            dba,
            cache: Vec::new().into_iter(),
            did_pull_all: false,
        }
    }

    /// Compares two key tuples under the configured orderings.
    fn compare(
        &self,
        left: &[TypedValue],
        right: &[TypedValue],
    ) -> QueryResult<std::cmp::Ordering> {
        use std::cmp::Ordering;
        for (((order, _), l), r) in self.order_by.iter().zip(left).zip(right) {
            let ordering = l.order_cmp(r)?;
            if ordering != Ordering::Equal {
                return Ok(match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                });
            }
        }
        Ok(Ordering::Equal)
    }
}

impl Cursor for OrderByCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.did_pull_all {
            let mut cache: Vec<(Vec<TypedValue>, Vec<TypedValue>)> = Vec::new();
            while self.input.pull(frame, ctx)? {
                check_abort(&self.dba)?;
                let keys = self
                    .order_by
                    .iter()
                    .map(|(_, expression)| {
                        evaluate(expression, frame, &ctx.parameters, &self.dba, GraphView::Old)
                    })
                    .collect::<QueryResult<Vec<_>>>()?;
                let output =
                    self.output_symbols.iter().map(|s| frame.get(s).clone()).collect::<Vec<_>>();
                cache.push((keys, output));
            }

            // Comparison failures must surface, so sort through an error
            // slot instead of panicking inside the comparator.
            let mut sort_error: Option<QueryError> = None;
            cache.sort_by(|a, b| match self.compare(&a.0, &b.0) {
                Ok(ordering) => ordering,
                Err(err) => {
                    if sort_error.is_none() {
                        sort_error = Some(err);
                    }
                    std::cmp::Ordering::Equal
                }
            });
            if let Some(err) = sort_error {
                return Err(err);
            }

            self.cache = cache.into_iter();
            self.did_pull_all = true;
        }

        match self.cache.next() {
            Some((_, output)) => {
                for (symbol, value) in self.output_symbols.iter().zip(output) {
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
        self.did_pull_all = false;
        Ok(())
    }
}
