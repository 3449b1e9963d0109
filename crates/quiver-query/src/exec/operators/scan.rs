//! The vertex scan operators.
//!
//! One cursor serves all four scan flavors: the spec decides how the
//! vertex sequence is produced per input row. The sequence getter runs
//! again on every input row, so the scan is restartable by construction.

use quiver_core::{LabelId, PropertyId};
use quiver_storage::{Bound, DbAccessor, VertexAccessor, View};

use crate::error::QueryResult;
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{check_abort, BoxedCursor, Cursor};
use crate::expr::{evaluate, Expression, GraphView};
use crate::frame::Frame;
use crate::plan::PlanBound;
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// Which scan flavor runs.
#[derive(Debug, Clone)]
pub enum ScanSpec {
    /// Every vertex.
    All,
    /// Vertices carrying a label.
    ByLabel {
        /// The required label.
        label: LabelId,
    },
    /// Index lookup by exact value; a Null value skips the input row.
    ByLabelPropertyValue {
        /// The indexed label.
        label: LabelId,
        /// The indexed property.
        property: PropertyId,
        /// The looked-up value expression.
        expression: Expression,
    },
    /// Index lookup by range; at least one bound present.
    ByLabelPropertyRange {
        /// The indexed label.
        label: LabelId,
        /// The indexed property.
        property: PropertyId,
        /// The lower bound, if any.
        lower: Option<PlanBound>,
        /// The upper bound, if any.
        upper: Option<PlanBound>,
    },
}

/// The scan cursor.
pub struct ScanCursor {
    spec: ScanSpec,
    output_symbol: Symbol,
    view: View,
    graph_view: GraphView,
    input: BoxedCursor,
    dba: DbAccessor,
    vertices: Option<std::vec::IntoIter<VertexAccessor>>,
}

impl ScanCursor {
    /// Creates a scan cursor. The planner guarantees the view is not
    /// `AsIs`.
    #[must_use]
    pub fn new(
        spec: ScanSpec,
        output_symbol: Symbol,
        view: GraphView,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        let storage_view = match view {
            GraphView::New => View::New,
            // AS_IS is planner-rejected for scans; fall back to OLD.
            GraphView::Old | GraphView::AsIs => View::Old,
        };
        Self { spec, output_symbol, view: storage_view, graph_view: view, input, dba, vertices: None }
    }

    /// Produces the vertex sequence for the current input row, or `None`
    /// when the row is to be skipped (Null lookup value).
    fn vertices(
        &self,
        frame: &Frame,
        ctx: &ExecutionContext,
    ) -> QueryResult<Option<Vec<VertexAccessor>>> {
        match &self.spec {
            ScanSpec::All => Ok(Some(self.dba.vertices(self.view)?)),
            ScanSpec::ByLabel { label } => {
                Ok(Some(self.dba.vertices_by_label(*label, self.view)?))
            }
            ScanSpec::ByLabelPropertyValue { label, property, expression } => {
                let value =
                    evaluate(expression, frame, &ctx.parameters, &self.dba, self.graph_view)?;
                if value.is_null() {
                    return Ok(None);
                }
                let property_value = value.to_property()?;
                Ok(Some(self.dba.vertices_by_label_value(
                    *label,
                    *property,
                    &property_value,
                    self.view,
                )?))
            }
            ScanSpec::ByLabelPropertyRange { label, property, lower, upper } => {
                let eval_bound = |bound: &Option<PlanBound>| -> QueryResult<Option<Bound>> {
                    match bound {
                        None => Ok(None),
                        Some(b) => {
                            let value = evaluate(
                                &b.expression,
                                frame,
                                &ctx.parameters,
                                &self.dba,
                                self.graph_view,
                            )?;
                            Ok(Some(Bound { value: value.to_property()?, inclusive: b.inclusive }))
                        }
                    }
                };
                let lower = eval_bound(lower)?;
                let upper = eval_bound(upper)?;
                Ok(Some(self.dba.vertices_by_label_range(
                    *label,
                    *property,
                    lower.as_ref(),
                    upper.as_ref(),
                    self.view,
                )?))
            }
        }
    }
}

impl Cursor for ScanCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            check_abort(&self.dba)?;

            if let Some(iter) = &mut self.vertices {
                if let Some(vertex) = iter.next() {
                    frame.set(&self.output_symbol, TypedValue::Vertex(vertex));
                    return Ok(true);
                }
                self.vertices = None;
            }

            if !self.input.pull(frame, ctx)? {
                return Ok(false);
            }
            if let Some(vertices) = self.vertices(frame, ctx)? {
                self.vertices = Some(vertices.into_iter());
            }
            // A skipped row (Null lookup value) loops to the next input.
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()?;
        self.vertices = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::operators::once::OnceCursor;
    use crate::symbols::{SymbolTable, SymbolType};
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
    fn scan_all_yields_every_visible_vertex() {
        let dba = dba();
        dba.insert_vertex().unwrap();
        dba.insert_vertex().unwrap();

        let mut table = SymbolTable::new();
        let n = table.create("n", SymbolType::Vertex, true);
        let mut cursor = ScanCursor::new(
            ScanSpec::All,
            n.clone(),
            GraphView::New,
            Box::new(OnceCursor::new()),
            dba,
        );

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut count = 0;
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            assert!(matches!(frame.get(&n), TypedValue::Vertex(_)));
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn old_view_scan_skips_same_command_inserts() {
        let dba = dba();
        dba.insert_vertex().unwrap();

        let mut table = SymbolTable::new();
        let n = table.create("n", SymbolType::Vertex, true);
        let mut cursor =
            ScanCursor::new(ScanSpec::All, n, GraphView::Old, Box::new(OnceCursor::new()), dba);

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        assert!(!cursor.pull(&mut frame, &mut ctx).unwrap());
    }

    #[test]
    fn null_lookup_value_skips_row() {
        let dba = dba();
        let label = dba.registry().label("L").unwrap();
        let property = dba.registry().property("p").unwrap();
        dba.build_index(label, property).unwrap();

        let mut table = SymbolTable::new();
        let n = table.create("n", SymbolType::Vertex, true);
        let mut cursor = ScanCursor::new(
            ScanSpec::ByLabelPropertyValue {
                label,
                property,
                expression: Expression::Literal(PropertyValue::Null),
            },
            n,
            GraphView::New,
            Box::new(OnceCursor::new()),
            dba,
        );

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        // Not an error: the row is skipped and the scan exhausts.
        assert!(!cursor.pull(&mut frame, &mut ctx).unwrap());
    }
}
