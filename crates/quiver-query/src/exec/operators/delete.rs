//! The delete operator.

use quiver_storage::{DbAccessor, StorageError, View};

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{BoxedCursor, Cursor};
use crate::expr::{evaluate, Expression, GraphView};
use crate::frame::Frame;
use crate::value::TypedValue;

/// Deletes the entities its expressions evaluate to.
///
/// Expressions evaluate under NEW so entities created earlier in the same
/// query are deletable. Edges are deleted before vertices (an undeleted
/// edge would block a plain vertex delete); Nulls are skipped; anything
/// else is a runtime error.
pub struct DeleteCursor {
    expressions: Vec<Expression>,
    detach: bool,
    input: BoxedCursor,
    dba: DbAccessor,
}

impl DeleteCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        expressions: Vec<Expression>,
        detach: bool,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        Self { expressions, detach, input, dba }
    }
}

impl Cursor for DeleteCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }

        let results = self
            .expressions
            .iter()
            .map(|e| evaluate(e, frame, &ctx.parameters, &self.dba, GraphView::New))
            .collect::<QueryResult<Vec<_>>>()?;

        // Edges first.
        for value in &results {
            if let TypedValue::Edge(edge) = value {
                match self.dba.remove_edge(edge) {
                    // Another row already deleted it; fine.
                    Ok(()) | Err(StorageError::RecordDeleted(_) | StorageError::NotFound(_)) => {}
                    Err(other) => return Err(other.into()),
                }
            }
        }

        for value in &results {
            match value {
                TypedValue::Vertex(vertex) => {
                    let vertex = vertex.with_view(View::New);
                    let result = if self.detach {
                        self.dba.detach_remove_vertex(&vertex)
                    } else {
                        self.dba.remove_vertex(&vertex)
                    };
                    match result {
                        Ok(()) => {}
                        Err(StorageError::VertexHasEdges(_)) => {
                            return Err(QueryError::Runtime(
                                "failed to remove vertex because of its existing connections, \
                                 consider using DETACH DELETE"
                                    .into(),
                            ))
                        }
                        // Another row already deleted it; fine.
                        Err(StorageError::RecordDeleted(_) | StorageError::NotFound(_)) => {}
                        Err(other) => return Err(other.into()),
                    }
                }
                // Edges are already gone; Nulls come from optional match.
                TypedValue::Edge(_) | TypedValue::Null => {}
                other => {
                    return Err(QueryError::Runtime(format!(
                        "can only delete edges and vertices, got {}",
                        other.type_name()
                    )))
                }
            }
        }

        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()
    }
}
