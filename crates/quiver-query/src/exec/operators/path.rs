//! Named path construction.

use quiver_storage::DbAccessor;

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{BoxedCursor, Cursor};
use crate::frame::Frame;
use crate::symbols::Symbol;
use crate::value::{Path, TypedValue};

/// Assembles a `Path` value from already-bound vertex, edge and edge-list
/// symbols. A Null anywhere (optional matching) makes the whole path Null.
pub struct ConstructNamedPathCursor {
    path_symbol: Symbol,
    path_elements: Vec<Symbol>,
    input: BoxedCursor,
    dba: DbAccessor,
}

impl ConstructNamedPathCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        path_symbol: Symbol,
        path_elements: Vec<Symbol>,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        Self { path_symbol, path_elements, input, dba }
    }
}

impl Cursor for ConstructNamedPathCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }

        let mut elements = self.path_elements.iter();
        let start_symbol =
            elements.next().ok_or_else(|| QueryError::Semantic("empty named path".into()))?;
        let start = frame.get(start_symbol).clone();
        if start.is_null() {
            frame.set(&self.path_symbol, TypedValue::Null);
            return Ok(true);
        }
        let Some(start_vertex) = start.as_vertex() else {
            return Err(QueryError::Semantic("named path must start with a vertex".into()));
        };
        let mut path = Path::new(start_vertex.clone());

        // A vertex right after an edge list was already appended by the
        // list expansion; skip it.
        let mut last_was_edge_list = false;
        for symbol in elements {
            let value = frame.get(symbol).clone();
            match value {
                TypedValue::Null => {
                    frame.set(&self.path_symbol, TypedValue::Null);
                    return Ok(true);
                }
                TypedValue::Vertex(_) => {
                    // Appending an edge (or an edge list) already appended
                    // the vertex it leads to; the pattern's vertex symbol
                    // only confirms it.
                    last_was_edge_list = false;
                }
                TypedValue::Edge(edge) => {
                    let record = edge.record()?;
                    let last = path.last_vertex().address();
                    let other = if record.from == last { record.to } else { record.from };
                    let vertex = self.dba.vertex_accessor(other, edge.view());
                    path.expand(edge, vertex);
                    last_was_edge_list = false;
                }
                TypedValue::List(edges) => {
                    last_was_edge_list = true;
                    for value in edges {
                        let Some(edge) = value.as_edge() else {
                            return Err(QueryError::Semantic(
                                "named path edge list may only contain edges".into(),
                            ));
                        };
                        let record = edge.record()?;
                        let last = path.last_vertex().address();
                        let other = if record.from == last { record.to } else { record.from };
                        let vertex = self.dba.vertex_accessor(other, edge.view());
                        path.expand(edge.clone(), vertex);
                    }
                }
                other => {
                    return Err(QueryError::Semantic(format!(
                        "unsupported type in named path construction: {}",
                        other.type_name()
                    )))
                }
            }
        }

        frame.set(&self.path_symbol, TypedValue::Path(path));
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()
    }
}
