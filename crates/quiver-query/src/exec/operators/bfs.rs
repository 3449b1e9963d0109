//! Breadth-first variable-length expansion.
//!
//! One minimal-length path is produced per reached vertex. The cursor
//! keeps a `processed` map from vertex to the edge it was discovered
//! through, and two deques for the current and next depth; the path is
//! reconstructed at yield time by walking the predecessor edges.

use std::collections::{HashMap, VecDeque};

use quiver_storage::{DbAccessor, EdgeAccessor, VertexAccessor};

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{check_abort, expect_vertex, BoxedCursor, Cursor};
use crate::expr::evaluate;
use crate::frame::Frame;
use crate::plan::ExpandDirection;
use crate::value::TypedValue;

use super::expand_variable::VariableSpec;

/// The breadth-first cursor.
pub struct ExpandBfsCursor {
    spec: VariableSpec,
    input: BoxedCursor,
    dba: DbAccessor,
    lower_bound: i64,
    upper_bound: i64,
    /// Vertex → the edge it was discovered through (`None` for the root).
    /// Holds visited vertices as well as those scheduled to be visited.
    processed: HashMap<VertexAccessor, Option<EdgeAccessor>>,
    to_visit_current: VecDeque<(EdgeAccessor, VertexAccessor)>,
    to_visit_next: VecDeque<(EdgeAccessor, VertexAccessor)>,
}

impl ExpandBfsCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(spec: VariableSpec, input: BoxedCursor, dba: DbAccessor) -> Self {
        Self {
            spec,
            input,
            dba,
            lower_bound: 1,
            upper_bound: i64::MAX,
            processed: HashMap::new(),
            to_visit_current: VecDeque::new(),
            to_visit_next: VecDeque::new(),
        }
    }

    /// Schedules `(edge, vertex)` for the next depth if the vertex is
    /// unseen and the filter accepts the expansion.
    ///
    /// The BFS filter treats Null as a silent reject; any other non-Bool
    /// result is a runtime error.
    fn expand_pair(
        &mut self,
        frame: &mut Frame,
        ctx: &ExecutionContext,
        edge: EdgeAccessor,
        vertex: VertexAccessor,
    ) -> QueryResult<()> {
        if self.processed.contains_key(&vertex) {
            return Ok(());
        }
        frame.set(&self.spec.filter_lambda.inner_edge, TypedValue::Edge(edge.clone()));
        frame.set(&self.spec.filter_lambda.inner_node, TypedValue::Vertex(vertex.clone()));
        if let Some(expression) = &self.spec.filter_lambda.expression {
            match evaluate(expression, frame, &ctx.parameters, &self.dba, self.spec.view)? {
                TypedValue::Null => return Ok(()),
                TypedValue::Bool(false) => return Ok(()),
                TypedValue::Bool(true) => {}
                other => {
                    return Err(QueryError::Runtime(format!(
                        "expansion condition must be boolean or null, got {}",
                        other.type_name()
                    )))
                }
            }
        }
        self.to_visit_next.push_back((edge.clone(), vertex.clone()));
        self.processed.insert(vertex, Some(edge));
        Ok(())
    }

    /// Schedules every expansion around a vertex.
    fn expand_from_vertex(
        &mut self,
        frame: &mut Frame,
        ctx: &ExecutionContext,
        vertex: &VertexAccessor,
    ) -> QueryResult<()> {
        let view = self.spec.storage_view();
        for entry in self.spec.expand_from_vertex(vertex)? {
            self.dba.ensure_remote_vertex(entry.peer)?;
            let edge = self.dba.edge_accessor(entry.edge, view);
            let peer = self.dba.vertex_accessor(entry.peer, view);
            self.expand_pair(frame, ctx, edge, peer)?;
        }
        Ok(())
    }

    /// Walks the predecessor edges from `vertex` back to the root.
    ///
    /// Returns the discovered edges, innermost (root-adjacent) last.
    fn reconstruct(
        &self,
        first_edge: &EdgeAccessor,
        vertex: &VertexAccessor,
    ) -> QueryResult<Vec<EdgeAccessor>> {
        let mut edge_list = vec![first_edge.clone()];
        let mut last_vertex = vertex.clone();
        loop {
            // The list starts non-empty and only grows.
            let Some(last_edge) = edge_list.last().cloned() else { break };
            let record = last_edge.record()?;
            let other = if record.from == last_vertex.address() { record.to } else { record.from };
            last_vertex = self.dba.vertex_accessor(other, self.spec.storage_view());
            // The origin vertex is always in processed.
            match self.processed.get(&last_vertex) {
                Some(Some(previous)) => edge_list.push(previous.clone()),
                Some(None) | None => break,
            }
        }
        Ok(edge_list)
    }
}

impl Cursor for ExpandBfsCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            check_abort(&self.dba)?;

            // Depth exhausted: move on to the next one.
            if self.to_visit_current.is_empty() {
                std::mem::swap(&mut self.to_visit_current, &mut self.to_visit_next);
            }

            // Both empty: prime from the next input row.
            if self.to_visit_current.is_empty() {
                if !self.input.pull(frame, ctx)? {
                    return Ok(false);
                }
                self.processed.clear();

                let value = frame.get(&self.spec.input_symbol).clone();
                if value.is_null() {
                    continue;
                }
                let vertex = expect_vertex(&value, &self.spec.input_symbol)?.clone();
                let vertex = vertex.with_view(self.spec.storage_view());

                self.lower_bound = self.spec.eval_bound(
                    &self.spec.lower_bound,
                    1,
                    frame,
                    ctx,
                    &self.dba,
                    "min depth in breadth-first expansion",
                )?;
                self.upper_bound = self.spec.eval_bound(
                    &self.spec.upper_bound,
                    i64::MAX,
                    frame,
                    ctx,
                    &self.dba,
                    "max depth in breadth-first expansion",
                )?;
                if self.upper_bound < 1 {
                    return Err(QueryError::Runtime(
                        "max depth in breadth-first expansion must be greater than zero".into(),
                    ));
                }

                self.processed.insert(vertex.clone(), None);
                self.expand_from_vertex(frame, ctx, &vertex)?;
                continue;
            }

            let Some((edge, vertex)) = self.to_visit_current.pop_front() else {
                continue;
            };

            let edge_list = self.reconstruct(&edge, &vertex)?;

            // Expand further only under the depth bound.
            if (edge_list.len() as i64) < self.upper_bound {
                self.expand_from_vertex(frame, ctx, &vertex)?;
            }
            if (edge_list.len() as i64) < self.lower_bound {
                continue;
            }

            if self.spec.existing_node {
                let node = frame.get(&self.spec.node_symbol).clone();
                // The existing node may be Null under optional matching.
                if node.is_null() || node.as_vertex() != Some(&vertex) {
                    continue;
                }
            } else {
                frame.set(&self.spec.node_symbol, TypedValue::Vertex(vertex.clone()));
            }

            // Root-adjacent edge first.
            let mut edges: Vec<TypedValue> =
                edge_list.into_iter().rev().map(TypedValue::Edge).collect();
            if self.spec.is_reverse {
                edges.reverse();
            }
            frame.set(&self.spec.edge_symbol, TypedValue::List(edges));
            return Ok(true);
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()?;
        self.processed.clear();
        self.to_visit_current.clear();
        self.to_visit_next.clear();
        Ok(())
    }
}
