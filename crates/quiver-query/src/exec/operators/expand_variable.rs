//! Depth-first variable-length expansion.
//!
//! The cursor maintains a stack of per-level edge iterators. The edge list
//! on the frame mirrors the stack depth: whenever a level is exhausted and
//! popped, the list is truncated back before the next edge is appended.
//! Edge-uniqueness holds per path: an edge already on the frame is never
//! appended again.

use quiver_core::EdgeTypeId;
use quiver_storage::{DbAccessor, EdgeEntry, VertexAccessor, View};

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{check_abort, expect_vertex, BoxedCursor, Cursor};
use crate::expr::{evaluate_filter, evaluate_int, Expression, GraphView};
use crate::frame::Frame;
use crate::plan::{ExpandDirection, ExpansionLambda};
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// The plan data shared by the DFS, BFS and weighted-shortest-path
/// cursors.
#[derive(Debug, Clone)]
pub struct VariableSpec {
    /// The origin vertex's symbol.
    pub input_symbol: Symbol,
    /// The reached vertex's symbol.
    pub node_symbol: Symbol,
    /// The edge-list symbol.
    pub edge_symbol: Symbol,
    /// Direction subset.
    pub direction: ExpandDirection,
    /// Edge-type filter; empty means any.
    pub edge_types: Vec<EdgeTypeId>,
    /// Lower path-length bound; defaults to 1.
    pub lower_bound: Option<Expression>,
    /// Upper path-length bound; defaults to unbounded.
    pub upper_bound: Option<Expression>,
    /// Whether `node_symbol` is already bound and must match.
    pub existing_node: bool,
    /// The inline expansion filter.
    pub filter_lambda: ExpansionLambda,
    /// Emit the edge list innermost-first.
    pub is_reverse: bool,
    /// View expansions are switched to.
    pub view: GraphView,
}

impl VariableSpec {
    pub(crate) fn storage_view(&self) -> View {
        self.view.effective(View::Old)
    }

    pub(crate) fn type_filter(&self) -> Option<&[EdgeTypeId]> {
        if self.edge_types.is_empty() {
            None
        } else {
            Some(&self.edge_types)
        }
    }

    /// Gathers the expandable entries around a vertex, deduplicating
    /// cycle edges in BOTH mode.
    pub(crate) fn expand_from_vertex(
        &self,
        vertex: &VertexAccessor,
    ) -> QueryResult<Vec<EdgeEntry>> {
        let types = self.type_filter();
        let mut entries = Vec::new();
        if self.direction != ExpandDirection::Out {
            entries.extend(vertex.entries(true, types)?);
        }
        if self.direction != ExpandDirection::In {
            for entry in vertex.entries(false, types)? {
                if self.direction == ExpandDirection::Both && entry.peer == vertex.address() {
                    continue;
                }
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Binds or checks the destination symbol; `false` rejects the
    /// expansion.
    pub(crate) fn handle_existing_node(
        &self,
        new_node: &VertexAccessor,
        frame: &mut Frame,
    ) -> QueryResult<bool> {
        if self.existing_node {
            let existing = frame.get(&self.node_symbol).clone();
            // May be Null under optional matching.
            if existing.is_null() {
                return Ok(false);
            }
            let existing = expect_vertex(&existing, &self.node_symbol)?;
            Ok(existing == new_node)
        } else {
            frame.set(&self.node_symbol, TypedValue::Vertex(new_node.clone()));
            Ok(true)
        }
    }

    /// Evaluates the filter lambda for a candidate `(edge, vertex)` pair.
    pub(crate) fn lambda_accepts(
        &self,
        frame: &mut Frame,
        ctx: &ExecutionContext,
        dba: &DbAccessor,
        edge: TypedValue,
        vertex: TypedValue,
    ) -> QueryResult<bool> {
        frame.set(&self.filter_lambda.inner_edge, edge);
        frame.set(&self.filter_lambda.inner_node, vertex);
        match &self.filter_lambda.expression {
            None => Ok(true),
            Some(expression) => {
                evaluate_filter(expression, frame, &ctx.parameters, dba, self.view)
            }
        }
    }

    /// Evaluates a path-length bound.
    pub(crate) fn eval_bound(
        &self,
        bound: &Option<Expression>,
        default: i64,
        frame: &Frame,
        ctx: &ExecutionContext,
        dba: &DbAccessor,
        what: &str,
    ) -> QueryResult<i64> {
        let Some(expression) = bound else {
            return Ok(default);
        };
        let value = evaluate_int(expression, frame, &ctx.parameters, dba, self.view, what)?;
        if value < 0 {
            return Err(QueryError::Runtime(format!("{what} must be positive or zero")));
        }
        Ok(value)
    }
}

/// The depth-first cursor.
pub struct ExpandVariableCursor {
    spec: VariableSpec,
    input: BoxedCursor,
    dba: DbAccessor,
    lower_bound: i64,
    upper_bound: i64,
    /// A stack of edge iterators, one per expansion depth.
    levels: Vec<std::vec::IntoIter<EdgeEntry>>,
}

impl ExpandVariableCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(spec: VariableSpec, input: BoxedCursor, dba: DbAccessor) -> Self {
        Self { spec, input, dba, lower_bound: 1, upper_bound: i64::MAX, levels: Vec::new() }
    }

    /// Pulls the next usable input row; primes the first level.
    fn pull_input(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            if !self.input.pull(frame, ctx)? {
                return Ok(false);
            }
            let value = frame.get(&self.spec.input_symbol).clone();
            if value.is_null() {
                continue;
            }
            let vertex = expect_vertex(&value, &self.spec.input_symbol)?.clone();
            let vertex = vertex.with_view(self.spec.storage_view());
            frame.set(&self.spec.input_symbol, TypedValue::Vertex(vertex.clone()));

            self.lower_bound = self.spec.eval_bound(
                &self.spec.lower_bound,
                1,
                frame,
                ctx,
                &self.dba,
                "variable expansion lower bound",
            )?;
            self.upper_bound = self.spec.eval_bound(
                &self.spec.upper_bound,
                i64::MAX,
                frame,
                ctx,
                &self.dba,
                "variable expansion upper bound",
            )?;

            self.levels.clear();
            if self.upper_bound > 0 {
                self.levels.push(self.spec.expand_from_vertex(&vertex)?.into_iter());
            }
            frame.set(&self.spec.edge_symbol, TypedValue::List(Vec::new()));
            return Ok(true);
        }
    }

    /// Attempts one depth-first step; `true` when a path within the
    /// bounds was placed on the frame.
    fn expand(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            check_abort(&self.dba)?;

            if self.levels.is_empty() {
                return Ok(false);
            }
            let Some(entry) = self.levels.last_mut().and_then(Iterator::next) else {
                self.levels.pop();
                continue;
            };

            // Bring the frame's edge list back in sync with the stack
            // depth (levels may have been popped since the last append).
            let mut edges_on_frame = match std::mem::replace(
                frame.get_mut(&self.spec.edge_symbol),
                TypedValue::Null,
            ) {
                TypedValue::List(list) => list,
                other => {
                    return Err(QueryError::Runtime(format!(
                        "expected an edge list on the frame, got {}",
                        other.type_name()
                    )))
                }
            };
            let depth = self.levels.len();
            if self.spec.is_reverse {
                let excess = edges_on_frame.len().saturating_sub(depth - 1);
                edges_on_frame.drain(..excess);
            } else {
                edges_on_frame.truncate(depth - 1);
            }

            // Edge-uniqueness per path.
            let duplicate = edges_on_frame
                .iter()
                .any(|value| value.as_edge().map(quiver_storage::EdgeAccessor::address) == Some(entry.edge));
            if duplicate {
                frame.set(&self.spec.edge_symbol, TypedValue::List(edges_on_frame));
                continue;
            }

            let view = self.spec.storage_view();
            let edge = self.dba.edge_accessor(entry.edge, view);
            if self.spec.is_reverse {
                edges_on_frame.insert(0, TypedValue::Edge(edge.clone()));
            } else {
                edges_on_frame.push(TypedValue::Edge(edge.clone()));
            }
            let path_length = edges_on_frame.len() as i64;
            frame.set(&self.spec.edge_symbol, TypedValue::List(edges_on_frame));

            self.dba.ensure_remote_vertex(entry.peer)?;
            let vertex = self.dba.vertex_accessor(entry.peer, view);

            if !self.spec.handle_existing_node(&vertex, frame)? {
                continue;
            }
            if !self.spec.lambda_accepts(
                frame,
                ctx,
                &self.dba,
                TypedValue::Edge(edge),
                TypedValue::Vertex(vertex.clone()),
            )? {
                continue;
            }

            // Depth-first: push the next level while under the upper
            // bound.
            if self.upper_bound > self.levels.len() as i64 {
                self.levels.push(self.spec.expand_from_vertex(&vertex)?.into_iter());
            }

            if path_length >= self.lower_bound {
                return Ok(true);
            }
        }
    }
}

impl Cursor for ExpandVariableCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            check_abort(&self.dba)?;
            if self.expand(frame, ctx)? {
                return Ok(true);
            }
            if !self.pull_input(frame, ctx)? {
                return Ok(false);
            }
            // A zero lower bound also yields the empty path.
            if self.lower_bound == 0 {
                let value = frame.get(&self.spec.input_symbol).clone();
                let vertex = expect_vertex(&value, &self.spec.input_symbol)?.clone();
                if self.spec.handle_existing_node(&vertex, frame)? {
                    return Ok(true);
                }
            }
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()?;
        self.levels.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::cursor::make_cursor;
    use crate::plan::{ExpandVariableKind, PlanNode};
    use crate::symbols::{SymbolTable, SymbolType};
    use quiver_core::{NameRegistry, WorkerId};
    use quiver_storage::{GraphStore, LocalOnlyRemote, TransactionEngine};
    use std::sync::Arc;

    fn dba() -> DbAccessor {
        let engine = Arc::new(TransactionEngine::new());
        let store = Arc::new(GraphStore::new(WorkerId::MASTER, Arc::clone(&engine)));
        let tx = engine.begin(None).unwrap();
        DbAccessor::new(store, engine, tx, Arc::new(LocalOnlyRemote), Arc::new(NameRegistry::new()))
    }

    fn var_expand_plan(
        table: &mut SymbolTable,
        lower: i64,
        upper: i64,
        direction: ExpandDirection,
    ) -> (PlanNode, Symbol, Symbol) {
        let n = table.create("n", SymbolType::Vertex, true);
        let r = table.create("r", SymbolType::EdgeList, true);
        let m = table.create("m", SymbolType::Vertex, true);
        let inner_edge = table.create_anonymous("inner_edge");
        let inner_node = table.create_anonymous("inner_node");
        let plan = PlanNode::ExpandVariable {
            input: Box::new(PlanNode::ScanAll {
                input: Box::new(PlanNode::Once),
                output_symbol: n.clone(),
                view: GraphView::New,
            }),
            input_symbol: n,
            node_symbol: m.clone(),
            edge_symbol: r.clone(),
            kind: ExpandVariableKind::Dfs,
            direction,
            edge_types: Vec::new(),
            lower_bound: Some(Expression::int(lower)),
            upper_bound: Some(Expression::int(upper)),
            existing_node: false,
            filter_lambda: ExpansionLambda {
                inner_edge,
                inner_node,
                expression: None,
            },
            is_reverse: false,
            view: GraphView::New,
        };
        (plan, r, m)
    }

    #[test]
    fn fixed_length_paths_have_exact_length_and_distinct_edges() {
        let dba = dba();
        let t = dba.registry().edge_type("T").unwrap();
        // Chain a -> b -> c.
        let a = dba.insert_vertex().unwrap();
        let b = dba.insert_vertex().unwrap();
        let c = dba.insert_vertex().unwrap();
        dba.insert_edge(&a, &b, t).unwrap();
        dba.insert_edge(&b, &c, t).unwrap();

        let mut table = SymbolTable::new();
        let (plan, r, _) = var_expand_plan(&mut table, 2, 2, ExpandDirection::Out);
        let mut cursor = make_cursor(&plan, &dba).unwrap();

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut paths = 0;
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            let TypedValue::List(edges) = frame.get(&r) else { panic!("edge list expected") };
            assert_eq!(edges.len(), 2);
            let first = edges[0].as_edge().unwrap().address();
            let second = edges[1].as_edge().unwrap().address();
            assert_ne!(first, second);
            paths += 1;
        }
        // Only a ->-> c has length exactly 2.
        assert_eq!(paths, 1);
    }

    #[test]
    fn symmetric_expansion_on_a_path_of_three() {
        // MATCH (n)-[r*1..2]-(m) on a path A-B-C: 1-hop paths from each
        // endpoint of each edge (4) plus 2-hop paths from A and C (2).
        let dba = dba();
        let t = dba.registry().edge_type("T").unwrap();
        let a = dba.insert_vertex().unwrap();
        let b = dba.insert_vertex().unwrap();
        let c = dba.insert_vertex().unwrap();
        dba.insert_edge(&a, &b, t).unwrap();
        dba.insert_edge(&b, &c, t).unwrap();

        let mut table = SymbolTable::new();
        let (plan, r, _) = var_expand_plan(&mut table, 1, 2, ExpandDirection::Both);
        let mut cursor = make_cursor(&plan, &dba).unwrap();

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut lengths = Vec::new();
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            let TypedValue::List(edges) = frame.get(&r) else { panic!("edge list expected") };
            lengths.push(edges.len());
        }
        lengths.sort_unstable();
        assert_eq!(lengths, vec![1, 1, 1, 1, 2, 2]);
    }

    #[test]
    fn zero_lower_bound_yields_empty_path() {
        let dba = dba();
        dba.insert_vertex().unwrap();

        let mut table = SymbolTable::new();
        let (plan, r, _) = var_expand_plan(&mut table, 0, 1, ExpandDirection::Out);
        let mut cursor = make_cursor(&plan, &dba).unwrap();

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        assert!(cursor.pull(&mut frame, &mut ctx).unwrap());
        let TypedValue::List(edges) = frame.get(&r) else { panic!("edge list expected") };
        assert!(edges.is_empty());
        assert!(!cursor.pull(&mut frame, &mut ctx).unwrap());
    }

    #[test]
    fn negative_bound_is_a_runtime_error() {
        let dba = dba();
        dba.insert_vertex().unwrap();

        let mut table = SymbolTable::new();
        let (plan, ..) = var_expand_plan(&mut table, -1, 2, ExpandDirection::Out);
        let mut cursor = make_cursor(&plan, &dba).unwrap();

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        assert!(matches!(
            cursor.pull(&mut frame, &mut ctx),
            Err(QueryError::Runtime(_))
        ));
    }
}
