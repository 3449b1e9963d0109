//! Weighted-shortest-path expansion (Dijkstra).
//!
//! A binary heap keyed on total weight drives the expansion. Each popped
//! vertex is finalized with its cheapest weight and predecessor edge; the
//! path is reconstructed by walking predecessors, like the breadth-first
//! cursor does. When the destination is an `existing_node`, the first
//! match clears the queue so no further expansion happens.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use quiver_storage::{DbAccessor, EdgeAccessor, VertexAccessor};

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{check_abort, expect_vertex, BoxedCursor, Cursor};
use crate::expr::evaluate;
use crate::frame::Frame;
use crate::plan::WeightLambda;
use crate::symbols::Symbol;
use crate::value::TypedValue;

use super::expand_variable::VariableSpec;

/// A queue entry; the heap is a min-heap on `weight`.
struct QueueItem {
    weight: f64,
    vertex: VertexAccessor,
    edge: Option<EdgeAccessor>,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.weight.to_bits() == other.weight.to_bits()
    }
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Inverted: BinaryHeap is a max-heap, we want the lightest on top.
        other.weight.total_cmp(&self.weight)
    }
}

/// The weighted-shortest-path cursor.
pub struct ExpandWeightedShortestPathCursor {
    spec: VariableSpec,
    weight_lambda: WeightLambda,
    total_weight: Symbol,
    input: BoxedCursor,
    dba: DbAccessor,
    upper_bound: i64,
    /// Finalized cheapest weights.
    weights: HashMap<VertexAccessor, f64>,
    /// Vertex → the edge it was finalized through (`None` for the root).
    previous: HashMap<VertexAccessor, Option<EdgeAccessor>>,
    queue: BinaryHeap<QueueItem>,
}

impl ExpandWeightedShortestPathCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        spec: VariableSpec,
        weight_lambda: WeightLambda,
        total_weight: Symbol,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        Self {
            spec,
            weight_lambda,
            total_weight,
            input,
            dba,
            upper_bound: i64::MAX,
            weights: HashMap::new(),
            previous: HashMap::new(),
            queue: BinaryHeap::new(),
        }
    }

    /// Considers one `(from, edge, vertex)` expansion: filter, weigh,
    /// relax.
    fn expand_pair(
        &mut self,
        frame: &mut Frame,
        ctx: &ExecutionContext,
        from_weight: f64,
        edge: EdgeAccessor,
        vertex: VertexAccessor,
    ) -> QueryResult<()> {
        frame.set(&self.spec.filter_lambda.inner_edge, TypedValue::Edge(edge.clone()));
        frame.set(&self.spec.filter_lambda.inner_node, TypedValue::Vertex(vertex.clone()));
        if let Some(expression) = &self.spec.filter_lambda.expression {
            match evaluate(expression, frame, &ctx.parameters, &self.dba, self.spec.view)? {
                TypedValue::Null | TypedValue::Bool(false) => return Ok(()),
                TypedValue::Bool(true) => {}
                other => {
                    return Err(QueryError::Runtime(format!(
                        "expansion condition must be boolean or null, got {}",
                        other.type_name()
                    )))
                }
            }
        }

        frame.set(&self.weight_lambda.inner_edge, TypedValue::Edge(edge.clone()));
        frame.set(&self.weight_lambda.inner_node, TypedValue::Vertex(vertex.clone()));
        let weight = match evaluate(
            &self.weight_lambda.expression,
            frame,
            &ctx.parameters,
            &self.dba,
            self.spec.view,
        )? {
            TypedValue::Int(i) => i as f64,
            TypedValue::Double(d) => d,
            other => {
                return Err(QueryError::Runtime(format!(
                    "calculated weight must be numeric, got {}",
                    other.type_name()
                )))
            }
        };
        if weight < 0.0 {
            return Err(QueryError::Runtime("calculated weight can't be negative".into()));
        }

        let total = from_weight + weight;
        if let Some(&best) = self.weights.get(&vertex) {
            if best <= total {
                return Ok(());
            }
        }
        self.queue.push(QueueItem { weight: total, vertex, edge: Some(edge) });
        Ok(())
    }

    /// Relaxes every expansion around a finalized vertex.
    fn expand_from_vertex(
        &mut self,
        frame: &mut Frame,
        ctx: &ExecutionContext,
        vertex: &VertexAccessor,
    ) -> QueryResult<()> {
        let from_weight = self.weights.get(vertex).copied().unwrap_or(0.0);
        let view = self.spec.storage_view();
        for entry in self.spec.expand_from_vertex(vertex)? {
            self.dba.ensure_remote_vertex(entry.peer)?;
            let edge = self.dba.edge_accessor(entry.edge, view);
            let peer = self.dba.vertex_accessor(entry.peer, view);
            self.expand_pair(frame, ctx, from_weight, edge, peer)?;
        }
        Ok(())
    }

    /// Walks the predecessor edges from `vertex` back to the root.
    fn reconstruct(&self, vertex: &VertexAccessor) -> QueryResult<Vec<EdgeAccessor>> {
        let mut edge_list = Vec::new();
        let mut last_vertex = vertex.clone();
        loop {
            let previous = match self.previous.get(&last_vertex) {
                Some(Some(edge)) => edge.clone(),
                Some(None) | None => break,
            };
            let record = previous.record()?;
            let other = if record.from == last_vertex.address() { record.to } else { record.from };
            last_vertex = self.dba.vertex_accessor(other, self.spec.storage_view());
            edge_list.push(previous);
        }
        Ok(edge_list)
    }
}

impl Cursor for ExpandWeightedShortestPathCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            check_abort(&self.dba)?;

            if self.queue.is_empty() {
                if !self.input.pull(frame, ctx)? {
                    return Ok(false);
                }
                let value = frame.get(&self.spec.input_symbol).clone();
                if value.is_null() {
                    continue;
                }
                let vertex = expect_vertex(&value, &self.spec.input_symbol)?.clone();
                if self.spec.existing_node && frame.get(&self.spec.node_symbol).is_null() {
                    // Skip expansion for Null existing nodes.
                    continue;
                }
                let vertex = vertex.with_view(self.spec.storage_view());

                self.upper_bound = self.spec.eval_bound(
                    &self.spec.upper_bound,
                    i64::MAX,
                    frame,
                    ctx,
                    &self.dba,
                    "max depth in weighted shortest path expansion",
                )?;
                if self.upper_bound < 1 {
                    return Err(QueryError::Runtime(
                        "max depth in weighted shortest path expansion must be greater than zero"
                            .into(),
                    ));
                }

                self.previous.clear();
                self.weights.clear();
                self.queue.push(QueueItem { weight: 0.0, vertex, edge: None });
            }

            while let Some(QueueItem { weight, vertex, edge }) = self.queue.pop() {
                check_abort(&self.dba)?;

                // Already finalized through a cheaper path.
                if self.weights.contains_key(&vertex) {
                    continue;
                }
                self.previous.insert(vertex.clone(), edge);
                self.weights.insert(vertex.clone(), weight);

                let edge_list = self.reconstruct(&vertex)?;

                if (edge_list.len() as i64) < self.upper_bound {
                    self.expand_from_vertex(frame, ctx, &vertex)?;
                }
                if edge_list.is_empty() {
                    // The root itself.
                    continue;
                }

                if self.spec.existing_node {
                    let node = frame.get(&self.spec.node_symbol).clone();
                    if node.as_vertex() != Some(&vertex) {
                        continue;
                    }
                    // The cheapest path to the destination is found; stop
                    // expanding other paths.
                    self.queue.clear();
                } else {
                    frame.set(&self.spec.node_symbol, TypedValue::Vertex(vertex.clone()));
                }

                let mut edges: Vec<TypedValue> =
                    edge_list.into_iter().map(TypedValue::Edge).collect();
                if !self.spec.is_reverse {
                    edges.reverse();
                }
                frame.set(&self.spec.edge_symbol, TypedValue::List(edges));
                frame.set(&self.total_weight, TypedValue::Double(weight));
                return Ok(true);
            }
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()?;
        self.previous.clear();
        self.weights.clear();
        self.queue.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::cursor::make_cursor;
    use crate::expr::{Expression, GraphView};
    use crate::plan::{ExpandDirection, ExpandVariableKind, ExpansionLambda, PlanNode};
    use crate::symbols::{SymbolTable, SymbolType};
    use quiver_core::{NameRegistry, PropertyId, PropertyValue, WorkerId};
    use quiver_storage::{GraphStore, LocalOnlyRemote, TransactionEngine};
    use std::sync::Arc;

    fn dba() -> DbAccessor {
        let engine = Arc::new(TransactionEngine::new());
        let store = Arc::new(GraphStore::new(WorkerId::MASTER, Arc::clone(&engine)));
        let tx = engine.begin(None).unwrap();
        DbAccessor::new(store, engine, tx, Arc::new(LocalOnlyRemote), Arc::new(NameRegistry::new()))
    }

    struct WspSetup {
        plan: PlanNode,
        n: Symbol,
        m: Symbol,
        w: Symbol,
    }

    fn wsp_plan(table: &mut SymbolTable, weight_key: PropertyId) -> WspSetup {
        let n = table.create("n", SymbolType::Vertex, true);
        let r = table.create("r", SymbolType::EdgeList, true);
        let m = table.create("m", SymbolType::Vertex, true);
        let w = table.create("w", SymbolType::Number, true);
        let inner_edge = table.create_anonymous("inner_edge");
        let inner_node = table.create_anonymous("inner_node");
        let weight_edge = table.create_anonymous("weight_edge");
        let weight_node = table.create_anonymous("weight_node");
        let plan = PlanNode::ExpandVariable {
            input: Box::new(PlanNode::ScanAll {
                input: Box::new(PlanNode::Once),
                output_symbol: n.clone(),
                view: GraphView::New,
            }),
            input_symbol: n.clone(),
            node_symbol: m.clone(),
            edge_symbol: r,
            kind: ExpandVariableKind::WeightedShortestPath {
                weight_lambda: WeightLambda {
                    inner_edge: weight_edge.clone(),
                    inner_node: weight_node,
                    expression: Expression::ident(weight_edge).property(weight_key, "w"),
                },
                total_weight: w.clone(),
            },
            direction: ExpandDirection::Out,
            edge_types: Vec::new(),
            lower_bound: None,
            upper_bound: None,
            existing_node: false,
            filter_lambda: ExpansionLambda { inner_edge, inner_node, expression: None },
            is_reverse: false,
            view: GraphView::New,
        };
        WspSetup { plan, n, m, w }
    }

    #[test]
    fn cheapest_path_wins_over_fewer_hops() {
        let dba = dba();
        let t = dba.registry().edge_type("T").unwrap();
        let weight_key = dba.registry().property("w").unwrap();
        // a -> b (1), b -> c (1), a -> c (10): two hops beat the shortcut.
        let a = dba.insert_vertex().unwrap();
        let b = dba.insert_vertex().unwrap();
        let c = dba.insert_vertex().unwrap();
        for (from, to, w) in [(&a, &b, 1i64), (&b, &c, 1), (&a, &c, 10)] {
            let edge = dba.insert_edge(from, to, t).unwrap();
            edge.set_property(weight_key, PropertyValue::Int(w)).unwrap();
        }

        let mut table = SymbolTable::new();
        let setup = wsp_plan(&mut table, weight_key);
        let mut cursor = make_cursor(&setup.plan, &dba).unwrap();

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut weight_to_c = None;
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            if frame.get(&setup.n).as_vertex() == Some(&a)
                && frame.get(&setup.m).as_vertex() == Some(&c)
            {
                weight_to_c = Some(frame.get(&setup.w).clone());
            }
        }
        assert_eq!(weight_to_c, Some(TypedValue::Double(2.0)));
    }

    #[test]
    fn negative_weight_is_a_runtime_error() {
        let dba = dba();
        let t = dba.registry().edge_type("T").unwrap();
        let weight_key = dba.registry().property("w").unwrap();
        let a = dba.insert_vertex().unwrap();
        let b = dba.insert_vertex().unwrap();
        let edge = dba.insert_edge(&a, &b, t).unwrap();
        edge.set_property(weight_key, PropertyValue::Int(-1)).unwrap();

        let mut table = SymbolTable::new();
        let setup = wsp_plan(&mut table, weight_key);
        let mut cursor = make_cursor(&setup.plan, &dba).unwrap();

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut result = Ok(true);
        while let Ok(true) = result {
            result = cursor.pull(&mut frame, &mut ctx);
        }
        assert!(matches!(result, Err(QueryError::Runtime(_))));
    }

    #[test]
    fn non_numeric_weight_is_a_runtime_error() {
        let dba = dba();
        let t = dba.registry().edge_type("T").unwrap();
        let weight_key = dba.registry().property("w").unwrap();
        let a = dba.insert_vertex().unwrap();
        let b = dba.insert_vertex().unwrap();
        let edge = dba.insert_edge(&a, &b, t).unwrap();
        edge.set_property(weight_key, PropertyValue::String("heavy".into())).unwrap();

        let mut table = SymbolTable::new();
        let setup = wsp_plan(&mut table, weight_key);
        let mut cursor = make_cursor(&setup.plan, &dba).unwrap();

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut result = Ok(true);
        while let Ok(true) = result {
            result = cursor.pull(&mut frame, &mut ctx);
        }
        assert!(matches!(result, Err(QueryError::Runtime(_))));
    }
}
