//! The create operators.

use quiver_core::PropertyValue;
use quiver_storage::{DbAccessor, StorageError, VertexAccessor, View};
use rand::Rng;

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{expect_vertex, BoxedCursor, Cursor};
use crate::expr::{evaluate, GraphView};
use crate::frame::Frame;
use crate::plan::{EdgeCreationInfo, ExpandDirection, NodeCreationInfo};
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// Maps storage failures from property writes onto the operator-level
/// runtime error, the way every mutating cursor reports them.
fn props_set_checked(result: Result<(), StorageError>) -> QueryResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(StorageError::RecordDeleted(_)) => Err(QueryError::Runtime(
            "trying to set properties on a deleted graph element".into(),
        )),
        Err(other) => Err(other.into()),
    }
}

/// Evaluates a creation property list under the NEW view into storable
/// values.
fn evaluate_properties(
    properties: &[(quiver_core::PropertyId, crate::expr::Expression)],
    frame: &Frame,
    ctx: &ExecutionContext,
    dba: &DbAccessor,
) -> QueryResult<Vec<(quiver_core::PropertyId, PropertyValue)>> {
    properties
        .iter()
        .map(|(key, expression)| {
            let value = evaluate(expression, frame, &ctx.parameters, dba, GraphView::New)?;
            Ok((*key, value.to_property()?))
        })
        .collect()
}

/// Creates a vertex per input row, locally or on a uniformly chosen
/// worker.
pub struct CreateNodeCursor {
    node: NodeCreationInfo,
    on_random_worker: bool,
    input: BoxedCursor,
    dba: DbAccessor,
}

impl CreateNodeCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        node: NodeCreationInfo,
        on_random_worker: bool,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        Self { node, on_random_worker, input, dba }
    }

    fn create_locally(&self, frame: &mut Frame, ctx: &ExecutionContext) -> QueryResult<()> {
        let vertex = self.dba.insert_vertex()?;
        for &label in &self.node.labels {
            vertex.add_label(label)?;
        }
        // Property expressions observe this query's own writes.
        for (key, value) in evaluate_properties(&self.node.properties, frame, ctx, &self.dba)? {
            props_set_checked(vertex.set_property(key, value))?;
        }
        frame.set(&self.node.symbol, TypedValue::Vertex(vertex));
        Ok(())
    }

    fn create_on_worker(
        &self,
        worker: quiver_core::WorkerId,
        frame: &mut Frame,
        ctx: &ExecutionContext,
    ) -> QueryResult<()> {
        let properties = evaluate_properties(&self.node.properties, frame, ctx, &self.dba)?
            .into_iter()
            .collect();
        let vertex =
            self.dba.insert_vertex_into_remote(worker, self.node.labels.clone(), properties)?;
        frame.set(&self.node.symbol, TypedValue::Vertex(vertex));
        Ok(())
    }
}

impl Cursor for CreateNodeCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        if self.on_random_worker {
            let workers = ctx.coordinator.worker_ids();
            let worker = workers[rand::thread_rng().gen_range(0..workers.len())];
            if worker == self.dba.worker() {
                self.create_locally(frame, ctx)?;
            } else {
                self.create_on_worker(worker, frame, ctx)?;
            }
        } else {
            self.create_locally(frame, ctx)?;
        }
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()
    }
}

/// Creates an edge (and possibly its destination) per input row.
pub struct CreateExpandCursor {
    node: NodeCreationInfo,
    edge: EdgeCreationInfo,
    input_symbol: Symbol,
    existing_node: bool,
    input: BoxedCursor,
    dba: DbAccessor,
}

impl CreateExpandCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        node: NodeCreationInfo,
        edge: EdgeCreationInfo,
        input_symbol: Symbol,
        existing_node: bool,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        Self { node, edge, input_symbol, existing_node, input, dba }
    }

    /// The destination vertex: reused when it already exists on the
    /// frame, created otherwise.
    fn other_vertex(
        &self,
        frame: &mut Frame,
        ctx: &ExecutionContext,
    ) -> QueryResult<VertexAccessor> {
        if self.existing_node {
            let value = frame.get(&self.node.symbol).clone();
            let vertex = expect_vertex(&value, &self.node.symbol)?.clone();
            Ok(vertex.with_view(View::New))
        } else {
            let vertex = self.dba.insert_vertex()?;
            for &label in &self.node.labels {
                vertex.add_label(label)?;
            }
            for (key, value) in evaluate_properties(&self.node.properties, frame, ctx, &self.dba)? {
                props_set_checked(vertex.set_property(key, value))?;
            }
            frame.set(&self.node.symbol, TypedValue::Vertex(vertex.clone()));
            Ok(vertex)
        }
    }
}

impl Cursor for CreateExpandCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }

        let value = frame.get(&self.input_symbol).clone();
        let v1 = expect_vertex(&value, &self.input_symbol)?.clone().with_view(View::New);
        // E.g. CREATE (n {p: 42})-[:r {ep: n.p}]->() must see n's fresh
        // properties.
        let v2 = self.other_vertex(frame, ctx)?;

        let edge = match self.edge.direction {
            ExpandDirection::In => self.dba.insert_edge(&v2, &v1, self.edge.edge_type)?,
            // BOTH is not allowed in CREATE; the MERGE path picks an
            // arbitrary orientation, which is OUT here.
            ExpandDirection::Out | ExpandDirection::Both => {
                self.dba.insert_edge(&v1, &v2, self.edge.edge_type)?
            }
        };
        for (key, value) in evaluate_properties(&self.edge.properties, frame, ctx, &self.dba)? {
            props_set_checked(edge.set_property(key, value))?;
        }
        frame.set(&self.edge.symbol, TypedValue::Edge(edge));
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expression;
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

    #[test]
    fn create_node_sets_labels_and_properties() {
        let dba = dba();
        let label = dba.registry().label("L").unwrap();
        let key = dba.registry().property("p").unwrap();

        let mut table = SymbolTable::new();
        let n = table.create("n", SymbolType::Vertex, true);
        let mut cursor = CreateNodeCursor::new(
            NodeCreationInfo {
                symbol: n.clone(),
                labels: vec![label],
                properties: vec![(key, Expression::int(42))],
            },
            false,
            Box::new(super::super::once::OnceCursor::new()),
            dba.clone(),
        );

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        assert!(cursor.pull(&mut frame, &mut ctx).unwrap());
        let vertex = frame.get(&n).as_vertex().unwrap();
        assert!(vertex.has_label(label).unwrap());
        assert_eq!(vertex.property(key).unwrap(), PropertyValue::Int(42));
        assert!(!cursor.pull(&mut frame, &mut ctx).unwrap());
    }

    #[test]
    fn create_expand_reads_fresh_origin_properties() {
        let dba = dba();
        let key = dba.registry().property("p").unwrap();
        let ep = dba.registry().property("ep").unwrap();
        let t = dba.registry().edge_type("r").unwrap();

        let mut table = SymbolTable::new();
        let n = table.create("n", SymbolType::Vertex, true);
        let m = table.create("m", SymbolType::Vertex, true);
        let r = table.create("r", SymbolType::Edge, true);

        let create_node = CreateNodeCursor::new(
            NodeCreationInfo {
                symbol: n.clone(),
                labels: Vec::new(),
                properties: vec![(key, Expression::int(42))],
            },
            false,
            Box::new(super::super::once::OnceCursor::new()),
            dba.clone(),
        );
        // CREATE (n {p: 42})-[:r {ep: n.p}]->()
        let mut cursor = CreateExpandCursor::new(
            NodeCreationInfo { symbol: m, labels: Vec::new(), properties: Vec::new() },
            EdgeCreationInfo {
                symbol: r.clone(),
                edge_type: t,
                direction: ExpandDirection::Out,
                properties: vec![(ep, Expression::ident(n).property(key, "p"))],
            },
            table.find("n").unwrap().clone(),
            false,
            Box::new(create_node),
            dba,
        );

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        assert!(cursor.pull(&mut frame, &mut ctx).unwrap());
        let edge = frame.get(&r).as_edge().unwrap();
        assert_eq!(edge.property(ep).unwrap(), PropertyValue::Int(42));
    }
}
