//! Transactional behavior: isolation, idempotence, cancellation and the
//! empty-graph invariant.

use std::time::Duration;

use quiver::{Database, Parameters, PlanNode, SymbolTable, TypedValue, View};
use quiver_query::expr::{Expression, GraphView};
use quiver_query::plan::SetPropertiesOp;
use quiver_query::symbols::SymbolType;

use crate::plans;

#[test]
fn empty_graph_queries_return_zero_rows() {
    // Any scan-rooted query on an empty graph yields nothing; only
    // constant and UNWIND sources produce rows.
    let db = Database::in_memory();

    let mut table = SymbolTable::new();
    let (scan, _) = plans::scan_all(&mut table, GraphView::Old);
    let rows = db.execute(&scan, &table, Parameters::new()).unwrap();
    assert!(rows.is_empty());

    let mut table = SymbolTable::new();
    let (scan, n2) = plans::scan_all(&mut table, GraphView::Old);
    let expand = PlanNode::Expand {
        input: Box::new(scan),
        input_symbol: n2.clone(),
        node_symbol: table.create("m", SymbolType::Vertex, true),
        edge_symbol: table.create("r", SymbolType::Edge, true),
        direction: quiver_query::plan::ExpandDirection::Both,
        edge_types: Vec::new(),
        existing_node: false,
        view: GraphView::Old,
    };
    let rows = db.execute(&expand, &table, Parameters::new()).unwrap();
    assert!(rows.is_empty());

    // The exception: a constant source.
    let mut table = SymbolTable::new();
    let (unwind, _) = plans::unwind_return(&mut table, vec![Expression::int(1)]);
    let rows = db.execute(&unwind, &table, Parameters::new()).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn created_vertices_are_countable_after_commit() {
    let db = Database::in_memory();
    let n_created = 5;
    {
        let tx = db.begin(None).unwrap();
        let dba = db.accessor(&tx).unwrap();
        for _ in 0..n_created {
            dba.insert_vertex().unwrap();
        }
        db.commit(&tx).unwrap();
    }

    let mut table = SymbolTable::new();
    let (scan, n) = plans::scan_all(&mut table, GraphView::Old);
    let (count, _) = plans::count_over(&mut table, scan, n);
    let rows = db.execute(&count, &table, Parameters::new()).unwrap();
    assert_eq!(rows, vec![vec![TypedValue::Int(n_created)]]);
}

#[test]
fn set_self_is_a_no_op_on_the_property_map() {
    // SET n = n must leave the property map untouched.
    let db = Database::in_memory();
    let p = db.names().property("p").unwrap();
    let q = db.names().property("q").unwrap();
    {
        let tx = db.begin(None).unwrap();
        let dba = db.accessor(&tx).unwrap();
        let vertex = dba.insert_vertex().unwrap();
        vertex.set_property(p, quiver::PropertyValue::Int(1)).unwrap();
        vertex.set_property(q, quiver::PropertyValue::from("x")).unwrap();
        db.commit(&tx).unwrap();
    }

    let mut table = SymbolTable::new();
    let (scan, n) = plans::scan_all(&mut table, GraphView::New);
    let plan = PlanNode::SetProperties {
        input: Box::new(scan),
        input_symbol: n.clone(),
        value: Expression::ident(n),
        op: SetPropertiesOp::Replace,
    };
    db.execute(&plan, &table, Parameters::new()).unwrap();

    let tx = db.begin(None).unwrap();
    let dba = db.accessor(&tx).unwrap();
    let vertices = dba.vertices(View::New).unwrap();
    assert_eq!(vertices.len(), 1);
    let properties = vertices[0].properties().unwrap();
    assert_eq!(properties.len(), 2);
    assert_eq!(properties.get(&p), Some(&quiver::PropertyValue::Int(1)));
    db.commit(&tx).unwrap();
}

#[test]
fn deleted_entities_stop_matching() {
    let db = Database::in_memory();
    {
        let tx = db.begin(None).unwrap();
        let dba = db.accessor(&tx).unwrap();
        dba.insert_vertex().unwrap();
        db.commit(&tx).unwrap();
    }

    // DELETE every vertex.
    let mut table = SymbolTable::new();
    let (scan, n) = plans::scan_all(&mut table, GraphView::New);
    let delete = PlanNode::Delete {
        input: Box::new(scan),
        expressions: vec![Expression::ident(n)],
        detach: false,
    };
    db.execute(&delete, &table, Parameters::new()).unwrap();

    // MATCH returns zero rows afterwards.
    let mut table = SymbolTable::new();
    let (scan, n) = plans::scan_all(&mut table, GraphView::Old);
    let (count, _) = plans::count_over(&mut table, scan, n);
    let rows = db.execute(&count, &table, Parameters::new()).unwrap();
    assert_eq!(rows, vec![vec![TypedValue::Int(0)]]);
}

#[test]
fn uncommitted_writes_stay_invisible() {
    let db = Database::in_memory();
    let writer = db.begin(None).unwrap();
    let writer_dba = db.accessor(&writer).unwrap();
    writer_dba.insert_vertex().unwrap();

    let reader = db.begin(None).unwrap();
    let reader_dba = db.accessor(&reader).unwrap();
    assert!(reader_dba.vertices(View::New).unwrap().is_empty());

    db.commit(&writer).unwrap();
    // Still invisible: the reader's snapshot predates the commit.
    assert!(reader_dba.vertices(View::New).unwrap().is_empty());
    db.commit(&reader).unwrap();

    let late = db.begin(None).unwrap();
    let late_dba = db.accessor(&late).unwrap();
    assert_eq!(late_dba.vertices(View::New).unwrap().len(), 1);
    db.commit(&late).unwrap();
}

#[test]
fn expired_transactions_are_killed_mid_pull() {
    let db = Database::in_memory();
    {
        let tx = db.begin(None).unwrap();
        let dba = db.accessor(&tx).unwrap();
        for _ in 0..4 {
            dba.insert_vertex().unwrap();
        }
        db.commit(&tx).unwrap();
    }

    // A transaction with an already-expired deadline: the killer flags it
    // and the next pull unwinds with HintedAbort.
    let tx = db.begin(Some(Duration::from_millis(0))).unwrap();
    std::thread::sleep(Duration::from_millis(250));

    let mut table = SymbolTable::new();
    let (scan, _) = plans::scan_all(&mut table, GraphView::Old);
    let err = db.pull_all(&tx, &scan, &table, Parameters::new()).unwrap_err();
    assert!(
        matches!(err, quiver::Error::Query(quiver_query::QueryError::HintedAbort)),
        "expected HintedAbort, got {err}"
    );
}

#[test]
fn write_conflicts_are_retriable() {
    let db = Database::in_memory();
    let p = db.names().property("p").unwrap();
    let address = {
        let tx = db.begin(None).unwrap();
        let dba = db.accessor(&tx).unwrap();
        let vertex = dba.insert_vertex().unwrap();
        db.commit(&tx).unwrap();
        vertex.address()
    };

    let a = db.begin(None).unwrap();
    let b = db.begin(None).unwrap();
    let a_dba = db.accessor(&a).unwrap();
    let b_dba = db.accessor(&b).unwrap();

    a_dba
        .vertex_accessor(address, View::New)
        .set_property(p, quiver::PropertyValue::Int(1))
        .unwrap();
    db.commit(&a).unwrap();

    let err: quiver::Error = b_dba
        .vertex_accessor(address, View::New)
        .set_property(p, quiver::PropertyValue::Int(2))
        .unwrap_err()
        .into();
    assert!(err.is_retriable(), "a write-write conflict must be retriable");
    db.abort(&b);
}
