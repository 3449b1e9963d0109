//! The literal end-to-end scenarios.

use quiver::{Database, Parameters, PlanNode, SymbolTable, TypedValue, View};
use quiver_query::expr::{Expression, GraphView};
use quiver_query::plan::{
    AggregateElement, AggregationOp, NamedExpression, NodeCreationInfo,
};
use quiver_query::symbols::SymbolType;

use crate::plans;

#[test]
fn unwind_returns_elements_in_order() {
    // UNWIND [1, 2, 3] AS x RETURN x
    let db = Database::in_memory();
    let mut table = SymbolTable::new();
    let (plan, out) = plans::unwind_return(
        &mut table,
        vec![Expression::int(1), Expression::int(2), Expression::int(3)],
    );

    let rows = db.execute(&plan, &table, Parameters::new()).expect("query failed");
    let values: Vec<&TypedValue> = rows.iter().map(|r| &r[0]).collect();
    assert_eq!(
        values,
        vec![&TypedValue::Int(1), &TypedValue::Int(2), &TypedValue::Int(3)],
        "unwound rows must preserve list order"
    );
    let _ = out;
}

#[test]
fn create_node_and_count_it_back() {
    // CREATE (n:L {p: 42}) RETURN n.p, then MATCH (n:L) RETURN count(n)
    let db = Database::in_memory();
    let label = db.names().label("L").unwrap();
    let p = db.names().property("p").unwrap();

    let mut table = SymbolTable::new();
    let n = table.create("n", SymbolType::Vertex, true);
    let out = table.create("n.p", SymbolType::Any, false);
    let create = PlanNode::Produce {
        input: Box::new(PlanNode::CreateNode {
            input: Box::new(PlanNode::Once),
            node: NodeCreationInfo {
                symbol: n.clone(),
                labels: vec![label],
                properties: vec![(p, Expression::int(42))],
            },
            on_random_worker: false,
        }),
        named_expressions: vec![NamedExpression {
            name: "n.p".into(),
            expression: Expression::ident(n).property(p, "p"),
            symbol: out,
        }],
    };
    let rows = db.execute(&create, &table, Parameters::new()).expect("create failed");
    assert_eq!(rows, vec![vec![TypedValue::Int(42)]]);

    let mut table = SymbolTable::new();
    let m = table.create("n", SymbolType::Vertex, true);
    let scan = PlanNode::ScanAllByLabel {
        input: Box::new(PlanNode::Once),
        output_symbol: m.clone(),
        label,
        view: GraphView::Old,
    };
    let (count_plan, _) = plans::count_over(&mut table, scan, m);
    let rows = db.execute(&count_plan, &table, Parameters::new()).expect("count failed");
    assert_eq!(rows, vec![vec![TypedValue::Int(1)]]);
}

#[test]
fn variable_expansion_lengths_on_a_three_vertex_path() {
    // MATCH (n)-[r*1..2]-(m) RETURN length(r) on the path A-B-C.
    // Every path is enumerated from both of its endpoints: each edge
    // once per endpoint, each two-hop path from A and from C.
    let db = Database::in_memory();
    let t = db.names().edge_type("T").unwrap();
    {
        let tx = db.begin(None).unwrap();
        let dba = db.accessor(&tx).unwrap();
        let a = dba.insert_vertex().unwrap();
        let b = dba.insert_vertex().unwrap();
        let c = dba.insert_vertex().unwrap();
        dba.insert_edge(&a, &b, t).unwrap();
        dba.insert_edge(&b, &c, t).unwrap();
        db.commit(&tx).unwrap();
    }

    let mut table = SymbolTable::new();
    let expand = plans::var_expand_both(&mut table, 1, 2);
    let (plan, _) = plans::length_of(&mut table, expand);
    let rows = db.execute(&plan, &table, Parameters::new()).expect("query failed");

    let mut lengths: Vec<i64> =
        rows.iter().map(|r| r[0].as_int().expect("length is an int")).collect();
    lengths.sort_unstable();
    assert_eq!(lengths, vec![1, 1, 1, 1, 2, 2]);
}

#[test]
fn sum_plus_count_over_constants() {
    // RETURN sum(2) + count(3): one implicit row, sum = 2, count = 1.
    let db = Database::in_memory();
    let mut table = SymbolTable::new();
    let sum = table.create("sum", SymbolType::Number, false);
    let count = table.create("count", SymbolType::Number, false);
    let out = table.create("result", SymbolType::Number, false);

    let plan = PlanNode::Produce {
        input: Box::new(PlanNode::Aggregate {
            input: Box::new(PlanNode::Once),
            aggregations: vec![
                AggregateElement {
                    value: Some(Expression::int(2)),
                    key: None,
                    op: AggregationOp::Sum,
                    output_symbol: sum.clone(),
                },
                AggregateElement {
                    value: Some(Expression::int(3)),
                    key: None,
                    op: AggregationOp::Count,
                    output_symbol: count.clone(),
                },
            ],
            group_by: Vec::new(),
            remember: Vec::new(),
        }),
        named_expressions: vec![NamedExpression {
            name: "result".into(),
            expression: Expression::ident(sum).add(Expression::ident(count)),
            symbol: out,
        }],
    };
    let rows = db.execute(&plan, &table, Parameters::new()).expect("query failed");
    assert_eq!(rows, vec![vec![TypedValue::Int(3)]]);
}

#[test]
fn merge_on_create_then_on_match() {
    // MERGE (a {id: 1}) ON CREATE SET a.n = 1 ON MATCH SET a.n = a.n + 1,
    // run twice: the second run matches and bumps, so a.n = 2.
    let db = Database::in_memory();
    let id = db.names().property("id").unwrap();
    let n_prop = db.names().property("n").unwrap();

    let build = |table: &mut SymbolTable| -> PlanNode {
        let a = table.create("a", SymbolType::Vertex, true);
        let merge_match = PlanNode::SetProperty {
            input: Box::new(PlanNode::Filter {
                input: Box::new(PlanNode::ScanAll {
                    input: Box::new(PlanNode::Once),
                    output_symbol: a.clone(),
                    view: GraphView::New,
                }),
                expression: Expression::ident(a.clone()).property(id, "id").eq(Expression::int(1)),
            }),
            object: Expression::ident(a.clone()),
            key: n_prop,
            value: Expression::ident(a.clone())
                .property(n_prop, "n")
                .add(Expression::int(1)),
        };
        let merge_create = PlanNode::SetProperty {
            input: Box::new(PlanNode::CreateNode {
                input: Box::new(PlanNode::Once),
                node: NodeCreationInfo {
                    symbol: a.clone(),
                    labels: Vec::new(),
                    properties: vec![(id, Expression::int(1))],
                },
                on_random_worker: false,
            }),
            object: Expression::ident(a.clone()),
            key: n_prop,
            value: Expression::int(1),
        };
        PlanNode::Merge {
            input: Box::new(PlanNode::Once),
            merge_match: Box::new(merge_match),
            merge_create: Box::new(merge_create),
        }
    };

    for _ in 0..2 {
        let mut table = SymbolTable::new();
        let plan = build(&mut table);
        db.execute(&plan, &table, Parameters::new()).expect("merge failed");
    }

    let tx = db.begin(None).unwrap();
    let dba = db.accessor(&tx).unwrap();
    let vertices = dba.vertices(View::New).unwrap();
    assert_eq!(vertices.len(), 1, "merge must not duplicate the node");
    assert_eq!(
        vertices[0].property(n_prop).unwrap(),
        quiver::PropertyValue::Int(2),
        "second run must bump n"
    );
    db.commit(&tx).unwrap();
}
