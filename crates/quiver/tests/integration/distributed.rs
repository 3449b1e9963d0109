//! Distributed execution: remote pulls, the synchronize barrier and
//! remote-edge expansion.

use quiver::{Cluster, Parameters, PlanNode, SymbolTable, TypedValue, View, WorkerId};
use quiver_core::PlanId;
use quiver_query::expr::{Expression, GraphView};
use quiver_query::plan::{ExpandDirection, NamedExpression};
use quiver_query::symbols::SymbolType;

use crate::plans;

/// Creates `per_worker` vertices on every worker inside `tx`.
fn seed_vertices(cluster: &Cluster, tx: &quiver::Transaction, per_worker: usize) {
    for worker in cluster.worker_ids() {
        let dba = cluster.accessor_on(worker, tx).unwrap();
        for _ in 0..per_worker {
            dba.insert_vertex().unwrap();
        }
    }
}

#[test]
fn count_across_three_workers_through_the_barrier() {
    // Three workers, two vertices each: MATCH (n) RETURN count(n) = 6,
    // with the synchronize barrier between the writes and the reads.
    let cluster = Cluster::start(3);
    let tx = cluster.begin(None).unwrap();
    seed_vertices(&cluster, &tx, 2);

    let mut table = SymbolTable::new();
    let n = table.create("n", SymbolType::Vertex, true);

    // The sub-plan every worker serves.
    let worker_plan = PlanNode::ScanAll {
        input: Box::new(PlanNode::Once),
        output_symbol: n.clone(),
        view: GraphView::New,
    };
    let plan_id = PlanId(1);
    cluster.dispatch_plan(plan_id, &worker_plan, &table).unwrap();

    // The master plan: synchronize, then local rows, then remote rows.
    let synchronize = PlanNode::Synchronize {
        input: Box::new(PlanNode::ScanAll {
            input: Box::new(PlanNode::Once),
            output_symbol: n.clone(),
            view: GraphView::New,
        }),
        pull_remote: Some(Box::new(PlanNode::PullRemote {
            input: None,
            plan_id,
            symbols: vec![n.clone()],
        })),
        advance_command: true,
    };
    let (count_plan, _) = plans::count_over(&mut table, synchronize, n);

    let rows = cluster.pull_all(&tx, &count_plan, &table, Parameters::new()).unwrap();
    assert_eq!(rows, vec![vec![TypedValue::Int(6)]]);

    cluster.remove_plan(plan_id);
    cluster.commit(&tx).unwrap();
}

#[test]
fn barrier_applies_deferred_remote_creations() {
    let cluster = Cluster::start(2);
    let tx = cluster.begin(None).unwrap();
    let master_dba = cluster.accessor(&tx).unwrap();
    let remote_worker = WorkerId::new(1);

    // A CREATE targeted at the other worker is buffered there until the
    // barrier applies it.
    master_dba
        .insert_vertex_into_remote(remote_worker, Vec::new(), Default::default())
        .unwrap();
    let owner_dba = cluster.accessor_on(remote_worker, &tx).unwrap();
    assert!(owner_dba.vertices(View::New).unwrap().is_empty(), "the create must be deferred");

    let table = SymbolTable::new();
    let barrier = PlanNode::Synchronize {
        input: Box::new(PlanNode::Once),
        pull_remote: None,
        advance_command: true,
    };
    cluster.pull_all(&tx, &barrier, &table, Parameters::new()).unwrap();

    assert_eq!(owner_dba.vertices(View::New).unwrap().len(), 1, "the barrier applies the create");
    cluster.commit(&tx).unwrap();
}

#[test]
fn expand_joins_remote_edges_through_futures() {
    let cluster = Cluster::start(2);
    let t = cluster.names().edge_type("T").unwrap();
    let p = cluster.names().property("p").unwrap();
    let tx = cluster.begin(None).unwrap();

    // One vertex on each worker; worker 1's carries a property.
    let master_dba = cluster.accessor(&tx).unwrap();
    let a = master_dba.insert_vertex().unwrap();
    let worker_dba = cluster.accessor_on(WorkerId::new(1), &tx).unwrap();
    let b = worker_dba.insert_vertex().unwrap();
    b.set_property(p, quiver::PropertyValue::Int(7)).unwrap();

    // The edge lives on the master; its destination is remote.
    let b_from_master = master_dba.vertex_accessor(b.address(), View::New);
    master_dba.insert_edge(&a, &b_from_master, t).unwrap();

    // MATCH (n)-[r]->(m) RETURN m.p on the master: the remote edge is
    // resolved through a concurrent fetch, not a blocking read.
    let mut table = SymbolTable::new();
    let n = table.create("n", SymbolType::Vertex, true);
    let r = table.create("r", SymbolType::Edge, true);
    let m = table.create("m", SymbolType::Vertex, true);
    let out = table.create("m.p", SymbolType::Any, false);
    let plan = PlanNode::Produce {
        input: Box::new(PlanNode::Expand {
            input: Box::new(PlanNode::ScanAll {
                input: Box::new(PlanNode::Once),
                output_symbol: n.clone(),
                view: GraphView::New,
            }),
            input_symbol: n,
            node_symbol: m.clone(),
            edge_symbol: r,
            direction: ExpandDirection::Out,
            edge_types: Vec::new(),
            existing_node: false,
            view: GraphView::New,
        }),
        named_expressions: vec![NamedExpression {
            name: "m.p".into(),
            expression: Expression::ident(m).property(p, "p"),
            symbol: out,
        }],
    };

    let rows = cluster.pull_all(&tx, &plan, &table, Parameters::new()).unwrap();
    assert_eq!(rows, vec![vec![TypedValue::Int(7)]]);
    cluster.commit(&tx).unwrap();
}

#[test]
fn snapshot_rpc_fans_out() {
    let cluster = Cluster::start(3);
    assert!(cluster.make_snapshot().unwrap());
}

#[test]
fn shutdown_is_signal_driven_and_idempotent() {
    let cluster = Cluster::start(2);
    cluster.shutdown();
    cluster.shutdown();
    cluster.await_shutdown();
    let tx = cluster.begin(None).unwrap();
    assert!(cluster.accessor(&tx).is_err());
}
