//! Shared plan builders for the integration tests.
//!
//! These produce the operator trees the planner would emit for the
//! corresponding Cypher shapes.

use quiver::{PlanNode, Symbol, SymbolTable};
use quiver_query::expr::{Expression, Function, GraphView};
use quiver_query::plan::{
    AggregateElement, AggregationOp, ExpandDirection, ExpandVariableKind, ExpansionLambda,
    NamedExpression,
};
use quiver_query::symbols::SymbolType;

/// `UNWIND <list> AS x RETURN x`
pub fn unwind_return(table: &mut SymbolTable, items: Vec<Expression>) -> (PlanNode, Symbol) {
    let x = table.create("x", SymbolType::Any, true);
    let out = table.create("x_out", SymbolType::Any, false);
    let plan = PlanNode::Produce {
        input: Box::new(PlanNode::Unwind {
            input: Box::new(PlanNode::Once),
            list_expression: Expression::ListLiteral(items),
            output_symbol: x.clone(),
        }),
        named_expressions: vec![NamedExpression {
            name: "x".into(),
            expression: Expression::ident(x),
            symbol: out.clone(),
        }],
    };
    (plan, out)
}

/// `MATCH (n) RETURN count(n)` over a scan input.
pub fn count_over(table: &mut SymbolTable, input: PlanNode, counted: Symbol) -> (PlanNode, Symbol) {
    let count = table.create("count", SymbolType::Number, false);
    let out = table.create("count_out", SymbolType::Number, false);
    let plan = PlanNode::Produce {
        input: Box::new(PlanNode::Aggregate {
            input: Box::new(input),
            aggregations: vec![AggregateElement {
                value: Some(Expression::ident(counted)),
                key: None,
                op: AggregationOp::Count,
                output_symbol: count.clone(),
            }],
            group_by: Vec::new(),
            remember: Vec::new(),
        }),
        named_expressions: vec![NamedExpression {
            name: "count".into(),
            expression: Expression::ident(count),
            symbol: out.clone(),
        }],
    };
    (plan, out)
}

/// `MATCH (n)` as a scan of every vertex.
pub fn scan_all(table: &mut SymbolTable, view: GraphView) -> (PlanNode, Symbol) {
    let n = table.create("n", SymbolType::Vertex, true);
    let plan = PlanNode::ScanAll {
        input: Box::new(PlanNode::Once),
        output_symbol: n.clone(),
        view,
    };
    (plan, n)
}

/// `MATCH (n)-[r*lower..upper]-(m)` (DFS, both directions, no filter).
pub struct VarExpand {
    pub plan: PlanNode,
    pub edge_list: Symbol,
}

pub fn var_expand_both(table: &mut SymbolTable, lower: i64, upper: i64) -> VarExpand {
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
        node_symbol: m,
        edge_symbol: r.clone(),
        kind: ExpandVariableKind::Dfs,
        direction: ExpandDirection::Both,
        edge_types: Vec::new(),
        lower_bound: Some(Expression::int(lower)),
        upper_bound: Some(Expression::int(upper)),
        existing_node: false,
        filter_lambda: ExpansionLambda { inner_edge, inner_node, expression: None },
        is_reverse: false,
        view: GraphView::New,
    };
    VarExpand { plan, edge_list: r }
}

/// `RETURN length(r)` over a variable expansion.
pub fn length_of(table: &mut SymbolTable, expand: VarExpand) -> (PlanNode, Symbol) {
    let out = table.create("length", SymbolType::Number, false);
    let plan = PlanNode::Produce {
        input: Box::new(expand.plan),
        named_expressions: vec![NamedExpression {
            name: "length".into(),
            expression: Expression::FunctionCall {
                function: Function::Length,
                args: vec![Expression::ident(expand.edge_list)],
            },
            symbol: out.clone(),
        }],
    };
    (plan, out)
}
