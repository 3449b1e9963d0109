//! The logical operator sum.
//!
//! A plan is a tree of [`PlanNode`]s produced by the planner (an external
//! collaborator) or built programmatically in tests. Nodes are plain
//! serde-able data so that worker sub-plans can be dispatched by value;
//! execution state lives exclusively in cursors (`exec::operators`).
//!
//! Every node reports its `output_symbols` and `modified_symbols`; symbols
//! are the only cross-operator coupling.

use quiver_core::{EdgeTypeId, LabelId, PlanId, PropertyId};
use serde::{Deserialize, Serialize};

use crate::expr::{Expression, GraphView};
use crate::symbols::Symbol;

/// Direction subset for expansions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpandDirection {
    /// Incoming edges only.
    In,
    /// Outgoing edges only.
    Out,
    /// Both directions.
    Both,
}

/// Ordering of one ORDER BY key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// SET behavior on whole property maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetPropertiesOp {
    /// Clear existing properties first (`SET n = {...}`).
    Replace,
    /// Merge into existing properties (`SET n += {...}`).
    Update,
}

/// An aggregation operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationOp {
    /// Row/value count.
    Count,
    /// Numeric sum.
    Sum,
    /// Numeric average (sum then divide at finalization).
    Avg,
    /// Minimum of Bool/Int/Double/String.
    Min,
    /// Maximum of Bool/Int/Double/String.
    Max,
    /// Collect values into a list.
    CollectList,
    /// Collect key-value pairs into a map.
    CollectMap,
}

/// One aggregation of an `Aggregate` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateElement {
    /// The aggregated expression; `None` only for `COUNT(*)`.
    pub value: Option<Expression>,
    /// The map key expression, only for `COLLECT_MAP`.
    pub key: Option<Expression>,
    /// The operation.
    pub op: AggregationOp,
    /// Where the result lands on the frame.
    pub output_symbol: Symbol,
}

/// A RETURN/WITH projection item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedExpression {
    /// The user-facing column name.
    pub name: String,
    /// The projected expression.
    pub expression: Expression,
    /// Where the value lands on the frame.
    pub symbol: Symbol,
}

/// What `CreateNode`/`CreateExpand` need to know about a node pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCreationInfo {
    /// The node's symbol.
    pub symbol: Symbol,
    /// Labels to set at creation.
    pub labels: Vec<LabelId>,
    /// Properties to set, evaluated under the NEW view.
    pub properties: Vec<(PropertyId, Expression)>,
}

/// What `CreateExpand` needs to know about the edge pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCreationInfo {
    /// The edge's symbol.
    pub symbol: Symbol,
    /// The edge type.
    pub edge_type: EdgeTypeId,
    /// CREATE allows In and Out; Both is planner-rejected and treated as
    /// Out here (the MERGE path produces it).
    pub direction: ExpandDirection,
    /// Properties to set, evaluated under the NEW view.
    pub properties: Vec<(PropertyId, Expression)>,
}

/// The inline filter lambda of variable-length expansions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionLambda {
    /// Symbol the candidate edge is bound to during evaluation.
    pub inner_edge: Symbol,
    /// Symbol the candidate vertex is bound to during evaluation.
    pub inner_node: Symbol,
    /// The predicate; `None` accepts every expansion.
    pub expression: Option<Expression>,
}

/// The weight lambda of weighted-shortest-path expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightLambda {
    /// Symbol the candidate edge is bound to during evaluation.
    pub inner_edge: Symbol,
    /// Symbol the candidate vertex is bound to during evaluation.
    pub inner_node: Symbol,
    /// Produces the edge weight; must be numeric and non-negative.
    pub expression: Expression,
}

/// Which variable-length expansion algorithm runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpandVariableKind {
    /// Depth-first enumeration of all paths within the bounds.
    Dfs,
    /// Breadth-first: one minimal path per reached vertex.
    Bfs,
    /// Dijkstra: cheapest path per reached vertex.
    WeightedShortestPath {
        /// Computes each expansion's weight.
        weight_lambda: WeightLambda,
        /// Where the total path weight lands on the frame.
        total_weight: Symbol,
    },
}

/// One end of an index range scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanBound {
    /// The bound expression, evaluated per input row.
    pub expression: Expression,
    /// Whether the bound is inclusive.
    pub inclusive: bool,
}

/// A stream definition at the operator boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSpec {
    /// Stream name.
    pub name: String,
    /// Source URI.
    pub uri: String,
    /// Transform script URI.
    pub transform: String,
}

/// A logical operator.
///
/// The tagged-variant shape is deliberate: plans are immutable shareable
/// data, cursors carry all execution state, and dispatching a sub-plan to
/// a worker is a plain serialization of this enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanNode {
    /// Yields a single empty row, then exhausts.
    Once,

    /// Creates a vertex per input row.
    CreateNode {
        /// Input operator.
        input: Box<PlanNode>,
        /// The node pattern.
        node: NodeCreationInfo,
        /// Place the vertex on a uniformly chosen worker.
        on_random_worker: bool,
    },

    /// Creates an edge (and possibly its destination vertex) per input row.
    CreateExpand {
        /// Input operator.
        input: Box<PlanNode>,
        /// The destination node pattern.
        node: NodeCreationInfo,
        /// The edge pattern.
        edge: EdgeCreationInfo,
        /// The origin vertex's symbol.
        input_symbol: Symbol,
        /// Whether the destination already exists on the frame.
        existing_node: bool,
    },

    /// Emits one row per vertex.
    ScanAll {
        /// Input operator.
        input: Box<PlanNode>,
        /// The scanned vertex's symbol.
        output_symbol: Symbol,
        /// OLD or NEW; the planner must not leave this AS_IS.
        view: GraphView,
    },

    /// Emits one row per vertex carrying a label.
    ScanAllByLabel {
        /// Input operator.
        input: Box<PlanNode>,
        /// The scanned vertex's symbol.
        output_symbol: Symbol,
        /// The required label.
        label: LabelId,
        /// OLD or NEW.
        view: GraphView,
    },

    /// Index scan by exact property value.
    ScanAllByLabelPropertyValue {
        /// Input operator.
        input: Box<PlanNode>,
        /// The scanned vertex's symbol.
        output_symbol: Symbol,
        /// The indexed label.
        label: LabelId,
        /// The indexed property.
        property: PropertyId,
        /// The looked-up value; a Null result skips the input row.
        expression: Expression,
        /// OLD or NEW.
        view: GraphView,
    },

    /// Index scan by property range; at least one bound is present.
    ScanAllByLabelPropertyRange {
        /// Input operator.
        input: Box<PlanNode>,
        /// The scanned vertex's symbol.
        output_symbol: Symbol,
        /// The indexed label.
        label: LabelId,
        /// The indexed property.
        property: PropertyId,
        /// Lower bound, if any.
        lower: Option<PlanBound>,
        /// Upper bound, if any.
        upper: Option<PlanBound>,
        /// OLD or NEW.
        view: GraphView,
    },

    /// Single-edge expansion from an input vertex.
    Expand {
        /// Input operator.
        input: Box<PlanNode>,
        /// The origin vertex's symbol.
        input_symbol: Symbol,
        /// The reached vertex's symbol.
        node_symbol: Symbol,
        /// The traversed edge's symbol.
        edge_symbol: Symbol,
        /// Direction subset.
        direction: ExpandDirection,
        /// Edge-type filter; empty means any.
        edge_types: Vec<EdgeTypeId>,
        /// Whether `node_symbol` is already bound and must match.
        existing_node: bool,
        /// View the origin vertex is switched to.
        view: GraphView,
    },

    /// Variable-length expansion (DFS, BFS or weighted shortest path).
    ExpandVariable {
        /// Input operator.
        input: Box<PlanNode>,
        /// The origin vertex's symbol.
        input_symbol: Symbol,
        /// The reached vertex's symbol.
        node_symbol: Symbol,
        /// The edge-list symbol.
        edge_symbol: Symbol,
        /// The algorithm.
        kind: ExpandVariableKind,
        /// Direction subset.
        direction: ExpandDirection,
        /// Edge-type filter; empty means any.
        edge_types: Vec<EdgeTypeId>,
        /// Lower path-length bound; defaults to 1.
        lower_bound: Option<Expression>,
        /// Upper path-length bound; defaults to unbounded.
        upper_bound: Option<Expression>,
        /// Whether `node_symbol` is already bound and must match.
        existing_node: bool,
        /// Inline expansion filter.
        filter_lambda: ExpansionLambda,
        /// Emit the edge list innermost-first.
        is_reverse: bool,
        /// View expansions are switched to.
        view: GraphView,
    },

    /// Assembles a named path from already-bound symbols.
    ConstructNamedPath {
        /// Input operator.
        input: Box<PlanNode>,
        /// The path's symbol.
        path_symbol: Symbol,
        /// The vertex/edge/edge-list symbols, in pattern order.
        path_elements: Vec<Symbol>,
    },

    /// Drops rows whose predicate is not strictly true.
    Filter {
        /// Input operator.
        input: Box<PlanNode>,
        /// The predicate, evaluated under OLD.
        expression: Expression,
    },

    /// Evaluates projections into the frame (NEW view).
    Produce {
        /// Input operator.
        input: Box<PlanNode>,
        /// The projection items.
        named_expressions: Vec<NamedExpression>,
    },

    /// Deletes entities produced by expressions.
    Delete {
        /// Input operator.
        input: Box<PlanNode>,
        /// The deleted expressions, evaluated under NEW.
        expressions: Vec<Expression>,
        /// DETACH semantics.
        detach: bool,
    },

    /// `SET obj.key = value`.
    SetProperty {
        /// Input operator.
        input: Box<PlanNode>,
        /// The owning object expression.
        object: Expression,
        /// The property key.
        key: PropertyId,
        /// The value expression.
        value: Expression,
    },

    /// `SET obj = map` / `SET obj += map`.
    SetProperties {
        /// Input operator.
        input: Box<PlanNode>,
        /// The target's symbol.
        input_symbol: Symbol,
        /// The source expression (map, vertex or edge).
        value: Expression,
        /// Replace or update.
        op: SetPropertiesOp,
    },

    /// Adds labels to a vertex.
    SetLabels {
        /// Input operator.
        input: Box<PlanNode>,
        /// The vertex's symbol.
        input_symbol: Symbol,
        /// Labels to add.
        labels: Vec<LabelId>,
    },

    /// `REMOVE obj.key`.
    RemoveProperty {
        /// Input operator.
        input: Box<PlanNode>,
        /// The owning object expression.
        object: Expression,
        /// The property key.
        key: PropertyId,
    },

    /// Removes labels from a vertex.
    RemoveLabels {
        /// Input operator.
        input: Box<PlanNode>,
        /// The vertex's symbol.
        input_symbol: Symbol,
        /// Labels to remove.
        labels: Vec<LabelId>,
    },

    /// MERGE: match or create, per input row.
    Merge {
        /// Input operator.
        input: Box<PlanNode>,
        /// The match branch.
        merge_match: Box<PlanNode>,
        /// The create branch; must always produce exactly one row.
        merge_create: Box<PlanNode>,
    },

    /// OPTIONAL MATCH.
    Optional {
        /// Input operator.
        input: Box<PlanNode>,
        /// The optional branch.
        optional: Box<PlanNode>,
        /// Symbols nulled when the branch produces nothing.
        optional_symbols: Vec<Symbol>,
    },

    /// Buffers the whole input; optionally advances the command.
    Accumulate {
        /// Input operator.
        input: Box<PlanNode>,
        /// The symbols carried across the barrier.
        symbols: Vec<Symbol>,
        /// Whether to advance the command after buffering.
        advance_command: bool,
    },

    /// Grouped aggregation.
    Aggregate {
        /// Input operator.
        input: Box<PlanNode>,
        /// The aggregations.
        aggregations: Vec<AggregateElement>,
        /// Group-key expressions.
        group_by: Vec<Expression>,
        /// Symbols whose first-row values are carried per group.
        remember: Vec<Symbol>,
    },

    /// SKIP.
    Skip {
        /// Input operator.
        input: Box<PlanNode>,
        /// Evaluated once on first pull; non-int or negative fails.
        expression: Expression,
    },

    /// LIMIT.
    Limit {
        /// Input operator.
        input: Box<PlanNode>,
        /// Evaluated before the first input pull; non-int or negative
        /// fails.
        expression: Expression,
    },

    /// ORDER BY: buffers everything, sorts, streams.
    OrderBy {
        /// Input operator.
        input: Box<PlanNode>,
        /// Sort keys, outermost first.
        order_by: Vec<(SortOrder, Expression)>,
        /// The symbols carried through the sort.
        output_symbols: Vec<Symbol>,
    },

    /// Deduplication on a symbol tuple.
    Distinct {
        /// Input operator.
        input: Box<PlanNode>,
        /// The deduplicated symbols.
        value_symbols: Vec<Symbol>,
    },

    /// UNWIND a list into rows.
    Unwind {
        /// Input operator.
        input: Box<PlanNode>,
        /// Must evaluate to a list.
        list_expression: Expression,
        /// The element's symbol.
        output_symbol: Symbol,
    },

    /// UNION of two branches by output-name matching.
    Union {
        /// Left branch.
        left: Box<PlanNode>,
        /// Right branch.
        right: Box<PlanNode>,
        /// The union's output symbols.
        union_symbols: Vec<Symbol>,
        /// The left branch's output symbols.
        left_symbols: Vec<Symbol>,
        /// The right branch's output symbols.
        right_symbols: Vec<Symbol>,
    },

    /// Cartesian product of two branches.
    Cartesian {
        /// Left branch, materialized fully.
        left: Box<PlanNode>,
        /// Right branch, streamed.
        right: Box<PlanNode>,
        /// The left branch's symbols.
        left_symbols: Vec<Symbol>,
        /// The right branch's symbols.
        right_symbols: Vec<Symbol>,
    },

    /// Pulls rows from the dispatched sub-plan on every peer worker.
    PullRemote {
        /// Optional local input, interleaved with remote rows.
        input: Option<Box<PlanNode>>,
        /// The dispatched plan's id.
        plan_id: PlanId,
        /// The symbols shipped per row.
        symbols: Vec<Symbol>,
    },

    /// The distributed barrier: accumulate, advance, apply deltas.
    Synchronize {
        /// The local input, drained fully at the barrier.
        input: Box<PlanNode>,
        /// The remote pull streamed after local rows.
        pull_remote: Option<Box<PlanNode>>,
        /// Whether the barrier advances the command.
        advance_command: bool,
    },

    /// CREATE INDEX.
    CreateIndex {
        /// The indexed label.
        label: LabelId,
        /// The indexed property.
        property: PropertyId,
    },

    /// CREATE STREAM.
    CreateStream {
        /// The stream definition.
        spec: StreamSpec,
    },

    /// DROP STREAM.
    DropStream {
        /// The dropped stream.
        name: String,
    },

    /// SHOW STREAMS.
    ShowStreams {
        /// Output symbols: name, uri, transform, status.
        output_symbols: Vec<Symbol>,
    },

    /// START STREAM.
    StartStream {
        /// The started stream.
        name: String,
        /// Stop after this many batches, if set.
        limit_batches: Option<i64>,
    },

    /// STOP STREAM.
    StopStream {
        /// The stopped stream.
        name: String,
    },

    /// TEST STREAM.
    TestStream {
        /// The tested stream.
        name: String,
        /// How many batches to dry-run.
        limit_batches: Option<i64>,
        /// Output symbols: query, parameters.
        output_symbols: Vec<Symbol>,
    },

    /// An authentication/authorization statement.
    AuthQuery {
        /// The statement, opaque at this boundary.
        statement: String,
        /// Output symbols defined by the delegate.
        output_symbols: Vec<Symbol>,
    },
}

impl PlanNode {
    /// The symbols this operator projects for a consumer (only
    /// projection-like operators report any).
    #[must_use]
    pub fn output_symbols(&self) -> Vec<Symbol> {
        match self {
            Self::Produce { named_expressions, .. } => {
                named_expressions.iter().map(|ne| ne.symbol.clone()).collect()
            }
            Self::Skip { input, .. }
            | Self::Limit { input, .. }
            | Self::OrderBy { input, .. }
            | Self::Distinct { input, .. }
            | Self::Accumulate { input, .. } => input.output_symbols(),
            Self::Union { union_symbols, .. } => union_symbols.clone(),
            Self::PullRemote { input, .. } => {
                input.as_ref().map(|i| i.output_symbols()).unwrap_or_default()
            }
            Self::Synchronize { input, .. } => input.output_symbols(),
            Self::Aggregate { aggregations, remember, .. } => {
                let mut symbols: Vec<Symbol> = remember.clone();
                symbols.extend(aggregations.iter().map(|a| a.output_symbol.clone()));
                symbols
            }
            Self::ShowStreams { output_symbols }
            | Self::TestStream { output_symbols, .. }
            | Self::AuthQuery { output_symbols, .. } => output_symbols.clone(),
            _ => Vec::new(),
        }
    }

    /// Every symbol this operator (or its inputs) may write on the frame.
    #[must_use]
    pub fn modified_symbols(&self) -> Vec<Symbol> {
        match self {
            Self::Once
            | Self::CreateIndex { .. }
            | Self::CreateStream { .. }
            | Self::DropStream { .. }
            | Self::StartStream { .. }
            | Self::StopStream { .. } => Vec::new(),
            Self::ShowStreams { output_symbols }
            | Self::TestStream { output_symbols, .. }
            | Self::AuthQuery { output_symbols, .. } => output_symbols.clone(),
            Self::CreateNode { input, node, .. } => {
                let mut symbols = input.modified_symbols();
                symbols.push(node.symbol.clone());
                symbols
            }
            Self::CreateExpand { input, node, edge, .. } => {
                let mut symbols = input.modified_symbols();
                symbols.push(node.symbol.clone());
                symbols.push(edge.symbol.clone());
                symbols
            }
            Self::ScanAll { input, output_symbol, .. }
            | Self::ScanAllByLabel { input, output_symbol, .. }
            | Self::ScanAllByLabelPropertyValue { input, output_symbol, .. }
            | Self::ScanAllByLabelPropertyRange { input, output_symbol, .. }
            | Self::Unwind { input, output_symbol, .. } => {
                let mut symbols = input.modified_symbols();
                symbols.push(output_symbol.clone());
                symbols
            }
            Self::Expand { input, node_symbol, edge_symbol, .. } => {
                let mut symbols = input.modified_symbols();
                symbols.push(node_symbol.clone());
                symbols.push(edge_symbol.clone());
                symbols
            }
            Self::ExpandVariable { input, node_symbol, edge_symbol, kind, .. } => {
                let mut symbols = input.modified_symbols();
                symbols.push(node_symbol.clone());
                symbols.push(edge_symbol.clone());
                if let ExpandVariableKind::WeightedShortestPath { total_weight, .. } = kind {
                    symbols.push(total_weight.clone());
                }
                symbols
            }
            Self::ConstructNamedPath { input, path_symbol, .. } => {
                let mut symbols = input.modified_symbols();
                symbols.push(path_symbol.clone());
                symbols
            }
            Self::Filter { input, .. }
            | Self::Delete { input, .. }
            | Self::SetProperty { input, .. }
            | Self::SetProperties { input, .. }
            | Self::SetLabels { input, .. }
            | Self::RemoveProperty { input, .. }
            | Self::RemoveLabels { input, .. }
            | Self::Skip { input, .. }
            | Self::Limit { input, .. }
            | Self::OrderBy { input, .. }
            | Self::Distinct { input, .. } => input.modified_symbols(),
            Self::Produce { input, named_expressions } => {
                let mut symbols = input.modified_symbols();
                symbols.extend(named_expressions.iter().map(|ne| ne.symbol.clone()));
                symbols
            }
            Self::Merge { input, merge_match, .. } => {
                let mut symbols = input.modified_symbols();
                symbols.extend(merge_match.modified_symbols());
                symbols
            }
            Self::Optional { input, optional, .. } => {
                let mut symbols = input.modified_symbols();
                symbols.extend(optional.modified_symbols());
                symbols
            }
            Self::Accumulate { symbols, .. } => symbols.clone(),
            Self::Aggregate { aggregations, remember, .. } => {
                let mut symbols: Vec<Symbol> = remember.clone();
                symbols.extend(aggregations.iter().map(|a| a.output_symbol.clone()));
                symbols
            }
            Self::Union { union_symbols, .. } => union_symbols.clone(),
            Self::Cartesian { left, right, .. } => {
                let mut symbols = left.modified_symbols();
                symbols.extend(right.modified_symbols());
                symbols
            }
            Self::PullRemote { input, symbols, .. } => {
                let mut all = symbols.clone();
                if let Some(input) = input {
                    all.extend(input.modified_symbols());
                }
                all
            }
            Self::Synchronize { input, pull_remote, .. } => {
                let mut symbols = input.modified_symbols();
                if let Some(pull) = pull_remote {
                    symbols.extend(pull.modified_symbols());
                }
                symbols
            }
        }
    }
}
