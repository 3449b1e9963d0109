//! The pull-based cursor protocol and plan-to-cursor construction.

use quiver_storage::{DbAccessor, EdgeAccessor, VertexAccessor};

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::operators;
use crate::frame::Frame;
use crate::plan::{ExpandVariableKind, PlanNode};
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// A pull-based iterator over rows for one operator instance.
///
/// `pull` places the next row's symbols in `frame` and returns `true`;
/// `false` means exhaustion. A pull may suspend arbitrarily long on remote
/// RPCs or lock waits, and must check `should_abort` at loop tops.
///
/// `reset` rewinds to the initial state; distributed cursors (PullRemote,
/// Synchronize) are not resettable and fail with `Unsupported`.
pub trait Cursor: Send {
    /// Attempts to produce the next row.
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool>;

    /// Rewinds the cursor.
    fn reset(&mut self) -> QueryResult<()>;
}

/// A boxed cursor for dynamic dispatch.
pub type BoxedCursor = Box<dyn Cursor>;

/// Raises `HintedAbort` when the transaction was asked to terminate.
///
/// Called at the top of every pull loop.
#[inline]
pub fn check_abort(dba: &DbAccessor) -> QueryResult<()> {
    if dba.should_abort() {
        Err(QueryError::HintedAbort)
    } else {
        Ok(())
    }
}

/// Expects a vertex on the frame, with the operator-style error message.
pub fn expect_vertex<'a>(value: &'a TypedValue, symbol: &Symbol) -> QueryResult<&'a VertexAccessor> {
    value.as_vertex().ok_or_else(|| {
        QueryError::Runtime(format!(
            "expected a Vertex for '{}', but got {}",
            symbol.name(),
            value.type_name()
        ))
    })
}

/// Expects an edge on the frame.
pub fn expect_edge<'a>(value: &'a TypedValue, symbol: &Symbol) -> QueryResult<&'a EdgeAccessor> {
    value.as_edge().ok_or_else(|| {
        QueryError::Runtime(format!(
            "expected an Edge for '{}', but got {}",
            symbol.name(),
            value.type_name()
        ))
    })
}

/// Builds the cursor tree for a plan.
///
/// Cursors own copies of the plan data they need; the plan itself stays
/// immutable and shareable (it may concurrently serve other executions of
/// the same cached plan).
pub fn make_cursor(plan: &PlanNode, dba: &DbAccessor) -> QueryResult<BoxedCursor> {
    use operators::*;

    Ok(match plan {
        PlanNode::Once => Box::new(once::OnceCursor::new()),

        PlanNode::CreateNode { input, node, on_random_worker } => {
            Box::new(create::CreateNodeCursor::new(
                node.clone(),
                *on_random_worker,
                make_cursor(input, dba)?,
                dba.clone(),
            ))
        }

        PlanNode::CreateExpand { input, node, edge, input_symbol, existing_node } => {
            Box::new(create::CreateExpandCursor::new(
                node.clone(),
                edge.clone(),
                input_symbol.clone(),
                *existing_node,
                make_cursor(input, dba)?,
                dba.clone(),
            ))
        }

        PlanNode::ScanAll { input, output_symbol, view } => Box::new(scan::ScanCursor::new(
            scan::ScanSpec::All,
            output_symbol.clone(),
            *view,
            make_cursor(input, dba)?,
            dba.clone(),
        )),

        PlanNode::ScanAllByLabel { input, output_symbol, label, view } => {
            Box::new(scan::ScanCursor::new(
                scan::ScanSpec::ByLabel { label: *label },
                output_symbol.clone(),
                *view,
                make_cursor(input, dba)?,
                dba.clone(),
            ))
        }

        PlanNode::ScanAllByLabelPropertyValue {
            input,
            output_symbol,
            label,
            property,
            expression,
            view,
        } => Box::new(scan::ScanCursor::new(
            scan::ScanSpec::ByLabelPropertyValue {
                label: *label,
                property: *property,
                expression: expression.clone(),
            },
            output_symbol.clone(),
            *view,
            make_cursor(input, dba)?,
            dba.clone(),
        )),

        PlanNode::ScanAllByLabelPropertyRange {
            input,
            output_symbol,
            label,
            property,
            lower,
            upper,
            view,
        } => Box::new(scan::ScanCursor::new(
            scan::ScanSpec::ByLabelPropertyRange {
                label: *label,
                property: *property,
                lower: lower.clone(),
                upper: upper.clone(),
            },
            output_symbol.clone(),
            *view,
            make_cursor(input, dba)?,
            dba.clone(),
        )),

        PlanNode::Expand {
            input,
            input_symbol,
            node_symbol,
            edge_symbol,
            direction,
            edge_types,
            existing_node,
            view,
        } => Box::new(expand::ExpandCursor::new(
            expand::ExpandSpec {
                input_symbol: input_symbol.clone(),
                node_symbol: node_symbol.clone(),
                edge_symbol: edge_symbol.clone(),
                direction: *direction,
                edge_types: edge_types.clone(),
                existing_node: *existing_node,
                view: *view,
            },
            make_cursor(input, dba)?,
            dba.clone(),
        )),

        PlanNode::ExpandVariable {
            input,
            input_symbol,
            node_symbol,
            edge_symbol,
            kind,
            direction,
            edge_types,
            lower_bound,
            upper_bound,
            existing_node,
            filter_lambda,
            is_reverse,
            view,
        } => {
            let spec = expand_variable::VariableSpec {
                input_symbol: input_symbol.clone(),
                node_symbol: node_symbol.clone(),
                edge_symbol: edge_symbol.clone(),
                direction: *direction,
                edge_types: edge_types.clone(),
                lower_bound: lower_bound.clone(),
                upper_bound: upper_bound.clone(),
                existing_node: *existing_node,
                filter_lambda: filter_lambda.clone(),
                is_reverse: *is_reverse,
                view: *view,
            };
            let input_cursor = make_cursor(input, dba)?;
            match kind {
                ExpandVariableKind::Dfs => Box::new(expand_variable::ExpandVariableCursor::new(
                    spec,
                    input_cursor,
                    dba.clone(),
                )),
                ExpandVariableKind::Bfs => {
                    Box::new(bfs::ExpandBfsCursor::new(spec, input_cursor, dba.clone()))
                }
                ExpandVariableKind::WeightedShortestPath { weight_lambda, total_weight } => {
                    Box::new(weighted::ExpandWeightedShortestPathCursor::new(
                        spec,
                        weight_lambda.clone(),
                        total_weight.clone(),
                        input_cursor,
                        dba.clone(),
                    ))
                }
            }
        }

        PlanNode::ConstructNamedPath { input, path_symbol, path_elements } => {
            Box::new(path::ConstructNamedPathCursor::new(
                path_symbol.clone(),
                path_elements.clone(),
                make_cursor(input, dba)?,
                dba.clone(),
            ))
        }

        PlanNode::Filter { input, expression } => Box::new(filter::FilterCursor::new(
            expression.clone(),
            make_cursor(input, dba)?,
            dba.clone(),
        )),

        PlanNode::Produce { input, named_expressions } => Box::new(produce::ProduceCursor::new(
            named_expressions.clone(),
            make_cursor(input, dba)?,
            dba.clone(),
        )),

        PlanNode::Delete { input, expressions, detach } => Box::new(delete::DeleteCursor::new(
            expressions.clone(),
            *detach,
            make_cursor(input, dba)?,
            dba.clone(),
        )),

        PlanNode::SetProperty { input, object, key, value } => {
            Box::new(set::SetPropertyCursor::new(
                object.clone(),
                *key,
                value.clone(),
                make_cursor(input, dba)?,
                dba.clone(),
            ))
        }

        PlanNode::SetProperties { input, input_symbol, value, op } => {
            Box::new(set::SetPropertiesCursor::new(
                input_symbol.clone(),
                value.clone(),
                *op,
                make_cursor(input, dba)?,
                dba.clone(),
            ))
        }

        PlanNode::SetLabels { input, input_symbol, labels } => {
            Box::new(set::SetLabelsCursor::new(
                input_symbol.clone(),
                labels.clone(),
                make_cursor(input, dba)?,
                dba.clone(),
            ))
        }

        PlanNode::RemoveProperty { input, object, key } => {
            Box::new(set::RemovePropertyCursor::new(
                object.clone(),
                *key,
                make_cursor(input, dba)?,
                dba.clone(),
            ))
        }

        PlanNode::RemoveLabels { input, input_symbol, labels } => {
            Box::new(set::RemoveLabelsCursor::new(
                input_symbol.clone(),
                labels.clone(),
                make_cursor(input, dba)?,
                dba.clone(),
            ))
        }

        PlanNode::Merge { input, merge_match, merge_create } => {
            Box::new(merge::MergeCursor::new(
                make_cursor(input, dba)?,
                make_cursor(merge_match, dba)?,
                make_cursor(merge_create, dba)?,
            ))
        }

        PlanNode::Optional { input, optional, optional_symbols } => {
            Box::new(optional::OptionalCursor::new(
                optional_symbols.clone(),
                make_cursor(input, dba)?,
                make_cursor(optional, dba)?,
            ))
        }

        PlanNode::Accumulate { input, symbols, advance_command } => {
            Box::new(accumulate::AccumulateCursor::new(
                symbols.clone(),
                *advance_command,
                make_cursor(input, dba)?,
                dba.clone(),
            ))
        }

        PlanNode::Aggregate { input, aggregations, group_by, remember } => {
            Box::new(aggregate::AggregateCursor::new(
                aggregations.clone(),
                group_by.clone(),
                remember.clone(),
                make_cursor(input, dba)?,
                dba.clone(),
            ))
        }

        PlanNode::Skip { input, expression } => Box::new(skip_limit::SkipCursor::new(
            expression.clone(),
            make_cursor(input, dba)?,
            dba.clone(),
        )),

        PlanNode::Limit { input, expression } => Box::new(skip_limit::LimitCursor::new(
            expression.clone(),
            make_cursor(input, dba)?,
            dba.clone(),
        )),

        PlanNode::OrderBy { input, order_by, output_symbols } => {
            Box::new(order_by::OrderByCursor::new(
                order_by.clone(),
                output_symbols.clone(),
                make_cursor(input, dba)?,
                dba.clone(),
            ))
        }

        PlanNode::Distinct { input, value_symbols } => Box::new(distinct::DistinctCursor::new(
            value_symbols.clone(),
            make_cursor(input, dba)?,
        )),

        PlanNode::Unwind { input, list_expression, output_symbol } => {
            Box::new(unwind::UnwindCursor::new(
                list_expression.clone(),
                output_symbol.clone(),
                make_cursor(input, dba)?,
                dba.clone(),
            ))
        }

        PlanNode::Union { left, right, union_symbols, left_symbols, right_symbols } => {
            Box::new(union::UnionCursor::new(
                union_symbols.clone(),
                left_symbols.clone(),
                right_symbols.clone(),
                make_cursor(left, dba)?,
                make_cursor(right, dba)?,
            ))
        }

        PlanNode::Cartesian { left, right, left_symbols, right_symbols } => {
            Box::new(cartesian::CartesianCursor::new(
                left_symbols.clone(),
                right_symbols.clone(),
                make_cursor(left, dba)?,
                make_cursor(right, dba)?,
            ))
        }

        PlanNode::PullRemote { input, plan_id, symbols } => {
            let input_cursor = match input {
                Some(input) => Some(make_cursor(input, dba)?),
                None => None,
            };
            Box::new(pull_remote::PullRemoteCursor::new(
                *plan_id,
                symbols.clone(),
                input_cursor,
                dba.clone(),
            ))
        }

        PlanNode::Synchronize { input, pull_remote, advance_command } => {
            let pull_plan = match pull_remote.as_deref() {
                Some(PlanNode::PullRemote { plan_id, symbols, .. }) => {
                    Some((*plan_id, symbols.clone()))
                }
                Some(_) => {
                    return Err(QueryError::Semantic(
                        "Synchronize expects a PullRemote child".into(),
                    ))
                }
                None => None,
            };
            let pull_cursor = match pull_remote {
                Some(pull) => Some(make_cursor(pull, dba)?),
                None => None,
            };
            Box::new(synchronize::SynchronizeCursor::new(
                *advance_command,
                pull_plan,
                make_cursor(input, dba)?,
                pull_cursor,
                dba.clone(),
            ))
        }

        PlanNode::CreateIndex { label, property } => {
            Box::new(admin::CreateIndexCursor::new(*label, *property, dba.clone()))
        }

        PlanNode::CreateStream { spec } => Box::new(admin::StreamCursor::create(spec.clone())),
        PlanNode::DropStream { name } => Box::new(admin::StreamCursor::drop(name.clone())),
        PlanNode::ShowStreams { output_symbols } => {
            Box::new(admin::ShowStreamsCursor::new(output_symbols.clone()))
        }
        PlanNode::StartStream { name, limit_batches } => {
            Box::new(admin::StreamCursor::start(name.clone(), *limit_batches))
        }
        PlanNode::StopStream { name } => Box::new(admin::StreamCursor::stop(name.clone())),
        PlanNode::TestStream { name, limit_batches, output_symbols } => {
            Box::new(admin::TestStreamCursor::new(
                name.clone(),
                *limit_batches,
                output_symbols.clone(),
            ))
        }
        PlanNode::AuthQuery { statement, output_symbols } => {
            Box::new(admin::AuthQueryCursor::new(statement.clone(), output_symbols.clone()))
        }
    })
}
