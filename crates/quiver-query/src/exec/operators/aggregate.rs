//! The aggregation operator.

use std::collections::HashMap;

use quiver_storage::DbAccessor;

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{check_abort, BoxedCursor, Cursor};
use crate::expr::{evaluate, Expression, GraphView};
use crate::frame::Frame;
use crate::plan::{AggregateElement, AggregationOp};
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// The default (and initial) value for an aggregation: valid both as the
/// empty-input result and as the starting accumulator.
fn default_value(op: AggregationOp) -> TypedValue {
    match op {
        AggregationOp::Count => TypedValue::Int(0),
        AggregationOp::Sum
        | AggregationOp::Min
        | AggregationOp::Max
        | AggregationOp::Avg => TypedValue::Null,
        AggregationOp::CollectList => TypedValue::List(Vec::new()),
        AggregationOp::CollectMap => TypedValue::Map(Default::default()),
    }
}

fn ensure_ok_for_min_max(value: &TypedValue) -> QueryResult<()> {
    match value {
        TypedValue::Bool(_) | TypedValue::Int(_) | TypedValue::Double(_) | TypedValue::String(_) => {
            Ok(())
        }
        other => Err(QueryError::Runtime(format!(
            "only Bool, Int, Double and String values are allowed in MIN and MAX aggregations, \
             got {}",
            other.type_name()
        ))),
    }
}

fn ensure_ok_for_avg_sum(value: &TypedValue) -> QueryResult<()> {
    if value.is_numeric() {
        Ok(())
    } else {
        Err(QueryError::Runtime(format!(
            "only numeric values allowed in SUM and AVG aggregations, got {}",
            value.type_name()
        )))
    }
}

/// Per-group accumulators.
struct GroupState {
    values: Vec<TypedValue>,
    counts: Vec<i64>,
    remember: Vec<TypedValue>,
}

/// Groups rows by key expressions and accumulates the aggregations.
///
/// Null inputs are skipped. An empty input with no grouping produces one
/// default row; with grouping it produces nothing. AVG sums first and
/// divides at finalization.
pub struct AggregateCursor {
    aggregations: Vec<AggregateElement>,
    group_by: Vec<Expression>,
    remember: Vec<Symbol>,
    input: BoxedCursor,
    dba: DbAccessor,
    groups: HashMap<Vec<TypedValue>, GroupState>,
    results: std::vec::IntoIter<GroupState>,
    pulled_all_input: bool,
    produced_default: bool,
}

impl AggregateCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        aggregations: Vec<AggregateElement>,
        group_by: Vec<Expression>,
        remember: Vec<Symbol>,
        input: BoxedCursor,
        dba: DbAccessor,
    ) -> Self {
        Self {
            aggregations,
            group_by,
            remember,
            input,
            dba,
            groups: HashMap::new(),
            results: Vec::new().into_iter(),
            pulled_all_input: false,
            produced_default: false,
        }
    }

    fn process_all(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<()> {
        while self.input.pull(frame, ctx)? {
            check_abort(&self.dba)?;
            self.process_one(frame, ctx)?;
        }

        // AVG kept a sum; divide now.
        for (position, element) in self.aggregations.iter().enumerate() {
            if element.op != AggregationOp::Avg {
                continue;
            }
            for state in self.groups.values_mut() {
                let count = state.counts[position];
                if count > 0 {
                    state.values[position] = state.values[position]
                        .divide(&TypedValue::Double(count as f64))?;
                }
            }
        }
        Ok(())
    }

    fn process_one(&mut self, frame: &Frame, ctx: &ExecutionContext) -> QueryResult<()> {
        let key = self
            .group_by
            .iter()
            .map(|e| evaluate(e, frame, &ctx.parameters, &self.dba, GraphView::New))
            .collect::<QueryResult<Vec<_>>>()?;

        if !self.groups.contains_key(&key) {
            let state = GroupState {
                values: self.aggregations.iter().map(|a| default_value(a.op)).collect(),
                counts: vec![0; self.aggregations.len()],
                remember: self.remember.iter().map(|s| frame.get(s).clone()).collect(),
            };
            self.groups.insert(key.clone(), state);
        }

        // Borrow juggling: evaluate inputs first, then update the state.
        let mut inputs = Vec::with_capacity(self.aggregations.len());
        for element in &self.aggregations {
            let value = match &element.value {
                None => None,
                Some(expression) => {
                    Some(evaluate(expression, frame, &ctx.parameters, &self.dba, GraphView::New)?)
                }
            };
            let map_key = match &element.key {
                None => None,
                Some(expression) => {
                    Some(evaluate(expression, frame, &ctx.parameters, &self.dba, GraphView::New)?)
                }
            };
            inputs.push((value, map_key));
        }

        let state = self.groups.get_mut(&key).expect("group was just inserted");
        for (position, (element, (value, map_key))) in
            self.aggregations.iter().zip(inputs).enumerate()
        {
            let count = &mut state.counts[position];
            let slot = &mut state.values[position];

            // COUNT(*) has no input expression and counts rows.
            let Some(value) = value else {
                *count += 1;
                *slot = TypedValue::Int(*count);
                continue;
            };
            // Aggregations skip Null inputs.
            if value.is_null() {
                continue;
            }
            *count += 1;

            if *count == 1 {
                match element.op {
                    AggregationOp::Min | AggregationOp::Max => {
                        ensure_ok_for_min_max(&value)?;
                        *slot = value;
                    }
                    AggregationOp::Sum | AggregationOp::Avg => {
                        ensure_ok_for_avg_sum(&value)?;
                        *slot = value;
                    }
                    AggregationOp::Count => *slot = TypedValue::Int(1),
                    AggregationOp::CollectList => {
                        if let TypedValue::List(list) = slot {
                            list.push(value);
                        }
                    }
                    AggregationOp::CollectMap => {
                        Self::collect_into_map(slot, map_key, value)?;
                    }
                }
                continue;
            }

            match element.op {
                AggregationOp::Count => *slot = TypedValue::Int(*count),
                AggregationOp::Min => {
                    ensure_ok_for_min_max(&value)?;
                    let less = value.order_cmp(slot).map_err(|_| {
                        QueryError::Runtime(format!(
                            "unable to get MIN of {} and {}",
                            value.type_name(),
                            slot.type_name()
                        ))
                    })? == std::cmp::Ordering::Less;
                    if less {
                        *slot = value;
                    }
                }
                AggregationOp::Max => {
                    ensure_ok_for_min_max(&value)?;
                    let greater = value.order_cmp(slot).map_err(|_| {
                        QueryError::Runtime(format!(
                            "unable to get MAX of {} and {}",
                            value.type_name(),
                            slot.type_name()
                        ))
                    })? == std::cmp::Ordering::Greater;
                    if greater {
                        *slot = value;
                    }
                }
                AggregationOp::Sum | AggregationOp::Avg => {
                    ensure_ok_for_avg_sum(&value)?;
                    *slot = slot.add(&value)?;
                }
                AggregationOp::CollectList => {
                    if let TypedValue::List(list) = slot {
                        list.push(value);
                    }
                }
                AggregationOp::CollectMap => {
                    Self::collect_into_map(slot, map_key, value)?;
                }
            }
        }
        Ok(())
    }

    fn collect_into_map(
        slot: &mut TypedValue,
        map_key: Option<TypedValue>,
        value: TypedValue,
    ) -> QueryResult<()> {
        let Some(TypedValue::String(key)) = map_key else {
            return Err(QueryError::Runtime("map key must be a string".into()));
        };
        if let TypedValue::Map(map) = slot {
            map.insert(key, value);
        }
        Ok(())
    }

    fn emit(&self, state: &GroupState, frame: &mut Frame) {
        for (element, value) in self.aggregations.iter().zip(&state.values) {
            frame.set(&element.output_symbol, value.clone());
        }
        for (symbol, value) in self.remember.iter().zip(&state.remember) {
            frame.set(symbol, value.clone());
        }
    }
}

impl Cursor for AggregateCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.pulled_all_input {
            self.process_all(frame, ctx)?;
            self.pulled_all_input = true;
            let states: Vec<GroupState> = {
                let mut groups = std::mem::take(&mut self.groups);
                groups.drain().map(|(_, state)| state).collect()
            };
            self.results = states.into_iter();

            // No input and no grouping: one row of defaults.
            if self.results.len() == 0 && self.group_by.is_empty() && !self.produced_default {
                self.produced_default = true;
                for element in &self.aggregations {
                    frame.set(&element.output_symbol, default_value(element.op));
                }
                for symbol in &self.remember {
                    frame.set(symbol, TypedValue::Null);
                }
                return Ok(true);
            }
        }

        match self.results.next() {
            Some(state) => {
                self.emit(&state, frame);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()?;
        self.groups.clear();
        self.results = Vec::new().into_iter();
        self.pulled_all_input = false;
        self.produced_default = false;
        Ok(())
    }
}
