//! The tree-walking expression evaluator.

use quiver_storage::{DbAccessor, View};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::expr::{BinaryOp, Expression, Function, UnaryOp};
use crate::frame::Frame;
use crate::value::{Parameters, TypedValue};

/// Which MVCC view an evaluation observes.
///
/// `AsIs` leaves accessors at whatever view they already carry; `Old` and
/// `New` override it for the duration of the evaluation (the accessor
/// state stored on the frame is not permanently switched).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphView {
    /// The state before the current command.
    Old,
    /// The state including the current command.
    New,
    /// Whatever view each accessor already observes.
    AsIs,
}

impl GraphView {
    /// The effective storage view for an accessor currently at `current`.
    #[must_use]
    pub fn effective(self, current: View) -> View {
        match self {
            Self::Old => View::Old,
            Self::New => View::New,
            Self::AsIs => current,
        }
    }
}

/// Evaluates expressions over a frame, parameters and an accessor.
///
/// The evaluator is a cheap, short-lived view; operators construct one per
/// evaluation (or use the [`evaluate`] convenience function).
pub struct ExpressionEvaluator<'a> {
    frame: &'a Frame,
    parameters: &'a Parameters,
    dba: &'a DbAccessor,
    view: GraphView,
}

impl<'a> ExpressionEvaluator<'a> {
    /// Creates an evaluator.
    #[must_use]
    pub fn new(
        frame: &'a Frame,
        parameters: &'a Parameters,
        dba: &'a DbAccessor,
        view: GraphView,
    ) -> Self {
        Self { frame, parameters, dba, view }
    }

    /// Evaluates an expression to a value.
    pub fn eval(&self, expression: &Expression) -> QueryResult<TypedValue> {
        match expression {
            Expression::Literal(value) => Ok(TypedValue::from_property(value.clone())),
            Expression::Parameter { token_position } => Ok(TypedValue::from_property(
                self.parameters.at_position(*token_position)?.clone(),
            )),
            Expression::Identifier(symbol) => Ok(self.frame.get(symbol).clone()),
            Expression::Property { base, key, name } => {
                let base = self.eval(base)?;
                match base {
                    TypedValue::Null => Ok(TypedValue::Null),
                    TypedValue::Vertex(v) => {
                        let view = self.view.effective(v.view());
                        Ok(TypedValue::from_property(v.with_view(view).property(*key)?))
                    }
                    TypedValue::Edge(e) => {
                        let view = self.view.effective(e.view());
                        Ok(TypedValue::from_property(e.with_view(view).property(*key)?))
                    }
                    TypedValue::Map(map) => {
                        Ok(map.get(name).cloned().unwrap_or(TypedValue::Null))
                    }
                    other => Err(QueryError::Runtime(format!(
                        "cannot look up a property on a {}",
                        other.type_name()
                    ))),
                }
            }
            Expression::HasLabel { base, labels } => {
                let base = self.eval(base)?;
                match base {
                    TypedValue::Null => Ok(TypedValue::Null),
                    TypedValue::Vertex(v) => {
                        let view = self.view.effective(v.view());
                        let v = v.with_view(view);
                        for &label in labels {
                            if !v.has_label(label)? {
                                return Ok(TypedValue::Bool(false));
                            }
                        }
                        Ok(TypedValue::Bool(true))
                    }
                    other => Err(QueryError::Runtime(format!(
                        "labels test expected a Vertex, got {}",
                        other.type_name()
                    ))),
                }
            }
            Expression::Unary { op, expr } => self.eval_unary(*op, expr),
            Expression::Binary { op, left, right } => self.eval_binary(*op, left, right),
            Expression::ListLiteral(items) => Ok(TypedValue::List(
                items.iter().map(|e| self.eval(e)).collect::<QueryResult<_>>()?,
            )),
            Expression::MapLiteral(entries) => Ok(TypedValue::Map(
                entries
                    .iter()
                    .map(|(k, e)| Ok((k.clone(), self.eval(e)?)))
                    .collect::<QueryResult<_>>()?,
            )),
            Expression::Subscript { base, index } => self.eval_subscript(base, index),
            Expression::FunctionCall { function, args } => self.eval_function(*function, args),
        }
    }

    fn eval_unary(&self, op: UnaryOp, expr: &Expression) -> QueryResult<TypedValue> {
        let value = self.eval(expr)?;
        match op {
            UnaryOp::IsNull => Ok(TypedValue::Bool(value.is_null())),
            UnaryOp::Not => match value {
                TypedValue::Null => Ok(TypedValue::Null),
                TypedValue::Bool(b) => Ok(TypedValue::Bool(!b)),
                other => Err(QueryError::Runtime(format!(
                    "NOT expected a Bool, got {}",
                    other.type_name()
                ))),
            },
            UnaryOp::Minus => value.negate(),
            UnaryOp::Plus => match value {
                TypedValue::Null | TypedValue::Int(_) | TypedValue::Double(_) => Ok(value),
                other => Err(QueryError::Runtime(format!(
                    "unary '+' expected a number, got {}",
                    other.type_name()
                ))),
            },
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> QueryResult<TypedValue> {
        // AND/OR shortcut on a known-deciding left operand.
        match op {
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                return self.eval_logical(op, left, right)
            }
            _ => {}
        }
        let l = self.eval(left)?;
        let r = self.eval(right)?;
        match op {
            BinaryOp::Add => l.add(&r),
            BinaryOp::Subtract => l.subtract(&r),
            BinaryOp::Multiply => l.multiply(&r),
            BinaryOp::Divide => l.divide(&r),
            BinaryOp::Modulo => l.modulo(&r),
            BinaryOp::Eq => Ok(l.cypher_eq(&r)),
            BinaryOp::Ne => Ok(match l.cypher_eq(&r) {
                TypedValue::Bool(b) => TypedValue::Bool(!b),
                other => other,
            }),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                use std::cmp::Ordering;
                let Some(ordering) = l.cypher_cmp(&r)? else {
                    return Ok(TypedValue::Null);
                };
                let result = match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    BinaryOp::Ge => ordering != Ordering::Less,
                    _ => unreachable!(),
                };
                Ok(TypedValue::Bool(result))
            }
            BinaryOp::In => {
                if r.is_null() {
                    return Ok(TypedValue::Null);
                }
                let TypedValue::List(items) = r else {
                    return Err(QueryError::Runtime(format!(
                        "IN expected a List, got {}",
                        r.type_name()
                    )));
                };
                let mut saw_null = l.is_null();
                for item in &items {
                    match l.cypher_eq(item) {
                        TypedValue::Bool(true) => return Ok(TypedValue::Bool(true)),
                        TypedValue::Null => saw_null = true,
                        _ => {}
                    }
                }
                Ok(if saw_null { TypedValue::Null } else { TypedValue::Bool(false) })
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => unreachable!(),
        }
    }

    fn eval_logical(
        &self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> QueryResult<TypedValue> {
        let to_bool = |value: TypedValue| -> QueryResult<Option<bool>> {
            match value {
                TypedValue::Null => Ok(None),
                TypedValue::Bool(b) => Ok(Some(b)),
                other => Err(QueryError::Runtime(format!(
                    "logical operators expect Bool or Null, got {}",
                    other.type_name()
                ))),
            }
        };
        let l = to_bool(self.eval(left)?)?;
        match (op, l) {
            // Three-valued shortcuts.
            (BinaryOp::And, Some(false)) => return Ok(TypedValue::Bool(false)),
            (BinaryOp::Or, Some(true)) => return Ok(TypedValue::Bool(true)),
            _ => {}
        }
        let r = to_bool(self.eval(right)?)?;
        let result = match op {
            BinaryOp::And => match (l, r) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            BinaryOp::Or => match (l, r) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            BinaryOp::Xor => match (l, r) {
                (Some(a), Some(b)) => Some(a != b),
                _ => None,
            },
            _ => unreachable!(),
        };
        Ok(result.map_or(TypedValue::Null, TypedValue::Bool))
    }

    fn eval_subscript(&self, base: &Expression, index: &Expression) -> QueryResult<TypedValue> {
        let base = self.eval(base)?;
        let index = self.eval(index)?;
        if base.is_null() || index.is_null() {
            return Ok(TypedValue::Null);
        }
        match (&base, &index) {
            (TypedValue::List(items), TypedValue::Int(i)) => {
                let len = items.len() as i64;
                let effective = if *i < 0 { i + len } else { *i };
                if effective < 0 || effective >= len {
                    Ok(TypedValue::Null)
                } else {
                    Ok(items[effective as usize].clone())
                }
            }
            (TypedValue::Map(map), TypedValue::String(key)) => {
                Ok(map.get(key).cloned().unwrap_or(TypedValue::Null))
            }
            _ => Err(QueryError::Runtime(format!(
                "cannot index a {} with a {}",
                base.type_name(),
                index.type_name()
            ))),
        }
    }

    fn eval_function(&self, function: Function, args: &[Expression]) -> QueryResult<TypedValue> {
        let arity = |expected: usize| -> QueryResult<()> {
            if args.len() == expected {
                Ok(())
            } else {
                Err(QueryError::Runtime(format!(
                    "{}() expects {expected} argument(s), got {}",
                    function.name(),
                    args.len()
                )))
            }
        };
        match function {
            Function::Coalesce => {
                for arg in args {
                    let value = self.eval(arg)?;
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                Ok(TypedValue::Null)
            }
            Function::Size | Function::Length => {
                arity(1)?;
                match self.eval(&args[0])? {
                    TypedValue::Null => Ok(TypedValue::Null),
                    TypedValue::List(l) => Ok(TypedValue::Int(l.len() as i64)),
                    TypedValue::String(s) if function == Function::Size => {
                        Ok(TypedValue::Int(s.chars().count() as i64))
                    }
                    TypedValue::Map(m) if function == Function::Size => {
                        Ok(TypedValue::Int(m.len() as i64))
                    }
                    TypedValue::Path(p) if function == Function::Length => {
                        Ok(TypedValue::Int(p.size() as i64))
                    }
                    other => Err(QueryError::Runtime(format!(
                        "{}() is not defined for {}",
                        function.name(),
                        other.type_name()
                    ))),
                }
            }
            Function::Labels => {
                arity(1)?;
                match self.eval(&args[0])? {
                    TypedValue::Null => Ok(TypedValue::Null),
                    TypedValue::Vertex(v) => {
                        let view = self.view.effective(v.view());
                        let labels = v.with_view(view).labels()?;
                        let names = labels
                            .into_iter()
                            .map(|l| Ok(TypedValue::String(self.dba.registry().label_name(l)?)))
                            .collect::<QueryResult<Vec<_>>>()?;
                        Ok(TypedValue::List(names))
                    }
                    other => Err(QueryError::Runtime(format!(
                        "labels() expected a Vertex, got {}",
                        other.type_name()
                    ))),
                }
            }
            Function::Type => {
                arity(1)?;
                match self.eval(&args[0])? {
                    TypedValue::Null => Ok(TypedValue::Null),
                    TypedValue::Edge(e) => Ok(TypedValue::String(
                        self.dba.registry().edge_type_name(e.edge_type()?)?,
                    )),
                    other => Err(QueryError::Runtime(format!(
                        "type() expected an Edge, got {}",
                        other.type_name()
                    ))),
                }
            }
            Function::Properties => {
                arity(1)?;
                let props = match self.eval(&args[0])? {
                    TypedValue::Null => return Ok(TypedValue::Null),
                    TypedValue::Vertex(v) => {
                        let view = self.view.effective(v.view());
                        v.with_view(view).properties()?
                    }
                    TypedValue::Edge(e) => {
                        let view = self.view.effective(e.view());
                        e.with_view(view).properties()?
                    }
                    other => {
                        return Err(QueryError::Runtime(format!(
                            "properties() expected a Vertex or Edge, got {}",
                            other.type_name()
                        )))
                    }
                };
                let map = props
                    .into_iter()
                    .map(|(key, value)| {
                        Ok((
                            self.dba.registry().property_name(key)?,
                            TypedValue::from_property(value),
                        ))
                    })
                    .collect::<QueryResult<_>>()?;
                Ok(TypedValue::Map(map))
            }
            Function::Id => {
                arity(1)?;
                match self.eval(&args[0])? {
                    TypedValue::Null => Ok(TypedValue::Null),
                    TypedValue::Vertex(v) => Ok(TypedValue::Int(v.address().raw() as i64)),
                    TypedValue::Edge(e) => Ok(TypedValue::Int(e.address().raw() as i64)),
                    other => Err(QueryError::Runtime(format!(
                        "id() expected a Vertex or Edge, got {}",
                        other.type_name()
                    ))),
                }
            }
            Function::Abs => {
                arity(1)?;
                match self.eval(&args[0])? {
                    TypedValue::Null => Ok(TypedValue::Null),
                    TypedValue::Int(i) => Ok(TypedValue::Int(i.abs())),
                    TypedValue::Double(d) => Ok(TypedValue::Double(d.abs())),
                    other => Err(QueryError::Runtime(format!(
                        "abs() expected a number, got {}",
                        other.type_name()
                    ))),
                }
            }
            Function::StartNode | Function::EndNode => {
                arity(1)?;
                match self.eval(&args[0])? {
                    TypedValue::Null => Ok(TypedValue::Null),
                    TypedValue::Edge(e) => {
                        let vertex =
                            if function == Function::StartNode { e.from()? } else { e.to()? };
                        Ok(TypedValue::Vertex(vertex))
                    }
                    other => Err(QueryError::Runtime(format!(
                        "{}() expected an Edge, got {}",
                        function.name(),
                        other.type_name()
                    ))),
                }
            }
        }
    }
}

/// Evaluates an expression in one call.
pub fn evaluate(
    expression: &Expression,
    frame: &Frame,
    parameters: &Parameters,
    dba: &DbAccessor,
    view: GraphView,
) -> QueryResult<TypedValue> {
    ExpressionEvaluator::new(frame, parameters, dba, view).eval(expression)
}

/// Evaluates a filter predicate: Null is treated as `false`, any
/// non-Boolean non-Null result is a runtime error.
pub fn evaluate_filter(
    expression: &Expression,
    frame: &Frame,
    parameters: &Parameters,
    dba: &DbAccessor,
    view: GraphView,
) -> QueryResult<bool> {
    match evaluate(expression, frame, parameters, dba, view)? {
        TypedValue::Null => Ok(false),
        TypedValue::Bool(b) => Ok(b),
        other => Err(QueryError::Runtime(format!(
            "filter expression must be a bool or null, got {}",
            other.type_name()
        ))),
    }
}

/// Evaluates an expression that must produce an Int (bounds, SKIP, LIMIT).
pub fn evaluate_int(
    expression: &Expression,
    frame: &Frame,
    parameters: &Parameters,
    dba: &DbAccessor,
    view: GraphView,
    what: &str,
) -> QueryResult<i64> {
    match evaluate(expression, frame, parameters, dba, view)? {
        TypedValue::Int(i) => Ok(i),
        other => {
            Err(QueryError::Runtime(format!("{what} must be an int, got {}", other.type_name())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{SymbolTable, SymbolType};
    use quiver_core::NameRegistry;
    use quiver_storage::{GraphStore, LocalOnlyRemote, TransactionEngine};
    use std::sync::Arc;

    fn test_dba() -> DbAccessor {
        let engine = Arc::new(TransactionEngine::new());
        let store = Arc::new(GraphStore::new(quiver_core::WorkerId::MASTER, Arc::clone(&engine)));
        let tx = engine.begin(None).unwrap();
        DbAccessor::new(
            store,
            engine,
            tx,
            Arc::new(LocalOnlyRemote),
            Arc::new(NameRegistry::new()),
        )
    }

    fn eval(expr: &Expression) -> QueryResult<TypedValue> {
        let dba = test_dba();
        let frame = Frame::new(0);
        let params = Parameters::new();
        evaluate(expr, &frame, &params, &dba, GraphView::Old)
    }

    #[test]
    fn literals_and_arithmetic() {
        let expr = Expression::int(1).add(Expression::int(2));
        assert_eq!(eval(&expr).unwrap(), TypedValue::Int(3));
    }

    #[test]
    fn three_valued_and() {
        let null = Expression::Literal(quiver_core::PropertyValue::Null);
        let t = Expression::Literal(quiver_core::PropertyValue::Bool(true));
        let f = Expression::Literal(quiver_core::PropertyValue::Bool(false));

        // false AND null = false, true AND null = null
        let expr = f.clone().binary(BinaryOp::And, null.clone());
        assert_eq!(eval(&expr).unwrap(), TypedValue::Bool(false));
        let expr = t.binary(BinaryOp::And, null);
        assert!(eval(&expr).unwrap().is_null());
    }

    #[test]
    fn comparison_with_null_is_null() {
        let expr = Expression::Literal(quiver_core::PropertyValue::Null)
            .binary(BinaryOp::Lt, Expression::int(1));
        assert!(eval(&expr).unwrap().is_null());
    }

    #[test]
    fn property_on_null_is_null() {
        let expr = Expression::Literal(quiver_core::PropertyValue::Null)
            .property(quiver_core::PropertyId::new(0), "p");
        assert!(eval(&expr).unwrap().is_null());
    }

    #[test]
    fn in_membership() {
        let list = Expression::ListLiteral(vec![
            Expression::int(1),
            Expression::int(2),
            Expression::int(3),
        ]);
        let expr = Expression::int(2).binary(BinaryOp::In, list.clone());
        assert_eq!(eval(&expr).unwrap(), TypedValue::Bool(true));
        let expr = Expression::int(9).binary(BinaryOp::In, list);
        assert_eq!(eval(&expr).unwrap(), TypedValue::Bool(false));
    }

    #[test]
    fn subscript_out_of_bounds_is_null() {
        let list = Expression::ListLiteral(vec![Expression::int(1)]);
        let expr = Expression::Subscript { base: Box::new(list), index: Box::new(Expression::int(5)) };
        assert!(eval(&expr).unwrap().is_null());
    }

    #[test]
    fn vertex_property_access_uses_view() {
        let dba = test_dba();
        let key = dba.registry().property("p").unwrap();
        let vertex = dba.insert_vertex().unwrap();
        vertex.set_property(key, quiver_core::PropertyValue::Int(7)).unwrap();

        let mut table = SymbolTable::new();
        let sym = table.create("n", SymbolType::Vertex, true);
        let mut frame = Frame::new(table.len());
        frame.set(&sym, TypedValue::Vertex(vertex));

        let params = Parameters::new();
        let expr = Expression::ident(sym).property(key, "p");

        let new = evaluate(&expr, &frame, &params, &dba, GraphView::New).unwrap();
        assert_eq!(new, TypedValue::Int(7));

        // After a command advance, a later write splits the views: OLD
        // keeps the pre-advance value, NEW sees the fresh one.
        dba.advance_command();
        for vertex in dba.vertices(quiver_storage::View::New).unwrap() {
            vertex.set_property(key, quiver_core::PropertyValue::Int(9)).unwrap();
        }
        let old = evaluate(&expr, &frame, &params, &dba, GraphView::Old).unwrap();
        assert_eq!(old, TypedValue::Int(7));
        let new = evaluate(&expr, &frame, &params, &dba, GraphView::New).unwrap();
        assert_eq!(new, TypedValue::Int(9));
    }

    #[test]
    fn filter_null_is_false() {
        let dba = test_dba();
        let frame = Frame::new(0);
        let params = Parameters::new();
        let null = Expression::Literal(quiver_core::PropertyValue::Null);
        assert!(!evaluate_filter(&null, &frame, &params, &dba, GraphView::Old).unwrap());

        let not_bool = Expression::int(1);
        assert!(evaluate_filter(&not_bool, &frame, &params, &dba, GraphView::Old).is_err());
    }
}
