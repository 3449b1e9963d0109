//! Expression trees and their evaluator.
//!
//! Expressions arrive from the planner with identifiers already resolved
//! to symbols and names interned to ids. They are plain data (serde-able,
//! so dispatched sub-plans can carry them); evaluation happens in
//! [`evaluator`].

pub mod evaluator;

use std::collections::BTreeMap;

use quiver_core::{LabelId, PropertyId, PropertyValue};
use serde::{Deserialize, Serialize};

use crate::symbols::Symbol;

pub use evaluator::{evaluate, evaluate_filter, evaluate_int, ExpressionEvaluator, GraphView};

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Three-valued logical NOT.
    Not,
    /// Numeric negation.
    Minus,
    /// Numeric identity.
    Plus,
    /// `IS NULL`.
    IsNull,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Three-valued AND.
    And,
    /// Three-valued OR.
    Or,
    /// Three-valued XOR.
    Xor,
    /// Addition / concatenation.
    Add,
    /// Subtraction.
    Subtract,
    /// Multiplication.
    Multiply,
    /// Division.
    Divide,
    /// Modulo.
    Modulo,
    /// Cypher equality.
    Eq,
    /// Cypher inequality.
    Ne,
    /// Less-than.
    Lt,
    /// Less-or-equal.
    Le,
    /// Greater-than.
    Gt,
    /// Greater-or-equal.
    Ge,
    /// List membership.
    In,
}

/// Built-in scalar functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Function {
    /// Collection size; also accepts strings.
    Size,
    /// Path or list length (number of edges / elements).
    Length,
    /// First non-null argument.
    Coalesce,
    /// Labels of a vertex, as strings.
    Labels,
    /// Type name of an edge.
    Type,
    /// Property map of a vertex or edge.
    Properties,
    /// Internal id of a vertex or edge.
    Id,
    /// Absolute numeric value.
    Abs,
    /// First vertex of an edge.
    StartNode,
    /// Last vertex of an edge.
    EndNode,
}

impl Function {
    /// The Cypher-facing function name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Length => "length",
            Self::Coalesce => "coalesce",
            Self::Labels => "labels",
            Self::Type => "type",
            Self::Properties => "properties",
            Self::Id => "id",
            Self::Abs => "abs",
            Self::StartNode => "startNode",
            Self::EndNode => "endNode",
        }
    }
}

/// An expression tree over a frame, parameters and an accessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// A literal value (only survives stripping in non-cacheable spots).
    Literal(PropertyValue),
    /// A parameter resolved by stripped-token position.
    Parameter {
        /// The token position key.
        token_position: usize,
    },
    /// An identifier resolved to a frame symbol.
    Identifier(Symbol),
    /// `base.key` property lookup.
    Property {
        /// The looked-up object.
        base: Box<Expression>,
        /// The interned property key.
        key: PropertyId,
        /// The source-level key name, used for map lookups.
        name: String,
    },
    /// `base:Label1:Label2` label test.
    HasLabel {
        /// The tested object.
        base: Box<Expression>,
        /// All labels must be present.
        labels: Vec<LabelId>,
    },
    /// A unary operation.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        expr: Box<Expression>,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// `[a, b, c]`.
    ListLiteral(Vec<Expression>),
    /// `{k: v, ...}`.
    MapLiteral(BTreeMap<String, Expression>),
    /// `base[index]` on lists and maps.
    Subscript {
        /// The indexed collection.
        base: Box<Expression>,
        /// The index or key.
        index: Box<Expression>,
    },
    /// A built-in function call.
    FunctionCall {
        /// The function.
        function: Function,
        /// Arguments, arity-checked at evaluation.
        args: Vec<Expression>,
    },
}

impl Expression {
    /// A literal integer, handy in tests and plan builders.
    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::Literal(PropertyValue::Int(value))
    }

    /// A literal string.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(PropertyValue::String(value.into()))
    }

    /// An identifier expression.
    #[must_use]
    pub fn ident(symbol: Symbol) -> Self {
        Self::Identifier(symbol)
    }

    /// A property lookup on this expression.
    #[must_use]
    pub fn property(self, key: PropertyId, name: impl Into<String>) -> Self {
        Self::Property { base: Box::new(self), key, name: name.into() }
    }

    /// A binary operation on this expression.
    #[must_use]
    pub fn binary(self, op: BinaryOp, right: Expression) -> Self {
        Self::Binary { op, left: Box::new(self), right: Box::new(right) }
    }

    /// Cypher equality with another expression.
    #[must_use]
    pub fn eq(self, right: Expression) -> Self {
        self.binary(BinaryOp::Eq, right)
    }

    /// Addition with another expression.
    #[must_use]
    pub fn add(self, right: Expression) -> Self {
        self.binary(BinaryOp::Add, right)
    }
}
