//! The runtime value sum.
//!
//! [`TypedValue`] extends the storable [`PropertyValue`] kinds with graph
//! entities: vertex and edge accessors and paths. A value of an entity
//! kind references the transaction it was produced under and must not be
//! dereferenced outside it.
//!
//! Two notions of equality coexist and must not be confused:
//!
//! - **Strict structural equality** (`PartialEq`/`Hash`): type and value
//!   must match exactly (`Int(1)` ≠ `Double(1.0)`, doubles compare by
//!   bits). This is what Distinct and aggregation keys use.
//! - **Cypher comparison** ([`TypedValue::cypher_eq`] and friends):
//!   promotes Int↔Double, propagates Null, and is what the expression
//!   evaluator exposes to queries.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use quiver_core::PropertyValue;
use quiver_storage::{EdgeAccessor, VertexAccessor};

use crate::error::{QueryError, QueryResult};

/// A graph path: alternating vertices and edges.
///
/// The path always has one more vertex than edges. Expansion does not
/// require the edge to be "forward": appending an edge together with the
/// vertex it leads to models both orientations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    vertices: Vec<VertexAccessor>,
    edges: Vec<EdgeAccessor>,
}

impl Path {
    /// Starts a path at a vertex.
    #[must_use]
    pub fn new(start: VertexAccessor) -> Self {
        Self { vertices: vec![start], edges: Vec::new() }
    }

    /// Appends an edge and the vertex it leads to.
    pub fn expand(&mut self, edge: EdgeAccessor, vertex: VertexAccessor) {
        self.edges.push(edge);
        self.vertices.push(vertex);
    }

    /// The vertices, in order.
    #[must_use]
    pub fn vertices(&self) -> &[VertexAccessor] {
        &self.vertices
    }

    /// The edges, in order.
    #[must_use]
    pub fn edges(&self) -> &[EdgeAccessor] {
        &self.edges
    }

    /// Path length = number of edges.
    #[must_use]
    pub fn size(&self) -> usize {
        self.edges.len()
    }

    /// The last vertex.
    #[must_use]
    pub fn last_vertex(&self) -> &VertexAccessor {
        self.vertices.last().expect("a path always has at least one vertex")
    }
}

/// A dynamically typed runtime value.
#[derive(Debug, Clone)]
pub enum TypedValue {
    /// Null/missing value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point number.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list of values.
    List(Vec<TypedValue>),
    /// String-keyed map of values.
    Map(BTreeMap<String, TypedValue>),
    /// A vertex, bound to its transaction.
    Vertex(VertexAccessor),
    /// An edge, bound to its transaction.
    Edge(EdgeAccessor),
    /// A path, bound to its transaction.
    Path(Path),
}

impl TypedValue {
    /// Returns `true` if the value is null.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` for Int and Double.
    #[inline]
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Double(_))
    }

    /// Returns the value as a boolean if it is one.
    #[inline]
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an integer if it is one.
    #[inline]
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the numeric value widened to a double, if numeric.
    #[inline]
    #[must_use]
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the value as a string slice if it is one.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a list slice if it is one.
    #[inline]
    #[must_use]
    pub fn as_list(&self) -> Option<&[TypedValue]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the vertex accessor if the value is a vertex.
    #[inline]
    #[must_use]
    pub const fn as_vertex(&self) -> Option<&VertexAccessor> {
        match self {
            Self::Vertex(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the edge accessor if the value is an edge.
    #[inline]
    #[must_use]
    pub const fn as_edge(&self) -> Option<&EdgeAccessor> {
        match self {
            Self::Edge(e) => Some(e),
            _ => None,
        }
    }

    /// The name of this value's type, for error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Int",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::List(_) => "List",
            Self::Map(_) => "Map",
            Self::Vertex(_) => "Vertex",
            Self::Edge(_) => "Edge",
            Self::Path(_) => "Path",
        }
    }

    /// Lifts a storable property value into the runtime sum.
    #[must_use]
    pub fn from_property(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Null => Self::Null,
            PropertyValue::Bool(b) => Self::Bool(b),
            PropertyValue::Int(i) => Self::Int(i),
            PropertyValue::Double(d) => Self::Double(d),
            PropertyValue::String(s) => Self::String(s),
            PropertyValue::List(l) => {
                Self::List(l.into_iter().map(Self::from_property).collect())
            }
            PropertyValue::Map(m) => {
                Self::Map(m.into_iter().map(|(k, v)| (k, Self::from_property(v))).collect())
            }
        }
    }

    /// Lowers the value back into the storable sum.
    ///
    /// Entities and paths are not storable and fail with a runtime error,
    /// matching the "cannot be used as a property value" contract.
    pub fn to_property(&self) -> QueryResult<PropertyValue> {
        match self {
            Self::Null => Ok(PropertyValue::Null),
            Self::Bool(b) => Ok(PropertyValue::Bool(*b)),
            Self::Int(i) => Ok(PropertyValue::Int(*i)),
            Self::Double(d) => Ok(PropertyValue::Double(*d)),
            Self::String(s) => Ok(PropertyValue::String(s.clone())),
            Self::List(l) => Ok(PropertyValue::List(
                l.iter().map(Self::to_property).collect::<QueryResult<_>>()?,
            )),
            Self::Map(m) => Ok(PropertyValue::Map(
                m.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_property()?)))
                    .collect::<QueryResult<_>>()?,
            )),
            Self::Vertex(_) | Self::Edge(_) | Self::Path(_) => Err(QueryError::Runtime(format!(
                "'{}' cannot be used as a property value",
                self.type_name()
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Cypher semantics
    // ------------------------------------------------------------------

    /// Cypher equality: Null-propagating, Int↔Double promoting.
    ///
    /// Values of different kinds (after numeric promotion) compare as
    /// `false`, never as an error.
    #[must_use]
    pub fn cypher_eq(&self, other: &Self) -> Self {
        if self.is_null() || other.is_null() {
            return Self::Null;
        }
        if let (Some(a), Some(b)) = (self.as_numeric(), other.as_numeric()) {
            // Compare exactly when both are ints; through doubles otherwise.
            return match (self, other) {
                (Self::Int(x), Self::Int(y)) => Self::Bool(x == y),
                _ => Self::Bool(a == b),
            };
        }
        let result = match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| x.cypher_eq(y) == Self::Bool(true))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|((ka, va), (kb, vb))| {
                        ka == kb && va.cypher_eq(vb) == Self::Bool(true)
                    })
            }
            (Self::Vertex(a), Self::Vertex(b)) => a == b,
            (Self::Edge(a), Self::Edge(b)) => a == b,
            (Self::Path(a), Self::Path(b)) => a == b,
            _ => false,
        };
        Self::Bool(result)
    }

    /// Cypher ordering comparison for `<`, `<=`, `>`, `>=`.
    ///
    /// Returns `None` when either side is Null. Only Int/Double/String are
    /// comparable; anything else is a runtime error.
    pub fn cypher_cmp(&self, other: &Self) -> QueryResult<Option<std::cmp::Ordering>> {
        if self.is_null() || other.is_null() {
            return Ok(None);
        }
        if let (Some(a), Some(b)) = (self.as_numeric(), other.as_numeric()) {
            return Ok(a.partial_cmp(&b));
        }
        match (self, other) {
            (Self::String(a), Self::String(b)) => Ok(Some(a.cmp(b))),
            _ => Err(QueryError::Runtime(format!(
                "can't compare value of type {} to value of type {}",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    /// The ORDER BY comparison: Null sorts after all non-nulls, Bool is
    /// ordered, Int↔Double promote; other kinds are not orderable.
    pub fn order_cmp(&self, other: &Self) -> QueryResult<std::cmp::Ordering> {
        use std::cmp::Ordering;
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ok(Ordering::Equal),
            (true, false) => return Ok(Ordering::Greater),
            (false, true) => return Ok(Ordering::Less),
            (false, false) => {}
        }
        if let (Some(a), Some(b)) = (self.as_numeric(), other.as_numeric()) {
            return Ok(a.total_cmp(&b));
        }
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Ok(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Ok(a.cmp(b)),
            _ => Err(QueryError::Runtime(format!(
                "comparison is not defined for values of type {} and {}",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    fn arithmetic_error(&self, op: &str, other: &Self) -> QueryError {
        QueryError::Runtime(format!(
            "invalid types for '{op}': {} and {}",
            self.type_name(),
            other.type_name()
        ))
    }

    /// Cypher `+`: numeric addition, string and list concatenation.
    pub fn add(&self, other: &Self) -> QueryResult<Self> {
        if self.is_null() || other.is_null() {
            return Ok(Self::Null);
        }
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_add(*b)
                .map(Self::Int)
                .ok_or_else(|| QueryError::Runtime("integer overflow in '+'".into())),
            (Self::String(a), Self::String(b)) => Ok(Self::String(format!("{a}{b}"))),
            (Self::List(a), Self::List(b)) => {
                let mut list = a.clone();
                list.extend(b.iter().cloned());
                Ok(Self::List(list))
            }
            _ => match (self.as_numeric(), other.as_numeric()) {
                (Some(a), Some(b)) => Ok(Self::Double(a + b)),
                _ => Err(self.arithmetic_error("+", other)),
            },
        }
    }

    /// Cypher `-`.
    pub fn subtract(&self, other: &Self) -> QueryResult<Self> {
        self.numeric_op(other, "-", i64::checked_sub, |a, b| a - b)
    }

    /// Cypher `*`.
    pub fn multiply(&self, other: &Self) -> QueryResult<Self> {
        self.numeric_op(other, "*", i64::checked_mul, |a, b| a * b)
    }

    /// Cypher `/`; integer division by zero is a runtime error.
    pub fn divide(&self, other: &Self) -> QueryResult<Self> {
        if let (Self::Int(_), Self::Int(0)) = (self, other) {
            return Err(QueryError::Runtime("division by zero".into()));
        }
        self.numeric_op(other, "/", i64::checked_div, |a, b| a / b)
    }

    /// Cypher `%`; modulo by zero is a runtime error.
    pub fn modulo(&self, other: &Self) -> QueryResult<Self> {
        if let (Self::Int(_), Self::Int(0)) = (self, other) {
            return Err(QueryError::Runtime("modulo by zero".into()));
        }
        self.numeric_op(other, "%", i64::checked_rem, |a, b| a % b)
    }

    fn numeric_op(
        &self,
        other: &Self,
        op: &str,
        int_op: impl Fn(i64, i64) -> Option<i64>,
        double_op: impl Fn(f64, f64) -> f64,
    ) -> QueryResult<Self> {
        if self.is_null() || other.is_null() {
            return Ok(Self::Null);
        }
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => int_op(*a, *b)
                .map(Self::Int)
                .ok_or_else(|| QueryError::Runtime(format!("integer overflow in '{op}'"))),
            _ => match (self.as_numeric(), other.as_numeric()) {
                (Some(a), Some(b)) => Ok(Self::Double(double_op(a, b))),
                _ => Err(self.arithmetic_error(op, other)),
            },
        }
    }

    /// Cypher unary minus.
    pub fn negate(&self) -> QueryResult<Self> {
        match self {
            Self::Null => Ok(Self::Null),
            Self::Int(i) => Ok(Self::Int(-i)),
            Self::Double(d) => Ok(Self::Double(-d)),
            _ => Err(QueryError::Runtime(format!("cannot negate a {}", self.type_name()))),
        }
    }
}

impl PartialEq for TypedValue {
    /// Strict structural equality; see the module docs.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Vertex(a), Self::Vertex(b)) => a == b,
            (Self::Edge(a), Self::Edge(b)) => a == b,
            (Self::Path(a), Self::Path(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TypedValue {}

impl Hash for TypedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Double(d) => d.to_bits().hash(state),
            Self::String(s) => s.hash(state),
            Self::List(l) => l.hash(state),
            Self::Map(m) => m.hash(state),
            Self::Vertex(v) => v.hash(state),
            Self::Edge(e) => e.hash(state),
            Self::Path(p) => {
                for v in p.vertices() {
                    v.hash(state);
                }
                for e in p.edges() {
                    e.hash(state);
                }
            }
        }
    }
}

impl From<bool> for TypedValue {
    #[inline]
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for TypedValue {
    #[inline]
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for TypedValue {
    #[inline]
    fn from(f: f64) -> Self {
        Self::Double(f)
    }
}

impl From<&str> for TypedValue {
    #[inline]
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for TypedValue {
    #[inline]
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<TypedValue>> for TypedValue {
    #[inline]
    fn from(l: Vec<TypedValue>) -> Self {
        Self::List(l)
    }
}

/// Query-time parameter bindings, keyed by stripped-token position.
///
/// Both stripped literals and user `$parameters` end up here; expressions
/// reference them by token position.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    values: BTreeMap<usize, PropertyValue>,
}

impl Parameters {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a value at a token position.
    pub fn add(&mut self, token_position: usize, value: PropertyValue) {
        self.values.insert(token_position, value);
    }

    /// Looks up the value at a token position.
    pub fn at_position(&self, token_position: usize) -> QueryResult<&PropertyValue> {
        self.values
            .get(&token_position)
            .ok_or_else(|| QueryError::Semantic(format!("no parameter at position {token_position}")))
    }

    /// The number of bound positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no parameters are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(position, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&usize, &PropertyValue)> {
        self.values.iter()
    }
}
