//! Property values stored on vertices and edges.
//!
//! [`PropertyValue`] is the storable value sum: what can live in a property
//! map and travel in wire messages. The query layer wraps it into its own
//! runtime value type that additionally carries graph entities.
//!
//! # Example
//!
//! ```
//! use quiver_core::PropertyValue;
//!
//! let name: PropertyValue = "Alice".into();
//! let age: PropertyValue = 30i64.into();
//!
//! assert_eq!(name.as_str(), Some("Alice"));
//! assert_eq!(age.as_int(), Some(30));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A value that can be stored as a property on a vertex or edge.
///
/// # Supported Types
///
/// | Variant  | Rust Type | Use Case |
/// |----------|-----------|----------|
/// | `Null`   | -         | Missing/optional values |
/// | `Bool`   | `bool`    | Boolean flags |
/// | `Int`    | `i64`     | Integers, counters, timestamps |
/// | `Double` | `f64`     | Numeric measurements |
/// | `String` | `String`  | Text data |
/// | `List`   | `Vec<PropertyValue>` | Ordered collections |
/// | `Map`    | `BTreeMap<String, PropertyValue>` | Nested documents |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Null/missing value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point number
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list of values
    List(Vec<PropertyValue>),
    /// String-keyed map of values
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Returns `true` if the value is null.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
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

    /// Returns the value as a double if it is one.
    #[inline]
    #[must_use]
    pub const fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(f) => Some(*f),
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
    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the value as a map reference if it is one.
    #[inline]
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, PropertyValue>> {
        match self {
            Self::Map(m) => Some(m),
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
        }
    }
}

impl From<bool> for PropertyValue {
    #[inline]
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    #[inline]
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for PropertyValue {
    #[inline]
    fn from(f: f64) -> Self {
        Self::Double(f)
    }
}

impl From<String> for PropertyValue {
    #[inline]
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for PropertyValue {
    #[inline]
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    #[inline]
    fn from(v: Vec<PropertyValue>) -> Self {
        Self::List(v)
    }
}

impl From<BTreeMap<String, PropertyValue>> for PropertyValue {
    #[inline]
    fn from(m: BTreeMap<String, PropertyValue>) -> Self {
        Self::Map(m)
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Self::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_checks() {
        assert!(PropertyValue::Null.is_null());
        assert!(!PropertyValue::Bool(true).is_null());
    }

    #[test]
    fn value_conversions() {
        assert_eq!(PropertyValue::from(true).as_bool(), Some(true));
        assert_eq!(PropertyValue::from(42i64).as_int(), Some(42));
        assert_eq!(PropertyValue::from(2.5f64).as_double(), Some(2.5));
        assert_eq!(PropertyValue::from("hello").as_str(), Some("hello"));
    }

    #[test]
    fn value_type_names() {
        assert_eq!(PropertyValue::Null.type_name(), "Null");
        assert_eq!(PropertyValue::List(vec![]).type_name(), "List");
    }

    #[test]
    fn value_display() {
        let list = PropertyValue::List(vec![1i64.into(), "a".into()]);
        assert_eq!(list.to_string(), "[1, \"a\"]");
    }

    #[test]
    fn value_serde_roundtrip() {
        let mut map = BTreeMap::new();
        map.insert("k".to_owned(), PropertyValue::Int(1));
        let value = PropertyValue::List(vec![PropertyValue::Map(map), PropertyValue::Null]);
        let json = serde_json::to_string(&value).unwrap();
        let back: PropertyValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    // JSON has no NaN/infinity, so doubles come from exact integers.
    fn scalar_value() -> impl Strategy<Value = PropertyValue> {
        prop_oneof![
            Just(PropertyValue::Null),
            any::<bool>().prop_map(PropertyValue::Bool),
            any::<i64>().prop_map(PropertyValue::Int),
            any::<i32>().prop_map(|i| PropertyValue::Double(f64::from(i))),
            "[a-zA-Z0-9 ]{0,24}".prop_map(PropertyValue::String),
        ]
    }

    fn value() -> impl Strategy<Value = PropertyValue> {
        scalar_value().prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(PropertyValue::List),
                proptest::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(PropertyValue::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn serde_roundtrips_any_value(value in value()) {
            let json = serde_json::to_string(&value).unwrap();
            let back: PropertyValue = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, value);
        }
    }
}
