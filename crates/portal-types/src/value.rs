//! Values that cross the bridge, either by value or by reference.

use crate::remote::{RemoteRef, RemoteResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Plain data that is copied across the connection.
///
/// Serialized untagged so that it maps one-to-one onto JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// The absent value.
    #[default]
    None,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Str(String),
    /// An ordered sequence.
    List(Vec<Value>),
    /// A string-keyed mapping.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// The integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The float payload; integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The string payload, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Truthiness: empty containers, zero, `None` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(l) => !l.is_empty(),
            Self::Map(m) => !m.is_empty(),
        }
    }

    /// Short name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "dict",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

/// Anything a remote operation can produce or consume: a plain value, or a
/// handle to an object that stays on the remote side.
#[derive(Clone)]
pub enum Object {
    /// Copied data.
    Value(Value),
    /// A reference to an object living in the other process.
    Remote(RemoteRef),
}

impl Object {
    /// The `None` object.
    pub fn none() -> Self {
        Self::Value(Value::None)
    }

    /// Whether this object is a cross-process handle rather than local data.
    pub fn is_remote_handle(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// The plain value, if this is not a remote handle.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Remote(_) => None,
        }
    }

    /// The remote handle, if any.
    pub fn as_remote(&self) -> Option<&RemoteRef> {
        match self {
            Self::Remote(r) => Some(r),
            Self::Value(_) => None,
        }
    }

    /// Shorthand for `as_value().and_then(Value::as_int)`.
    pub fn as_int(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_int)
    }

    /// Shorthand for `as_value().and_then(Value::as_str)`.
    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    /// Identity comparison: the same handle, or equal plain values.
    pub fn same_as(&self, other: &Object) -> bool {
        match (self, other) {
            (Self::Remote(a), Self::Remote(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
                    || a.object_id() == b.object_id()
            }
            (Self::Value(a), Self::Value(b)) => a == b,
            _ => false,
        }
    }

    /// Render like `str()`. Remote objects are asked for their string form.
    pub fn to_display(&self) -> RemoteResult<String> {
        match self {
            Self::Value(v) => Ok(v.to_string()),
            Self::Remote(r) => r.to_str(),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v:?}"),
            Self::Remote(r) => write!(f, "Remote(#{})", r.object_id()),
        }
    }
}

impl From<Value> for Object {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

macro_rules! object_from_plain {
    ($($t:ty),*) => {
        $(impl From<$t> for Object {
            fn from(v: $t) -> Self {
                Self::Value(Value::from(v))
            }
        })*
    };
}

object_from_plain!(bool, i64, f64, &str, String, Vec<Value>);

impl From<RemoteRef> for Object {
    fn from(r: RemoteRef) -> Self {
        Self::Remote(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_json_is_untagged() {
        let v = Value::List(vec![Value::Int(1), Value::Str("a".into()), Value::None]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"[1,"a",null]"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_float_and_int_stay_distinct() {
        let v: Value = serde_json::from_str("5").unwrap();
        assert_eq!(v, Value::Int(5));
        let v: Value = serde_json::from_str("5.5").unwrap();
        assert_eq!(v, Value::Float(5.5));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
    }

    #[test]
    fn test_display_matches_host_conventions() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1, 2]"
        );
    }

    #[test]
    fn test_plain_objects_are_not_handles() {
        let obj = Object::from(10i64);
        assert!(!obj.is_remote_handle());
        assert_eq!(obj.as_int(), Some(10));
        assert!(obj.same_as(&Object::from(10i64)));
        assert!(!obj.same_as(&Object::from("10")));
    }
}
