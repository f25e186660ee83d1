//! Typed partition keys and coercion from loosely typed values.

use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::{DocstoreError, Result};

/// A partition-key value as the store understands it.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionKey {
    /// The item has no partition (container without a partition key)
    None,
    /// The item's partition-key property is null or missing
    Null,
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
}

impl PartitionKey {
    /// JSON array form sent to the store. `None` is an empty array.
    pub fn to_wire(&self) -> Value {
        match self {
            PartitionKey::None => Value::Array(Vec::new()),
            other => Value::Array(vec![other.to_json()]),
        }
    }

    /// The key as a single JSON value; `None` and `Null` are both null.
    pub fn to_json(&self) -> Value {
        match self {
            PartitionKey::None | PartitionKey::Null => Value::Null,
            PartitionKey::String(s) => Value::String(s.clone()),
            PartitionKey::Integer(i) => Value::from(*i),
            PartitionKey::Double(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            PartitionKey::Boolean(b) => Value::Bool(*b),
        }
    }

    /// Whether an item's partition-key JSON value belongs to this key.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (PartitionKey::None, _) => true,
            (PartitionKey::Null, None | Some(Value::Null)) => true,
            (PartitionKey::Integer(i), Some(Value::Number(n))) => match n.as_i64() {
                Some(stored) => stored == *i,
                None => n.is_f64() && n.as_f64() == Some(*i as f64),
            },
            (PartitionKey::Double(d), Some(Value::Number(n))) => n.as_f64() == Some(*d),
            (key, Some(value)) => key.to_json() == *value,
            _ => false,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

impl From<&str> for PartitionKey {
    fn from(v: &str) -> Self {
        PartitionKey::String(v.to_string())
    }
}

impl From<String> for PartitionKey {
    fn from(v: String) -> Self {
        PartitionKey::String(v)
    }
}

/// A loosely typed value to be coerced into a [`PartitionKey`].
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// No value supplied
    Absent,
    Str(String),
    Bool(bool),
    Integer(i64),
    Float(f64),
    Json(Value),
    /// Any other value, presented by its textual rendering
    Untyped(String),
}

impl KeyValue {
    /// Wrap an arbitrary displayable value for string-parse coercion.
    pub fn untyped(value: impl fmt::Display) -> Self {
        KeyValue::Untyped(value.to_string())
    }

    /// Coerce into a typed partition key.
    ///
    /// Native strings stay strings. Only untyped values go through the
    /// parse fallback: integer, then double, then boolean. Coercion never
    /// produces [`PartitionKey::None`].
    pub fn coerce(self) -> Result<PartitionKey> {
        match self {
            KeyValue::Absent => Ok(PartitionKey::Null),
            KeyValue::Str(s) => Ok(PartitionKey::String(s)),
            KeyValue::Bool(b) => Ok(PartitionKey::Boolean(b)),
            KeyValue::Integer(i) => Ok(PartitionKey::Integer(i)),
            KeyValue::Float(f) if f.is_finite() => Ok(PartitionKey::Double(f)),
            KeyValue::Float(f) => Err(DocstoreError::InvalidPartitionKeyValue(f.to_string())),
            KeyValue::Json(value) => coerce_json(value),
            KeyValue::Untyped(text) => parse_untyped(&text),
        }
    }
}

fn coerce_json(value: Value) -> Result<PartitionKey> {
    match value {
        Value::Null => Ok(PartitionKey::Null),
        Value::String(s) => Ok(PartitionKey::String(s)),
        Value::Bool(b) => Ok(PartitionKey::Boolean(b)),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(PartitionKey::Integer(i)),
            (None, Some(f)) => Ok(PartitionKey::Double(f)),
            (None, None) => Err(DocstoreError::InvalidPartitionKeyValue(n.to_string())),
        },
        other => Err(DocstoreError::InvalidPartitionKeyValue(other.to_string())),
    }
}

fn parse_untyped(text: &str) -> Result<PartitionKey> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(PartitionKey::Integer(i));
    }
    if let Ok(f) = text.parse::<f64>() {
        if f.is_finite() {
            return Ok(PartitionKey::Double(f));
        }
    }
    if text.eq_ignore_ascii_case("true") {
        return Ok(PartitionKey::Boolean(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return Ok(PartitionKey::Boolean(false));
    }
    Err(DocstoreError::InvalidPartitionKeyValue(text.to_string()))
}

impl TryFrom<KeyValue> for PartitionKey {
    type Error = DocstoreError;

    fn try_from(value: KeyValue) -> Result<Self> {
        value.coerce()
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Str(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Str(v)
    }
}

impl From<bool> for KeyValue {
    fn from(v: bool) -> Self {
        KeyValue::Bool(v)
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Integer(v)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        KeyValue::Integer(v.into())
    }
}

impl From<f64> for KeyValue {
    fn from(v: f64) -> Self {
        KeyValue::Float(v)
    }
}

impl From<Uuid> for KeyValue {
    fn from(v: Uuid) -> Self {
        KeyValue::Str(v.to_string())
    }
}

impl From<Value> for KeyValue {
    fn from(v: Value) -> Self {
        KeyValue::Json(v)
    }
}

impl<T: Into<KeyValue>> From<Option<T>> for KeyValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(KeyValue::Absent)
    }
}
