// Dynamically typed values as exposed by the simulator feed.
// Invariants: conversions never panic; non-finite numbers are treated as unreadable.

use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Bitfield(u32),
    Double(f64),
    Float(f32),
    Text(String),
    Array(Vec<Value>),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Value::Bool(value) => f64::from(u8::from(*value)),
            Value::Int(value) => f64::from(*value),
            Value::Bitfield(value) => f64::from(*value),
            Value::Float(value) => f64::from(*value),
            Value::Double(value) => *value,
            Value::Text(value) => value.trim().parse().ok()?,
            Value::Array(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(value) => Some(i64::from(*value)),
            Value::Int(value) => Some(i64::from(*value)),
            Value::Bitfield(value) => Some(i64::from(*value)),
            Value::Float(value) => truncate(f64::from(*value)),
            Value::Double(value) => truncate(*value),
            Value::Text(value) => value.trim().parse().ok(),
            Value::Array(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Text(value) => match value.trim() {
                "true" | "True" => Some(true),
                "false" | "False" => Some(false),
                other => other.parse::<i64>().ok().map(|value| value != 0),
            },
            Value::Array(_) => None,
            other => other.as_f64().map(|value| value != 0.0),
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

fn truncate(value: f64) -> Option<i64> {
    if value.is_finite() && value.abs() < i64::MAX as f64 {
        Some(value.trunc() as i64)
    } else {
        None
    }
}

/// Typed extraction used by the field reader.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64().map(|value| value as f32)
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|value| i32::try_from(value).ok())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}
