//! Values observed on the watched entity

use std::fmt;

use ha_core::{State, STATE_UNAVAILABLE, STATE_UNKNOWN};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("value is missing")]
    Missing,

    #[error("value is not a scalar: {0}")]
    NotScalar(String),
}

/// A scalar state or attribute value
///
/// Strings, numbers and booleans are accepted. The empty string marks an
/// unset value. Numbers compare by numeric value, so `3` equals `3.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct TrackedValue(Value);

impl PartialEq for TrackedValue {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => a == b,
            },
            (a, b) => a == b,
        }
    }
}

impl TrackedValue {
    pub fn unset() -> Self {
        Self(Value::String(String::new()))
    }

    pub fn from_json(value: Option<&Value>) -> Result<Self, ValueError> {
        match value {
            None | Some(Value::Null) => Err(ValueError::Missing),
            Some(v @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => Ok(Self(v.clone())),
            Some(other) => Err(ValueError::NotScalar(other.to_string())),
        }
    }

    /// Read the state value, or the named attribute, of an entity
    pub fn read(state: &State, attribute: Option<&str>) -> Result<Self, ValueError> {
        match attribute {
            Some(attribute) => Self::from_json(state.attributes.get(attribute)),
            None => Ok(Self::from(state.state.as_str())),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(&self.0, Value::String(s) if s.is_empty())
    }

    /// True for `unknown` and `unavailable`
    pub fn is_sentinel(&self) -> bool {
        matches!(&self.0, Value::String(s) if s == STATE_UNKNOWN || s == STATE_UNAVAILABLE)
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    /// Strings verbatim, everything else as its JSON text
    pub fn display(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl Default for TrackedValue {
    fn default() -> Self {
        Self::unset()
    }
}

impl fmt::Display for TrackedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<&str> for TrackedValue {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

impl From<String> for TrackedValue {
    fn from(value: String) -> Self {
        Self(Value::String(value))
    }
}

impl TryFrom<Value> for TrackedValue {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(Some(&value))
    }
}

impl From<TrackedValue> for Value {
    fn from(value: TrackedValue) -> Self {
        value.0
    }
}

/// Format a unit of measurement for appending to a value
pub fn unit_suffix(unit: Option<&str>) -> String {
    match unit {
        None => String::new(),
        Some("%") => "%".to_string(),
        Some(unit) => format!(" {}", unit),
    }
}
