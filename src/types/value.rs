//! Telemetry channel values and typed extraction

use serde::{Deserialize, Serialize};

use crate::{RelayError, Result};

/// Runtime value of a single named telemetry channel.
///
/// Deserializes untagged so scripted frames can be written as plain YAML
/// scalars (`Lap: 3`, `Speed: 41.2`, `IsOnTrack: true`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Float64(f64),
    Array(Vec<Value>),
}

impl Value {
    /// Name of the variant, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::Int32(_) => "Int32",
            Value::Float64(_) => "Float64",
            Value::Array(_) => "Array",
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

/// Trait for types that can be extracted from a telemetry [`Value`].
pub trait FromValue: Sized {
    /// Convert the channel value into this type.
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &str, value: &Value) -> RelayError {
    RelayError::TypeConversion {
        details: format!("Expected {}, got {}", expected, value.type_name()),
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Int32(v) => Ok(*v),
            other => Err(mismatch("Int32", other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float64(v) => Ok(*v),
            Value::Int32(v) => Ok(f64::from(*v)),
            other => Err(mismatch("Float64", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            // irsdk_bool channels are sometimes surfaced as 0/1 integers
            Value::Int32(v) => Ok(*v != 0),
            other => Err(mismatch("Bool", other)),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            other => Err(mismatch("Array", other)),
        }
    }
}
