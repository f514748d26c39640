//! Built-in converters.

use super::{Converter, Value};
use crate::context::EvaluationContext;
use crate::event::Rewrite;

/// Error returned when a value cannot be converted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot convert [{value}] to {target}")]
pub struct ConversionError {
    /// Rendered input value
    pub value: String,
    /// Name of the target type
    pub target: &'static str,
}

impl ConversionError {
    pub fn new(value: &Value, target: &'static str) -> Self {
        Self {
            value: super::value_to_string(value),
            target,
        }
    }
}

/// Converts to a JSON integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerConverter;

impl Converter for IntegerConverter {
    fn convert(
        &self,
        _event: &dyn Rewrite,
        _context: &EvaluationContext,
        value: Value,
    ) -> Result<Value, ConversionError> {
        match value {
            Value::Number(ref n) if n.is_i64() || n.is_u64() => Ok(value),
            Value::String(ref s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| ConversionError::new(&value, "integer")),
            other => Err(ConversionError::new(&other, "integer")),
        }
    }
}

/// Converts to a JSON floating point number.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalConverter;

impl Converter for DecimalConverter {
    fn convert(
        &self,
        _event: &dyn Rewrite,
        _context: &EvaluationContext,
        value: Value,
    ) -> Result<Value, ConversionError> {
        let parsed = match value {
            Value::Number(ref n) => n.as_f64(),
            Value::String(ref s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| ConversionError::new(&value, "decimal"))
    }
}

/// Converts `true`/`false`/`yes`/`no`/`on`/`off`/`1`/`0` to a JSON boolean.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanConverter;

impl Converter for BooleanConverter {
    fn convert(
        &self,
        _event: &dyn Rewrite,
        _context: &EvaluationContext,
        value: Value,
    ) -> Result<Value, ConversionError> {
        match value {
            Value::Bool(_) => Ok(value),
            Value::String(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(ConversionError::new(&value, "boolean")),
            },
            other => Err(ConversionError::new(&other, "boolean")),
        }
    }
}
