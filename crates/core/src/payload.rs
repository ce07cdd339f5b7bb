//! Structured request payloads produced by the generating agents.
//!
//! The engine only cares about named fields and their numeric or textual
//! values; everything else is carried through opaquely.

use crate::error::PayloadError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object of named request fields (e.g. `discount_pct`, `planned_spend`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestPayload {
    fields: Map<String, Value>,
}

impl RequestPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an arbitrary JSON value. Anything but an object is malformed.
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            Value::Null => Err(PayloadError::malformed("<root>", "is null")),
            other => Err(PayloadError::malformed(
                "<root>",
                format!("must be a JSON object, got {}", json_kind(&other)),
            )),
        }
    }

    /// Builder-style field insertion.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Look up a field. Dotted paths descend into nested objects.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some_and(|v| !v.is_null())
    }

    /// Numeric value of a field.
    ///
    /// `Ok(None)` when the field is absent or null. Numbers and numeric
    /// strings are accepted; any other type is malformed.
    pub fn number(&self, path: &str) -> Result<Option<f64>, PayloadError> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| PayloadError::malformed(path, "is not representable as f64")),
            Some(Value::String(s)) => s
                .trim()
                .trim_end_matches('%')
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Some)
                .ok_or_else(|| PayloadError::malformed(path, format!("is not numeric: {s:?}"))),
            Some(other) => Err(PayloadError::malformed(
                path,
                format!("must be numeric, got {}", json_kind(other)),
            )),
        }
    }

    /// Field rendered as text (strings verbatim, other scalars via JSON).
    pub fn text(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl TryFrom<Value> for RequestPayload {
    type Error = PayloadError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
