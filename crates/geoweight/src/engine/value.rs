use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw property value as observed on a feature.
///
/// Decided once when a feature is parsed so classification, normalization and attribute
/// lookups can match exhaustively instead of re-inspecting JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, from = "serde_json::Value")]
pub enum Value {
    Number(f64),
    Text(String),
    Null,
}

impl Value {
    /// Null, empty and whitespace-only text are all treated as missing.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(text) => text.trim().is_empty(),
            Value::Number(_) => false,
        }
    }

    /// Finite numeric reading of the value, parsing text when needed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(number) if number.is_finite() => Some(*number),
            Value::Number(_) | Value::Null => None,
            Value::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|number| number.is_finite()),
        }
    }

    /// String coercion used as the key into attribute weight tables.
    pub fn attribute_key(&self) -> Option<String> {
        if self.is_missing() {
            return None;
        }
        match self {
            Value::Number(number) => Some(number.to_string()),
            Value::Text(text) => Some(text.trim().to_string()),
            Value::Null => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(number) => write!(f, "{number}"),
            Value::Text(text) => f.write_str(text),
            Value::Null => f.write_str("null"),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Number(number) => {
                number.as_f64().map(Value::Number).unwrap_or(Value::Null)
            }
            serde_json::Value::String(text) => Value::Text(text),
            serde_json::Value::Bool(flag) => Value::Text(flag.to_string()),
            other @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Value::Text(other.to_string())
            }
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// A single record handed to the engine. Geometry is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub geometry: serde_json::Value,
}

impl Feature {
    pub fn new(properties: BTreeMap<String, Value>) -> Self {
        Self {
            properties,
            geometry: serde_json::Value::Null,
        }
    }

    /// Missing keys read as [`Value::Null`].
    pub fn value(&self, field: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.properties.get(field).unwrap_or(&NULL)
    }
}

impl<K, V> FromIterator<(K, V)> for Feature
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Feature::new(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}
