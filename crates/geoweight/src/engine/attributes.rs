use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::value::Value;
use super::weights::{AttributeWeightError, IndependentWeightMap};

/// Free-text annotation a user attaches to one attribute value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMeta {
    #[serde(default)]
    pub meaning: String,
    #[serde(default)]
    pub importance: String,
}

/// Observed values of a qualitative field and the user's weight for each of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeWeightTable {
    #[serde(default)]
    pub unique_values: Vec<String>,
    #[serde(default)]
    pub value_counts: BTreeMap<String, usize>,
    #[serde(default)]
    pub attribute_weights: IndependentWeightMap,
    #[serde(default)]
    pub attribute_meta: BTreeMap<String, AttributeMeta>,
}

impl AttributeWeightTable {
    /// Count each distinct value in first-seen order; missing values are not counted.
    pub fn from_values(values: &[Value]) -> Self {
        let mut table = Self::default();
        for key in values.iter().filter_map(Value::attribute_key) {
            match table.value_counts.get_mut(&key) {
                Some(count) => *count += 1,
                None => {
                    table.unique_values.push(key.clone());
                    table.value_counts.insert(key, 1);
                }
            }
        }
        table
    }

    pub fn set_weight(
        &mut self,
        value: impl Into<String>,
        percent: f64,
    ) -> Result<(), AttributeWeightError> {
        self.attribute_weights.set(value, percent)
    }

    pub fn set_meta(&mut self, value: impl Into<String>, meta: AttributeMeta) {
        self.attribute_meta.insert(value.into(), meta);
    }

    /// Fractional contribution of a raw value, or `None` when the value has no weight entry.
    pub fn lookup(&self, value: &Value) -> Option<f64> {
        value
            .attribute_key()
            .and_then(|key| self.attribute_weights.fraction(&key))
    }

    /// `weight / 100` for a weighted value; unknown and missing values contribute 0.
    pub fn contribution(&self, value: &Value) -> f64 {
        self.lookup(value).unwrap_or(0.0)
    }

    /// The `limit` most frequent values, ties broken by first appearance.
    pub fn top_values(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut ranked: Vec<(&str, usize)> = self
            .unique_values
            .iter()
            .map(|value| {
                (
                    value.as_str(),
                    self.value_counts.get(value).copied().unwrap_or(0),
                )
            })
            .collect();
        ranked.sort_by(|left, right| right.1.cmp(&left.1));
        ranked.truncate(limit);
        ranked
    }
}
