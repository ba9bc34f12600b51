use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::Value;

/// Unique-to-total ratio above which a fully numeric column counts as quantitative.
pub const DEFAULT_QUANTITATIVE_THRESHOLD: f64 = 0.2;

/// Predicted kind of a dataset field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Quantitative,
    Qualitative,
}

impl FieldType {
    pub const fn label(self) -> &'static str {
        match self {
            FieldType::Quantitative => "quantitative",
            FieldType::Qualitative => "qualitative",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationDetails {
    pub unique_count: usize,
    pub total_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldClassification {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub details: ClassificationDetails,
}

/// Predict whether a column is quantitative or qualitative.
///
/// Every non-missing value must parse as a finite number for the column to be considered
/// quantitative at all. A numeric column still reads as qualitative when it has few distinct
/// values relative to its length (coded categories such as NAICS or mine type ids). The
/// total used for the ratio includes missing values.
pub fn classify_field(values: &[Value], threshold: f64) -> FieldClassification {
    let total_count = values.len();
    if total_count == 0 {
        return FieldClassification {
            field_type: FieldType::Qualitative,
            details: ClassificationDetails {
                unique_count: 0,
                total_count,
            },
        };
    }

    let mut distinct_numbers = HashSet::new();
    for value in values.iter().filter(|value| !value.is_missing()) {
        match value.as_number() {
            // fold -0.0 into 0.0 so the bit patterns compare equal
            Some(number) => {
                distinct_numbers.insert((number + 0.0).to_bits());
            }
            None => return qualitative(values),
        }
    }

    let ratio = distinct_numbers.len() as f64 / total_count as f64;
    if ratio > threshold {
        FieldClassification {
            field_type: FieldType::Quantitative,
            details: ClassificationDetails {
                unique_count: distinct_numbers.len(),
                total_count,
            },
        }
    } else {
        qualitative(values)
    }
}

fn qualitative(values: &[Value]) -> FieldClassification {
    #[derive(PartialEq, Eq, Hash)]
    enum RawKey<'a> {
        Number(u64),
        Text(&'a str),
        Null,
    }

    let unique_count = values
        .iter()
        .map(|value| match value {
            Value::Number(number) => RawKey::Number(number.to_bits()),
            Value::Text(text) => RawKey::Text(text.as_str()),
            Value::Null => RawKey::Null,
        })
        .collect::<HashSet<_>>()
        .len();

    FieldClassification {
        field_type: FieldType::Qualitative,
        details: ClassificationDetails {
            unique_count,
            total_count: values.len(),
        },
    }
}
