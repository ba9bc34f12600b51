use serde::{Deserialize, Serialize};

use super::value::Value;

/// Descriptive statistics for one quantitative field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantitativeStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub range: f64,
    pub count: usize,
}

impl QuantitativeStats {
    /// Min-max rescale into `[0, 1]`; a constant column carries no signal and yields 0.
    pub fn normalize(&self, value: f64) -> f64 {
        if self.max > self.min {
            ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Outcome of summarizing a column: empty input is a result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Summary {
    Stats(QuantitativeStats),
    NoData,
}

impl Summary {
    pub fn stats(&self) -> Option<&QuantitativeStats> {
        match self {
            Summary::Stats(stats) => Some(stats),
            Summary::NoData => None,
        }
    }
}

/// Summarize the numeric readings of a column, skipping missing and unparseable values.
pub fn summarize_quantitative(values: &[Value]) -> Summary {
    let numbers: Vec<f64> = values.iter().filter_map(Value::as_number).collect();
    summarize_numbers(&numbers)
}

pub fn summarize_numbers(numbers: &[f64]) -> Summary {
    let mut sorted: Vec<f64> = numbers
        .iter()
        .copied()
        .filter(|number| number.is_finite())
        .collect();
    if sorted.is_empty() {
        return Summary::NoData;
    }
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let min = sorted[0];
    let max = sorted[count - 1];
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 1 {
        sorted[count / 2]
    } else {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    };
    // sample standard deviation; a single observation has no spread
    let stddev = if count > 1 {
        let variance = sorted
            .iter()
            .map(|number| (number - mean).powi(2))
            .sum::<f64>()
            / (count - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    Summary::Stats(QuantitativeStats {
        min,
        max,
        mean,
        median,
        stddev,
        range: max - min,
        count,
    })
}
