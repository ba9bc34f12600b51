//! Weight maps and the sum invariant that guards them.
//!
//! Two scales exist on purpose. Field, dataset and category weights are fractions that must
//! add up to 1.0 ([`NormalizedWeightMap`]). Attribute weights are per-value percentages with
//! no sum constraint ([`IndependentWeightMap`]); they are converted to fractions exactly once,
//! when an attribute table computes a contribution.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Allowed distance between a weight sum and its target.
pub const DEFAULT_WEIGHT_TOLERANCE: f64 = 0.01;

/// Upper bound of the attribute weight percentage scale.
pub const MAX_ATTRIBUTE_PERCENT: f64 = 100.0;

fn sanitize(weight: Option<f64>) -> f64 {
    weight.filter(|value| value.is_finite()).unwrap_or(0.0)
}

/// Result of summing a weight map against its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightCheck {
    pub sum: f64,
    pub target: f64,
    pub tolerance: f64,
}

impl WeightCheck {
    pub fn is_valid(&self) -> bool {
        (self.sum - self.target).abs() <= self.tolerance
    }

    pub fn into_result(self) -> Result<f64, WeightSumError> {
        if self.is_valid() {
            Ok(self.sum)
        } else {
            Err(WeightSumError {
                actual: self.sum,
                expected: self.target,
                tolerance: self.tolerance,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("weights should sum to {expected:.1}, currently sum to {actual:.3} (tolerance {tolerance})")]
pub struct WeightSumError {
    pub actual: f64,
    pub expected: f64,
    pub tolerance: f64,
}

/// Checks that a set of weights sums to 1.0 within tolerance; missing entries count as 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightValidator {
    tolerance: f64,
}

impl Default for WeightValidator {
    fn default() -> Self {
        Self::new(DEFAULT_WEIGHT_TOLERANCE)
    }
}

impl WeightValidator {
    pub const TARGET: f64 = 1.0;

    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance: tolerance.abs(),
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn check<I>(&self, weights: I) -> WeightCheck
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let sum = weights.into_iter().map(sanitize).sum();
        WeightCheck {
            sum,
            target: Self::TARGET,
            tolerance: self.tolerance,
        }
    }

    pub fn validate<I>(&self, weights: I) -> bool
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        self.check(weights).is_valid()
    }
}

/// `validate(weights, tolerance)` over an id → weight mapping.
pub fn validate_weights<K>(weights: &BTreeMap<K, Option<f64>>, tolerance: f64) -> bool {
    WeightValidator::new(tolerance).validate(weights.values().copied())
}

/// Fraction weights keyed by member id; the entries are expected to sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedWeightMap<K: Ord>(BTreeMap<K, f64>);

impl<K: Ord> Default for NormalizedWeightMap<K> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: Ord> NormalizedWeightMap<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<f64> {
        self.0.get(key).copied()
    }

    /// Weight of a member, reading absent members as 0.
    pub fn weight_of(&self, key: &K) -> f64 {
        self.get(key).unwrap_or(0.0)
    }

    pub fn insert(&mut self, key: K, weight: f64) -> Option<f64> {
        self.0.insert(key, sanitize(Some(weight)))
    }

    pub fn remove(&mut self, key: &K) -> Option<f64> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, f64)> {
        self.0.iter().map(|(key, weight)| (key, *weight))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn check(&self, validator: &WeightValidator) -> WeightCheck {
        validator.check(self.0.values().map(|weight| Some(*weight)))
    }

    /// Rescale every entry proportionally so the map sums to 1.0.
    ///
    /// A zero (or non-finite) sum leaves the map untouched. A map already normalized to within
    /// floating point rounding is left untouched too, which keeps repeated calls stable.
    pub fn normalize(&mut self) {
        let total = self.sum();
        if total == 0.0 || !total.is_finite() {
            return;
        }
        let rounding = 4.0 * f64::EPSILON * self.0.len() as f64;
        if (total - 1.0).abs() <= rounding {
            return;
        }
        for weight in self.0.values_mut() {
            *weight /= total;
        }
    }
}

impl<K: Ord> FromIterator<(K, f64)> for NormalizedWeightMap<K> {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, weight)| (key, sanitize(Some(weight))))
                .collect(),
        )
    }
}

impl<'de, K> Deserialize<'de> for NormalizedWeightMap<K>
where
    K: Deserialize<'de> + Ord,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<K, Option<f64>>::deserialize(deserializer)?;
        Ok(Self(
            raw.into_iter()
                .map(|(key, weight)| (key, sanitize(weight)))
                .collect(),
        ))
    }
}

/// Attribute weight was outside the 0–100 percentage scale.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("attribute weight for '{value}' must be between 0 and 100, got {weight}")]
pub struct AttributeWeightError {
    pub value: String,
    pub weight: f64,
}

/// Per-value percentage weights (0–100). Entries are independent; their sum is never checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IndependentWeightMap(BTreeMap<String, f64>);

impl IndependentWeightMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, value: impl Into<String>, percent: f64) -> Result<(), AttributeWeightError> {
        let value = value.into();
        if !percent.is_finite() || !(0.0..=MAX_ATTRIBUTE_PERCENT).contains(&percent) {
            return Err(AttributeWeightError {
                value,
                weight: percent,
            });
        }
        self.0.insert(value, percent);
        Ok(())
    }

    pub fn get(&self, value: &str) -> Option<f64> {
        self.0.get(value).copied()
    }

    /// Percentage converted to a 0–1 fraction.
    pub fn fraction(&self, value: &str) -> Option<f64> {
        self.get(value).map(|percent| percent / MAX_ATTRIBUTE_PERCENT)
    }

    pub fn remove(&mut self, value: &str) -> Option<f64> {
        self.0.remove(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(value, weight)| (value.as_str(), *weight))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries loaded from storage that fall outside the percentage scale.
    pub fn out_of_range(&self) -> Vec<AttributeWeightError> {
        self.0
            .iter()
            .filter(|(_, percent)| !(0.0..=MAX_ATTRIBUTE_PERCENT).contains(*percent))
            .map(|(value, percent)| AttributeWeightError {
                value: value.clone(),
                weight: *percent,
            })
            .collect()
    }
}

impl<'de> Deserialize<'de> for IndependentWeightMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Option<f64>>::deserialize(deserializer)?;
        Ok(Self(
            raw.into_iter()
                .map(|(value, weight)| (value, sanitize(weight)))
                .collect(),
        ))
    }
}
