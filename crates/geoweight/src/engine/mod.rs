//! Scoring engine: value model, field classification, statistics, weight maps and the
//! parallel aggregator that rolls feature values up through the hierarchy.

pub mod aggregate;
pub mod attributes;
pub mod classify;
pub mod profile;
pub mod source;
pub mod stats;
pub mod value;
pub mod weights;

#[cfg(test)]
mod tests;

pub use aggregate::{
    aggregate_score, dataset_field_scores, field_score, DataQuality, FeatureBreakdown,
    FeatureScore, PlanError, PlannedCategory, PlannedDataset, ProcessingResult, ScoreAggregator,
    ScoreStatistics, ScoringPlan, DEFAULT_MIN_CHUNK_LEN,
};
pub use attributes::{AttributeMeta, AttributeWeightTable};
pub use classify::{
    classify_field, ClassificationDetails, FieldClassification, FieldType,
    DEFAULT_QUANTITATIVE_THRESHOLD,
};
pub use profile::{analyze_fields, profile_column, FieldProfile, FieldProfiles};
pub use source::{FeatureCollection, FeatureSourceError};
pub use stats::{summarize_numbers, summarize_quantitative, QuantitativeStats, Summary};
pub use value::{Feature, Value};
pub use weights::{
    validate_weights, AttributeWeightError, IndependentWeightMap, NormalizedWeightMap,
    WeightCheck, WeightSumError, WeightValidator, DEFAULT_WEIGHT_TOLERANCE, MAX_ATTRIBUTE_PERCENT,
};
