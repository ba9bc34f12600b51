use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Add, AddAssign};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::classify::FieldType;
use super::stats::{summarize_numbers, Summary};
use super::value::Feature;
use super::weights::WeightValidator;
use crate::hierarchy::{
    Category, CategoryId, ConfigurationError, Dataset, DatasetId, Mode, ModeId, OutputSettings,
    ResultId, ValidationError, WeightedGroup,
};

/// Default floor on the number of features handed to one rayon task.
pub const DEFAULT_MIN_CHUNK_LEN: usize = 256;

/// Counts of values that could not contribute to a score.
///
/// These never abort a run; they are reported on the result and logged once per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQuality {
    pub missing_values: usize,
    pub unparseable_values: usize,
    pub unknown_attributes: usize,
    pub missing_stats: usize,
}

impl DataQuality {
    pub fn total(&self) -> usize {
        self.missing_values + self.unparseable_values + self.unknown_attributes + self.missing_stats
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

impl Add for DataQuality {
    type Output = DataQuality;

    fn add(mut self, other: DataQuality) -> DataQuality {
        self += other;
        self
    }
}

impl AddAssign for DataQuality {
    fn add_assign(&mut self, other: DataQuality) {
        self.missing_values += other.missing_values;
        self.unparseable_values += other.unparseable_values;
        self.unknown_attributes += other.unknown_attributes;
        self.missing_stats += other.missing_stats;
    }
}

/// Weighted contribution of one field of one feature.
pub fn field_score(
    dataset: &Dataset,
    field: &str,
    feature: &Feature,
    quality: &mut DataQuality,
) -> f64 {
    let weight = dataset.field_weights.weight_of(&field.to_string());
    let value = feature.value(field);
    if value.is_missing() {
        quality.missing_values += 1;
        return 0.0;
    }

    let contribution = match dataset.field_type(field) {
        Some(FieldType::Quantitative) => {
            let Some(number) = value.as_number() else {
                quality.unparseable_values += 1;
                return 0.0;
            };
            match dataset.field_stats.get(field).and_then(Summary::stats) {
                Some(stats) => stats.normalize(number),
                None => {
                    quality.missing_stats += 1;
                    return 0.0;
                }
            }
        }
        Some(FieldType::Qualitative) => {
            let looked_up = dataset
                .attribute_tables
                .get(field)
                .and_then(|table| table.lookup(value));
            match looked_up {
                Some(fraction) => fraction,
                None => {
                    quality.unknown_attributes += 1;
                    return 0.0;
                }
            }
        }
        None => return 0.0,
    };

    contribution * weight
}

/// Per-field scores of one dataset for one feature, keyed by field name.
pub fn dataset_field_scores(
    dataset: &Dataset,
    feature: &Feature,
    quality: &mut DataQuality,
) -> BTreeMap<String, f64> {
    dataset
        .selected_fields
        .iter()
        .map(|field| (field.clone(), field_score(dataset, field, feature, quality)))
        .collect()
}

/// Scores of a single feature through an optional single-branch path of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureScore {
    pub dataset_score: f64,
    pub category_score: Option<f64>,
    pub final_score: Option<f64>,
}

/// Score one feature against one dataset and, optionally, its category and mode.
///
/// The category only rolls up the given dataset, and the mode only that category; use a
/// [`ScoringPlan`] to score the full tree.
pub fn aggregate_score(
    feature: &Feature,
    dataset: &Dataset,
    category: Option<&Category>,
    mode: Option<&Mode>,
) -> FeatureScore {
    let mut quality = DataQuality::default();
    let dataset_score: f64 = dataset_field_scores(dataset, feature, &mut quality)
        .values()
        .sum();

    let category_score =
        category.map(|category| dataset_score * category.dataset_weights.weight_of(&dataset.id));
    let final_score = match (category, category_score, mode) {
        (Some(category), Some(score), Some(mode)) => {
            Some(score * mode.category_weights.weight_of(&category.id))
        }
        _ => None,
    };

    FeatureScore {
        dataset_score,
        category_score,
        final_score,
    }
}

/// Why a mode could not be turned into a scoring plan.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

#[derive(Debug, Clone)]
pub struct PlannedDataset {
    pub dataset: Dataset,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct PlannedCategory {
    pub category: Category,
    pub weight: f64,
    pub datasets: Vec<PlannedDataset>,
}

/// A validated, read-only weight tree for one mode.
#[derive(Debug, Clone)]
pub struct ScoringPlan {
    mode_id: ModeId,
    mode_name: String,
    output: OutputSettings,
    categories: Vec<PlannedCategory>,
}

impl ScoringPlan {
    /// Resolve every id the mode reaches and check each level before any feature is touched.
    ///
    /// Weight sums are checked with `validator`, the same one that gated the entities' writes.
    pub fn resolve(
        mode: &Mode,
        categories: &[Category],
        datasets: &[Dataset],
        validator: &WeightValidator,
    ) -> Result<Self, PlanError> {
        let category_index: BTreeMap<&CategoryId, &Category> =
            categories.iter().map(|category| (&category.id, category)).collect();
        let dataset_index: BTreeMap<&DatasetId, &Dataset> =
            datasets.iter().map(|dataset| (&dataset.id, dataset)).collect();

        let mut issues = mode.validate_with(validator);
        let missing: Vec<String> = mode
            .categories
            .iter()
            .filter(|id| !category_index.contains_key(id))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            issues.push(format!("Invalid category IDs: {}", missing.join(", ")));
        }
        if !issues.is_empty() {
            return Err(ValidationError::new(Mode::KIND, mode.id.as_str(), issues).into());
        }

        let mut planned = Vec::with_capacity(mode.categories.len());
        for category_id in &mode.categories {
            let Some(category) = category_index.get(category_id) else {
                continue;
            };

            let mut issues = category.validate_with(validator);
            let missing: Vec<String> = category
                .datasets
                .iter()
                .filter(|id| !dataset_index.contains_key(id))
                .map(ToString::to_string)
                .collect();
            if !missing.is_empty() {
                issues.push(format!("Invalid dataset IDs: {}", missing.join(", ")));
            }
            if !issues.is_empty() {
                return Err(
                    ValidationError::new(Category::KIND, category.id.as_str(), issues).into(),
                );
            }

            let mut members = Vec::with_capacity(category.datasets.len());
            for dataset_id in &category.datasets {
                let Some(dataset) = dataset_index.get(dataset_id) else {
                    continue;
                };
                let issues = dataset.validate_with(validator);
                if !issues.is_empty() {
                    return Err(
                        ValidationError::new(Dataset::KIND, dataset.id.as_str(), issues).into(),
                    );
                }
                dataset.check_scorable()?;
                members.push(PlannedDataset {
                    dataset: (*dataset).clone(),
                    weight: category.dataset_weights.weight_of(dataset_id),
                });
            }

            planned.push(PlannedCategory {
                category: (*category).clone(),
                weight: mode.category_weights.weight_of(category_id),
                datasets: members,
            });
        }

        Ok(Self {
            mode_id: mode.id.clone(),
            mode_name: mode.name.clone(),
            output: mode.output_settings,
            categories: planned,
        })
    }

    pub fn mode_id(&self) -> &ModeId {
        &self.mode_id
    }

    pub fn mode_name(&self) -> &str {
        &self.mode_name
    }

    pub fn output_settings(&self) -> OutputSettings {
        self.output
    }

    pub fn categories(&self) -> &[PlannedCategory] {
        &self.categories
    }

    /// Distinct datasets reachable from the mode, in first-seen order.
    pub fn datasets(&self) -> Vec<&Dataset> {
        let mut seen = BTreeSet::new();
        self.categories
            .iter()
            .flat_map(|category| category.datasets.iter())
            .filter(|planned| seen.insert(&planned.dataset.id))
            .map(|planned| &planned.dataset)
            .collect()
    }
}

/// Every intermediate score of one feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureBreakdown {
    pub field_scores: BTreeMap<DatasetId, BTreeMap<String, f64>>,
    pub dataset_scores: BTreeMap<DatasetId, f64>,
    pub category_scores: BTreeMap<CategoryId, f64>,
    pub final_score: f64,
    pub data_quality: DataQuality,
}

/// Distribution of final scores across a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreStatistics {
    pub scores: Summary,
}

/// Immutable record of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    id: ResultId,
    mode_id: ModeId,
    mode_name: String,
    total_features: usize,
    processing_time_ms: u64,
    dataset_scores: BTreeMap<DatasetId, BTreeMap<String, f64>>,
    category_scores: BTreeMap<CategoryId, f64>,
    final_scores: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    normalized_scores: Option<Vec<f64>>,
    score_statistics: ScoreStatistics,
    data_quality: DataQuality,
    processed_at: DateTime<Utc>,
}

impl ProcessingResult {
    pub fn id(&self) -> &ResultId {
        &self.id
    }

    pub fn mode_id(&self) -> &ModeId {
        &self.mode_id
    }

    pub fn mode_name(&self) -> &str {
        &self.mode_name
    }

    pub fn total_features(&self) -> usize {
        self.total_features
    }

    pub fn processing_time_ms(&self) -> u64 {
        self.processing_time_ms
    }

    pub fn dataset_scores(&self) -> &BTreeMap<DatasetId, BTreeMap<String, f64>> {
        &self.dataset_scores
    }

    pub fn category_scores(&self) -> &BTreeMap<CategoryId, f64> {
        &self.category_scores
    }

    pub fn final_scores(&self) -> &[f64] {
        &self.final_scores
    }

    pub fn normalized_scores(&self) -> Option<&[f64]> {
        self.normalized_scores.as_deref()
    }

    pub fn score_statistics(&self) -> &ScoreStatistics {
        &self.score_statistics
    }

    pub fn data_quality(&self) -> DataQuality {
        self.data_quality
    }

    pub fn processed_at(&self) -> DateTime<Utc> {
        self.processed_at
    }
}

/// Parallel evaluator of a [`ScoringPlan`] over a feature collection.
#[derive(Clone)]
pub struct ScoreAggregator {
    pool: Option<Arc<ThreadPool>>,
    min_chunk_len: usize,
}

impl Default for ScoreAggregator {
    fn default() -> Self {
        Self {
            pool: None,
            min_chunk_len: DEFAULT_MIN_CHUNK_LEN,
        }
    }
}

impl ScoreAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run on a dedicated pool instead of rayon's global one.
    pub fn with_threads(mut self, threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("geoweight-score-{index}"))
            .build()?;
        self.pool = Some(Arc::new(pool));
        Ok(self)
    }

    pub fn with_min_chunk_len(mut self, min_chunk_len: usize) -> Self {
        self.min_chunk_len = min_chunk_len.max(1);
        self
    }

    pub fn min_chunk_len(&self) -> usize {
        self.min_chunk_len
    }

    pub fn score_feature(&self, plan: &ScoringPlan, feature: &Feature) -> FeatureBreakdown {
        let mut breakdown = FeatureBreakdown::default();

        for planned in &plan.categories {
            let mut category_score = 0.0;
            for member in &planned.datasets {
                let dataset_id = &member.dataset.id;
                let dataset_score = match breakdown.dataset_scores.get(dataset_id) {
                    Some(score) => *score,
                    None => {
                        let fields = dataset_field_scores(
                            &member.dataset,
                            feature,
                            &mut breakdown.data_quality,
                        );
                        let score = fields.values().sum();
                        breakdown.field_scores.insert(dataset_id.clone(), fields);
                        breakdown.dataset_scores.insert(dataset_id.clone(), score);
                        score
                    }
                };
                category_score += dataset_score * member.weight;
            }
            breakdown
                .category_scores
                .insert(planned.category.id.clone(), category_score);
            breakdown.final_score += category_score * planned.weight;
        }

        breakdown
    }

    /// Score every feature and fold the breakdowns into one result.
    ///
    /// Output order of `final_scores` matches input order regardless of scheduling.
    pub fn run(&self, plan: &ScoringPlan, features: &[Feature]) -> ProcessingResult {
        let started = Instant::now();
        let breakdowns = self.score_all(plan, features);

        let mut quality = DataQuality::default();
        let mut field_totals: BTreeMap<DatasetId, BTreeMap<String, f64>> = BTreeMap::new();
        let mut category_totals: BTreeMap<CategoryId, f64> = BTreeMap::new();
        let mut final_scores = Vec::with_capacity(breakdowns.len());

        for breakdown in breakdowns {
            quality += breakdown.data_quality;
            for (dataset_id, fields) in breakdown.field_scores {
                let totals = field_totals.entry(dataset_id).or_default();
                for (field, score) in fields {
                    *totals.entry(field).or_insert(0.0) += score;
                }
            }
            for (category_id, score) in breakdown.category_scores {
                *category_totals.entry(category_id).or_insert(0.0) += score;
            }
            final_scores.push(breakdown.final_score);
        }

        let count = features.len().max(1) as f64;
        let output = plan.output;
        let dataset_scores = if output.include_individual_scores {
            field_totals
                .into_iter()
                .map(|(dataset_id, fields)| {
                    let means = fields
                        .into_iter()
                        .map(|(field, total)| (field, total / count))
                        .collect();
                    (dataset_id, means)
                })
                .collect()
        } else {
            BTreeMap::new()
        };
        let category_scores = if output.include_category_scores {
            category_totals
                .into_iter()
                .map(|(category_id, total)| (category_id, total / count))
                .collect()
        } else {
            BTreeMap::new()
        };

        let score_statistics = ScoreStatistics {
            scores: summarize_numbers(&final_scores),
        };
        let normalized_scores = output
            .normalize_final_score
            .then(|| min_max_rescale(&final_scores));
        if !output.include_final_score {
            final_scores.clear();
        }

        if !quality.is_clean() {
            warn!(
                mode = %plan.mode_id,
                missing = quality.missing_values,
                unparseable = quality.unparseable_values,
                unknown_attributes = quality.unknown_attributes,
                missing_stats = quality.missing_stats,
                "values skipped while scoring"
            );
        }

        let processed_at = Utc::now();
        let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            mode = %plan.mode_id,
            features = features.len(),
            elapsed_ms = processing_time_ms,
            "scoring run complete"
        );

        ProcessingResult {
            id: ResultId::for_run(&plan.mode_id, processed_at),
            mode_id: plan.mode_id.clone(),
            mode_name: plan.mode_name.clone(),
            total_features: features.len(),
            processing_time_ms,
            dataset_scores,
            category_scores,
            final_scores,
            normalized_scores,
            score_statistics,
            data_quality: quality,
            processed_at,
        }
    }

    fn score_all(&self, plan: &ScoringPlan, features: &[Feature]) -> Vec<FeatureBreakdown> {
        let score = || -> Vec<FeatureBreakdown> {
            features
                .par_iter()
                .with_min_len(self.min_chunk_len)
                .map(|feature| self.score_feature(plan, feature))
                .collect()
        };
        match &self.pool {
            Some(pool) => pool.install(score),
            None => score(),
        }
    }
}

/// Rescale into `[0, 1]` by the observed range; a constant vector maps to zeros.
fn min_max_rescale(scores: &[f64]) -> Vec<f64> {
    let Summary::Stats(stats) = summarize_numbers(scores) else {
        return Vec::new();
    };
    scores.iter().map(|score| stats.normalize(*score)).collect()
}
