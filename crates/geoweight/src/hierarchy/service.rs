use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    Category, CategoryId, ConfigurationError, Dataset, DatasetId, DatasetStatus, DatasetType,
    Mode, ModeId, ResultId, ValidationError, WeightedGroup,
};
use super::repository::{Entity, InMemoryRepository, Repository, RepositoryError};
use crate::engine::{
    analyze_fields, Feature, FeatureCollection, FieldProfiles, PlanError, ProcessingResult,
    ScoreAggregator, ScoringPlan, WeightValidator, DEFAULT_QUANTITATIVE_THRESHOLD,
};

/// Service composing the entity repositories, the weight validator and the aggregator.
pub struct HierarchyService {
    datasets: Arc<dyn Repository<Dataset>>,
    categories: Arc<dyn Repository<Category>>,
    modes: Arc<dyn Repository<Mode>>,
    results: Arc<dyn Repository<ProcessingResult>>,
    validator: WeightValidator,
    aggregator: ScoreAggregator,
    quantitative_threshold: f64,
}

/// Error raised by the hierarchy service.
#[derive(Debug, thiserror::Error)]
pub enum HierarchyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<PlanError> for HierarchyError {
    fn from(value: PlanError) -> Self {
        match value {
            PlanError::Validation(error) => Self::Validation(error),
            PlanError::Configuration(error) => Self::Configuration(error),
        }
    }
}

/// Validation outcome for one stored entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityReport {
    pub entity: &'static str,
    pub id: String,
    pub name: String,
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub orphaned_references: Vec<String>,
}

/// A membership id that no longer resolves to a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedReference {
    pub owner: &'static str,
    pub owner_id: String,
    pub missing: &'static str,
    pub missing_id: String,
}

/// Whole-hierarchy audit. Unused entities are informational and do not make it invalid.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HierarchyReport {
    pub is_valid: bool,
    pub datasets: Vec<String>,
    pub categories: Vec<String>,
    pub modes: Vec<String>,
    pub orphaned_references: Vec<OrphanedReference>,
    pub unused_datasets: Vec<DatasetId>,
    pub unused_categories: Vec<CategoryId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub total: usize,
    pub by_type: BTreeMap<&'static str, usize>,
    pub by_status: BTreeMap<&'static str, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub total: usize,
    pub avg_datasets_per_category: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeSummary {
    pub total: usize,
    pub by_use_case: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchySummary {
    pub datasets: DatasetSummary,
    pub categories: CategorySummary,
    pub modes: ModeSummary,
    pub processing_results: ResultSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryDetail {
    #[serde(flatten)]
    pub category: Category,
    pub dataset_details: Vec<Dataset>,
}

/// A mode with its categories and their datasets resolved. Dangling ids are skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeHierarchy {
    #[serde(flatten)]
    pub mode: Mode,
    pub category_details: Vec<CategoryDetail>,
}

impl HierarchyService {
    pub fn new(
        datasets: Arc<dyn Repository<Dataset>>,
        categories: Arc<dyn Repository<Category>>,
        modes: Arc<dyn Repository<Mode>>,
        results: Arc<dyn Repository<ProcessingResult>>,
    ) -> Self {
        Self {
            datasets,
            categories,
            modes,
            results,
            validator: WeightValidator::default(),
            aggregator: ScoreAggregator::default(),
            quantitative_threshold: DEFAULT_QUANTITATIVE_THRESHOLD,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryRepository::<Dataset>::new()),
            Arc::new(InMemoryRepository::<Category>::new()),
            Arc::new(InMemoryRepository::<Mode>::new()),
            Arc::new(InMemoryRepository::<ProcessingResult>::new()),
        )
    }

    pub fn with_validator(mut self, validator: WeightValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_aggregator(mut self, aggregator: ScoreAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_quantitative_threshold(mut self, threshold: f64) -> Self {
        self.quantitative_threshold = threshold;
        self
    }

    pub fn validator(&self) -> &WeightValidator {
        &self.validator
    }

    /// Profile every property of an uploaded feature collection.
    pub fn analyze_features(&self, collection: &FeatureCollection) -> FieldProfiles {
        analyze_fields(&collection.features, self.quantitative_threshold)
    }

    pub fn create_dataset(&self, mut dataset: Dataset) -> Result<Dataset, HierarchyError> {
        if dataset.id.is_blank() {
            dataset.id = DatasetId::generate();
        }
        self.ensure_valid(&dataset, Vec::new())?;
        ensure_scorable(&dataset)?;
        let stored = self.datasets.insert(dataset)?;
        info!(dataset = %stored.id, name = %stored.name, "dataset created");
        Ok(stored)
    }

    pub fn get_dataset(&self, id: &DatasetId) -> Result<Dataset, HierarchyError> {
        fetch_required(self.datasets.as_ref(), id)
    }

    pub fn list_datasets(&self) -> Result<Vec<Dataset>, HierarchyError> {
        Ok(self.datasets.list()?)
    }

    pub fn datasets_by_type(&self, dataset_type: DatasetType) -> Result<Vec<Dataset>, HierarchyError> {
        let mut datasets = self.list_datasets()?;
        datasets.retain(|dataset| dataset.dataset_type == dataset_type);
        Ok(datasets)
    }

    pub fn datasets_by_status(&self, status: DatasetStatus) -> Result<Vec<Dataset>, HierarchyError> {
        let mut datasets = self.list_datasets()?;
        datasets.retain(|dataset| dataset.status == status);
        Ok(datasets)
    }

    pub fn update_dataset(
        &self,
        id: &DatasetId,
        mut dataset: Dataset,
    ) -> Result<Dataset, HierarchyError> {
        let existing = self.get_dataset(id)?;
        dataset.id = existing.id;
        dataset.created_at = existing.created_at;
        dataset.updated_at = Utc::now();
        self.ensure_valid(&dataset, Vec::new())?;
        ensure_scorable(&dataset)?;
        let stored = self.datasets.update(dataset)?;
        info!(dataset = %stored.id, "dataset updated");
        Ok(stored)
    }

    /// Categories that still list the dataset keep the reference; validation reports it.
    pub fn delete_dataset(&self, id: &DatasetId) -> Result<Dataset, HierarchyError> {
        let removed = self.datasets.delete(id)?;
        info!(dataset = %removed.id, "dataset deleted");
        Ok(removed)
    }

    pub fn create_category(&self, mut category: Category) -> Result<Category, HierarchyError> {
        if category.id.is_blank() {
            category.id = CategoryId::generate();
        }
        let dangling = self.dangling_datasets(&category)?;
        self.ensure_valid(&category, dangling)?;
        let stored = self.categories.insert(category)?;
        info!(category = %stored.id, name = %stored.name, "category created");
        Ok(stored)
    }

    pub fn get_category(&self, id: &CategoryId) -> Result<Category, HierarchyError> {
        fetch_required(self.categories.as_ref(), id)
    }

    pub fn list_categories(&self) -> Result<Vec<Category>, HierarchyError> {
        Ok(self.categories.list()?)
    }

    pub fn update_category(
        &self,
        id: &CategoryId,
        mut category: Category,
    ) -> Result<Category, HierarchyError> {
        let existing = self.get_category(id)?;
        category.id = existing.id;
        category.created_at = existing.created_at;
        category.updated_at = Utc::now();
        let dangling = self.dangling_datasets(&category)?;
        self.ensure_valid(&category, dangling)?;
        let stored = self.categories.update(category)?;
        info!(category = %stored.id, "category updated");
        Ok(stored)
    }

    pub fn delete_category(&self, id: &CategoryId) -> Result<Category, HierarchyError> {
        let removed = self.categories.delete(id)?;
        info!(category = %removed.id, "category deleted");
        Ok(removed)
    }

    pub fn category_with_datasets(&self, id: &CategoryId) -> Result<CategoryDetail, HierarchyError> {
        let category = self.get_category(id)?;
        self.category_detail(category)
    }

    pub fn create_mode(&self, mut mode: Mode) -> Result<Mode, HierarchyError> {
        if mode.id.is_blank() {
            mode.id = ModeId::generate();
        }
        let dangling = self.dangling_categories(&mode)?;
        self.ensure_valid(&mode, dangling)?;
        let stored = self.modes.insert(mode)?;
        info!(mode = %stored.id, name = %stored.name, use_case = %stored.use_case, "mode created");
        Ok(stored)
    }

    pub fn get_mode(&self, id: &ModeId) -> Result<Mode, HierarchyError> {
        fetch_required(self.modes.as_ref(), id)
    }

    pub fn list_modes(&self) -> Result<Vec<Mode>, HierarchyError> {
        Ok(self.modes.list()?)
    }

    pub fn update_mode(&self, id: &ModeId, mut mode: Mode) -> Result<Mode, HierarchyError> {
        let existing = self.get_mode(id)?;
        mode.id = existing.id;
        mode.created_at = existing.created_at;
        mode.updated_at = Utc::now();
        let dangling = self.dangling_categories(&mode)?;
        self.ensure_valid(&mode, dangling)?;
        let stored = self.modes.update(mode)?;
        info!(mode = %stored.id, "mode updated");
        Ok(stored)
    }

    pub fn delete_mode(&self, id: &ModeId) -> Result<Mode, HierarchyError> {
        let removed = self.modes.delete(id)?;
        info!(mode = %removed.id, "mode deleted");
        Ok(removed)
    }

    pub fn modes_by_use_case(&self, use_case: &str) -> Result<Vec<Mode>, HierarchyError> {
        let wanted = use_case.trim().to_lowercase();
        let mut modes = self.list_modes()?;
        modes.retain(|mode| mode.use_case.trim().to_lowercase() == wanted);
        Ok(modes)
    }

    pub fn mode_hierarchy(&self, id: &ModeId) -> Result<ModeHierarchy, HierarchyError> {
        let mode = self.get_mode(id)?;
        let mut category_details = Vec::with_capacity(mode.categories.len());
        for category_id in &mode.categories {
            if let Some(category) = self.categories.fetch(category_id)? {
                category_details.push(self.category_detail(category)?);
            }
        }
        Ok(ModeHierarchy {
            mode,
            category_details,
        })
    }

    pub fn validate_category(&self, id: &CategoryId) -> Result<EntityReport, HierarchyError> {
        let category = self.get_category(id)?;
        let orphaned = self.dangling_datasets(&category)?;
        Ok(self.report(&category, category.id.as_str(), orphaned))
    }

    pub fn validate_mode(&self, id: &ModeId) -> Result<EntityReport, HierarchyError> {
        let mode = self.get_mode(id)?;
        let orphaned = self.dangling_categories(&mode)?;
        Ok(self.report(&mode, mode.id.as_str(), orphaned))
    }

    pub fn validate_hierarchy(&self) -> Result<HierarchyReport, HierarchyError> {
        let datasets = self.list_datasets()?;
        let categories = self.list_categories()?;
        let modes = self.list_modes()?;

        let mut report = HierarchyReport::default();
        for dataset in &datasets {
            report.datasets.extend(prefixed(dataset, dataset.id.as_str(), &self.validator));
        }
        for category in &categories {
            report
                .categories
                .extend(prefixed(category, category.id.as_str(), &self.validator));
        }
        for mode in &modes {
            report.modes.extend(prefixed(mode, mode.id.as_str(), &self.validator));
        }

        let dataset_ids: BTreeSet<&DatasetId> = datasets.iter().map(|dataset| &dataset.id).collect();
        let category_ids: BTreeSet<&CategoryId> =
            categories.iter().map(|category| &category.id).collect();

        let mut used_datasets = BTreeSet::new();
        for category in &categories {
            for dataset_id in &category.datasets {
                used_datasets.insert(dataset_id);
                if !dataset_ids.contains(dataset_id) {
                    report.orphaned_references.push(OrphanedReference {
                        owner: Category::KIND,
                        owner_id: category.id.to_string(),
                        missing: Dataset::KIND,
                        missing_id: dataset_id.to_string(),
                    });
                }
            }
        }

        let mut used_categories = BTreeSet::new();
        for mode in &modes {
            for category_id in &mode.categories {
                used_categories.insert(category_id);
                if !category_ids.contains(category_id) {
                    report.orphaned_references.push(OrphanedReference {
                        owner: Mode::KIND,
                        owner_id: mode.id.to_string(),
                        missing: Category::KIND,
                        missing_id: category_id.to_string(),
                    });
                }
            }
        }

        report.unused_datasets = dataset_ids
            .into_iter()
            .filter(|id| !used_datasets.contains(id))
            .cloned()
            .collect();
        report.unused_categories = category_ids
            .into_iter()
            .filter(|id| !used_categories.contains(id))
            .cloned()
            .collect();
        report.is_valid = report.datasets.is_empty()
            && report.categories.is_empty()
            && report.modes.is_empty()
            && report.orphaned_references.is_empty();

        if !report.is_valid {
            warn!(
                dataset_issues = report.datasets.len(),
                category_issues = report.categories.len(),
                mode_issues = report.modes.len(),
                orphaned = report.orphaned_references.len(),
                "hierarchy validation found problems"
            );
        }
        Ok(report)
    }

    pub fn summary(&self) -> Result<HierarchySummary, HierarchyError> {
        let datasets = self.list_datasets()?;
        let categories = self.list_categories()?;
        let modes = self.list_modes()?;
        let results = self.results.list()?;

        let by_type = DatasetType::ALL
            .iter()
            .map(|kind| {
                let count = datasets.iter().filter(|d| d.dataset_type == *kind).count();
                (kind.label(), count)
            })
            .collect();
        let by_status = DatasetStatus::ALL
            .iter()
            .map(|status| {
                let count = datasets.iter().filter(|d| d.status == *status).count();
                (status.label(), count)
            })
            .collect();

        let member_total: usize = categories.iter().map(|category| category.datasets.len()).sum();
        let avg_datasets_per_category = if categories.is_empty() {
            0.0
        } else {
            member_total as f64 / categories.len() as f64
        };

        let mut by_use_case = BTreeMap::new();
        for mode in &modes {
            *by_use_case.entry(mode.use_case.clone()).or_insert(0) += 1;
        }

        Ok(HierarchySummary {
            datasets: DatasetSummary {
                total: datasets.len(),
                by_type,
                by_status,
            },
            categories: CategorySummary {
                total: categories.len(),
                avg_datasets_per_category,
            },
            modes: ModeSummary {
                total: modes.len(),
                by_use_case,
            },
            processing_results: ResultSummary {
                total: results.len(),
            },
        })
    }

    /// Resolve the mode's weight tree, score every feature and store the result.
    pub fn process_mode(
        &self,
        id: &ModeId,
        features: &[Feature],
    ) -> Result<ProcessingResult, HierarchyError> {
        let mode = self.get_mode(id)?;

        let mut categories = Vec::with_capacity(mode.categories.len());
        for category_id in &mode.categories {
            if let Some(category) = self.categories.fetch(category_id)? {
                categories.push(category);
            }
        }

        let mut datasets: Vec<Dataset> = Vec::new();
        for category in &categories {
            for dataset_id in &category.datasets {
                if datasets.iter().any(|dataset| &dataset.id == dataset_id) {
                    continue;
                }
                if let Some(dataset) = self.datasets.fetch(dataset_id)? {
                    datasets.push(dataset);
                }
            }
        }

        let plan = ScoringPlan::resolve(&mode, &categories, &datasets, &self.validator)
            .inspect_err(|error| {
                warn!(mode = %mode.id, %error, "mode cannot be processed");
            })?;
        let result = self.aggregator.run(&plan, features);

        // Two runs of one mode within the same second share an id; the later one wins.
        let stored = match self.results.insert(result.clone()) {
            Err(RepositoryError::Conflict { .. }) => self.results.update(result)?,
            other => other?,
        };
        info!(result = %stored.id(), mode = %mode.id, "processing result stored");
        Ok(stored)
    }

    pub fn get_result(&self, id: &ResultId) -> Result<ProcessingResult, HierarchyError> {
        fetch_required(self.results.as_ref(), id)
    }

    pub fn list_results(&self) -> Result<Vec<ProcessingResult>, HierarchyError> {
        Ok(self.results.list()?)
    }

    pub fn results_for_mode(&self, id: &ModeId) -> Result<Vec<ProcessingResult>, HierarchyError> {
        let mut results = self.list_results()?;
        results.retain(|result| result.mode_id() == id);
        Ok(results)
    }

    pub fn delete_result(&self, id: &ResultId) -> Result<ProcessingResult, HierarchyError> {
        Ok(self.results.delete(id)?)
    }

    fn category_detail(&self, category: Category) -> Result<CategoryDetail, HierarchyError> {
        let mut dataset_details = Vec::with_capacity(category.datasets.len());
        for dataset_id in &category.datasets {
            if let Some(dataset) = self.datasets.fetch(dataset_id)? {
                dataset_details.push(dataset);
            }
        }
        Ok(CategoryDetail {
            category,
            dataset_details,
        })
    }

    fn dangling_datasets(&self, category: &Category) -> Result<Vec<String>, RepositoryError> {
        missing_ids(self.datasets.as_ref(), &category.datasets)
    }

    fn dangling_categories(&self, mode: &Mode) -> Result<Vec<String>, RepositoryError> {
        missing_ids(self.categories.as_ref(), &mode.categories)
    }

    fn ensure_valid<G>(&self, entity: &G, dangling: Vec<String>) -> Result<(), ValidationError>
    where
        G: WeightedGroup + Entity,
    {
        let mut issues = entity.validate_with(&self.validator);
        if !dangling.is_empty() {
            issues.push(format!(
                "Invalid {} IDs: {}",
                G::MEMBER_KIND.to_lowercase(),
                dangling.join(", ")
            ));
        }
        if issues.is_empty() {
            return Ok(());
        }

        let error = ValidationError::new(G::KIND, entity.id().to_string(), issues);
        warn!(entity = G::KIND, id = %error.id, issues = error.issues.len(), "rejected write");
        Err(error)
    }

    fn report<G: WeightedGroup>(&self, entity: &G, id: &str, orphaned: Vec<String>) -> EntityReport {
        let mut issues = entity.validate_with(&self.validator);
        issues.extend(
            orphaned
                .iter()
                .map(|missing| format!("Orphaned {} reference: {missing}", G::MEMBER_KIND.to_lowercase())),
        );
        EntityReport {
            entity: G::KIND,
            id: id.to_string(),
            name: entity.name().to_string(),
            is_valid: issues.is_empty(),
            issues,
            orphaned_references: orphaned,
        }
    }
}

/// A stored dataset must be scorable, so structural problems are rejected at write time.
fn ensure_scorable(dataset: &Dataset) -> Result<(), ConfigurationError> {
    dataset.check_scorable().inspect_err(|error| {
        warn!(
            entity = Dataset::KIND,
            id = %error.dataset,
            problems = error.problems.len(),
            "rejected write"
        );
    })
}

fn fetch_required<E: Entity>(
    repository: &dyn Repository<E>,
    id: &E::Id,
) -> Result<E, HierarchyError> {
    repository
        .fetch(id)?
        .ok_or_else(|| RepositoryError::not_found::<E>(id).into())
}

fn missing_ids<E: Entity>(
    repository: &dyn Repository<E>,
    ids: &[E::Id],
) -> Result<Vec<String>, RepositoryError> {
    let mut missing = Vec::new();
    for id in ids {
        if repository.fetch(id)?.is_none() {
            missing.push(id.to_string());
        }
    }
    Ok(missing)
}

fn prefixed<G: WeightedGroup>(entity: &G, id: &str, validator: &WeightValidator) -> Vec<String> {
    entity
        .validate_with(validator)
        .into_iter()
        .map(|issue| format!("{} {id}: {issue}", G::KIND))
        .collect()
}
