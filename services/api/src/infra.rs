use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use geoweight::config::EngineConfig;
use geoweight::engine::{Feature, ProcessingResult, ScoringPlan};
use geoweight::error::AppError;
use geoweight::hierarchy::{
    Category, Dataset, HierarchyError, HierarchyService, JsonFileRepository, Mode,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn parse_threshold(raw: &str) -> Result<f64, String> {
    let threshold: f64 = raw
        .trim()
        .parse()
        .map_err(|err| format!("failed to parse '{raw}' as a number ({err})"))?;
    if (0.0..1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(format!("threshold {threshold} must be in [0, 1)"))
    }
}

/// Service whose four collections live as JSON files under `data_dir`.
pub(crate) fn file_backed_service(
    data_dir: &Path,
    engine: &EngineConfig,
) -> Result<HierarchyService, AppError> {
    let service = HierarchyService::new(
        Arc::new(JsonFileRepository::<Dataset>::open(data_dir)?),
        Arc::new(JsonFileRepository::<Category>::open(data_dir)?),
        Arc::new(JsonFileRepository::<Mode>::open(data_dir)?),
        Arc::new(JsonFileRepository::<ProcessingResult>::open(data_dir)?),
    );
    Ok(service
        .with_validator(engine.validator())
        .with_aggregator(engine.aggregator()?)
        .with_quantitative_threshold(engine.quantitative_threshold))
}

/// A self-contained weight tree for one-off scoring without a data directory.
#[derive(Debug, Deserialize)]
pub(crate) struct ScoreBundle {
    #[serde(default)]
    pub(crate) datasets: Vec<Dataset>,
    #[serde(default)]
    pub(crate) categories: Vec<Category>,
    pub(crate) mode: Mode,
}

impl ScoreBundle {
    pub(crate) fn from_path(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub(crate) fn score(
        &self,
        features: &[Feature],
        engine: &EngineConfig,
    ) -> Result<ProcessingResult, AppError> {
        let plan = ScoringPlan::resolve(
            &self.mode,
            &self.categories,
            &self.datasets,
            &engine.validator(),
        )
        .map_err(HierarchyError::from)?;
        Ok(engine.aggregator()?.run(&plan, features))
    }
}
