use std::path::PathBuf;

use clap::Args;
use geoweight::config::AppConfig;
use geoweight::engine::{analyze_fields, FeatureCollection};
use geoweight::error::AppError;
use tracing::info;

use crate::infra::{parse_threshold, ScoreBundle};

#[derive(Args, Debug)]
pub(crate) struct AnalyzeArgs {
    /// GeoJSON (.geojson/.json) or CSV file to profile
    pub(crate) path: PathBuf,
    /// Share of numeric values needed to call a field quantitative
    #[arg(long, value_parser = parse_threshold)]
    pub(crate) threshold: Option<f64>,
}

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// JSON bundle with `datasets`, `categories` and a single `mode`
    #[arg(long)]
    pub(crate) config: PathBuf,
    /// GeoJSON or CSV file holding the features to score
    #[arg(long)]
    pub(crate) features: PathBuf,
    /// Write the processing result here instead of stdout
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) fn run_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let threshold = args
        .threshold
        .unwrap_or(config.engine.quantitative_threshold);

    let collection = FeatureCollection::from_path(&args.path)?;
    let profiles = analyze_fields(&collection.features, threshold);
    println!("{}", serde_json::to_string_pretty(&profiles)?);
    Ok(())
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let bundle = ScoreBundle::from_path(&args.config)?;
    let collection = FeatureCollection::from_path(&args.features)?;

    let result = bundle.score(&collection.features, &config.engine)?;
    let rendered = serde_json::to_string_pretty(&result)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, rendered)?;
            info!(result = %result.id(), path = %path.display(), "processing result written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
