use clap::Args;
use geoweight::engine::{Feature, FeatureCollection, ProcessingResult, Value};
use geoweight::error::AppError;
use geoweight::hierarchy::{
    Category, ConfigurationError, Dataset, HierarchyError, HierarchyService, Mode, WeightedGroup,
};

const LAND_COVER: [(&str, f64); 4] = [
    ("grassland", 100.0),
    ("cropland", 70.0),
    ("forest", 40.0),
    ("wetland", 0.0),
];

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of synthetic sites to generate
    #[arg(long, default_value_t = 12)]
    pub(crate) sites: usize,
    /// How many of the best-scoring sites to list
    #[arg(long, default_value_t = 5)]
    pub(crate) top: usize,
    /// Print the full processing result as JSON instead of the ranking
    #[arg(long)]
    pub(crate) json: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            sites: 12,
            top: 5,
            json: false,
        }
    }
}

/// Deterministic candidate sites with an elevation, a land cover class and a road distance.
pub(crate) fn synthetic_sites(count: usize) -> Vec<Feature> {
    (0..count)
        .map(|index| {
            let (cover, _) = LAND_COVER[index % LAND_COVER.len()];
            [
                ("site", Value::from(format!("S-{:02}", index + 1))),
                ("elevation", Value::from(((index * 37) % 400) as f64 + 100.0)),
                ("land_cover", Value::from(cover)),
                ("road_distance_m", Value::from(((index * 13) % 50) as f64 * 100.0)),
            ]
            .into_iter()
            .collect()
        })
        .collect()
}

/// Store the sample hierarchy in memory and process its mode over `features`.
pub(crate) fn demo_result(features: &[Feature]) -> Result<ProcessingResult, AppError> {
    let service = HierarchyService::in_memory();
    let profiles = service.analyze_features(&FeatureCollection::new(features.to_vec()));

    let mut terrain = Dataset::from_profile("Terrain", &profiles, &["elevation", "land_cover"])
        .map_err(HierarchyError::from)?;
    terrain.add_member("elevation".to_string(), 0.4);
    terrain.add_member("land_cover".to_string(), 0.6);
    for (cover, percent) in LAND_COVER {
        terrain
            .set_attribute_weight("land_cover", cover, percent)
            .map_err(|err| {
                HierarchyError::from(ConfigurationError {
                    dataset: terrain.id.clone(),
                    problems: vec![err.to_string()],
                })
            })?;
    }
    let terrain = service.create_dataset(terrain)?;

    let access = Dataset::from_profile("Road access", &profiles, &["road_distance_m"])
        .map_err(HierarchyError::from)?;
    let access = service.create_dataset(access)?;

    let mut physical = Category::new("Physical suitability");
    physical.add_member(terrain.id.clone(), 1.0);
    let physical = service.create_category(physical)?;

    let mut logistics = Category::new("Logistics");
    logistics.add_member(access.id.clone(), 1.0);
    let logistics = service.create_category(logistics)?;

    let mut mode = Mode::new("Field depot siting", "logistics");
    mode.add_member(physical.id.clone(), 0.7);
    mode.add_member(logistics.id.clone(), 0.3);
    let mode = service.create_mode(mode)?;

    Ok(service.process_mode(&mode.id, features)?)
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let features = synthetic_sites(args.sites);
    let result = demo_result(&features)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Weighted site suitability demo");
    println!(
        "Mode '{}' scored {} sites in {} ms",
        result.mode_name(),
        result.total_features(),
        result.processing_time_ms()
    );

    let mut ranking: Vec<(usize, f64)> = result.final_scores().iter().copied().enumerate().collect();
    ranking.sort_by(|a, b| b.1.total_cmp(&a.1));

    println!("\nTop {} sites", args.top.min(ranking.len()));
    for (index, score) in ranking.into_iter().take(args.top) {
        let feature = &features[index];
        let normalized = result
            .normalized_scores()
            .and_then(|scores| scores.get(index))
            .copied()
            .unwrap_or(score);
        println!(
            "- {} | {} | elevation {} | road {} m | score {:.3} (normalized {:.3})",
            feature.value("site"),
            feature.value("land_cover"),
            feature.value("elevation"),
            feature.value("road_distance_m"),
            score,
            normalized
        );
    }

    let quality = result.data_quality();
    if quality.is_clean() {
        println!("\nData quality: clean");
    } else {
        println!(
            "\nData quality: {} missing, {} unparseable, {} unknown attributes",
            quality.missing_values, quality.unparseable_values, quality.unknown_attributes
        );
    }
    Ok(())
}
