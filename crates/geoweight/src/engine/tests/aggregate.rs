use super::common::*;
use crate::engine::{
    aggregate_score, DataQuality, PlanError, ScoreAggregator, ScoringPlan, Summary, Value,
    WeightValidator,
};
use crate::hierarchy::{CategoryId, Dataset, DatasetId, WeightedGroup};

fn plan() -> ScoringPlan {
    ScoringPlan::resolve(
        &siting_mode(),
        &[hazard_category()],
        &[risk_dataset(), depth_dataset()],
        &WeightValidator::default(),
    )
    .expect("fixture hierarchy resolves")
}

#[test]
fn mixed_field_dataset_scores_one_half() {
    let score = aggregate_score(&reference_feature(), &risk_dataset(), None, None);
    assert_close(score.dataset_score, 0.5);
    assert_eq!(score.category_score, None);
    assert_eq!(score.final_score, None);
}

#[test]
fn category_rolls_up_weighted_dataset_scores() {
    let breakdown = ScoreAggregator::new().score_feature(&plan(), &reference_feature());

    assert_close(breakdown.dataset_scores[&DatasetId::from("ds-risk")], 0.5);
    assert_close(breakdown.dataset_scores[&DatasetId::from("ds-depth")], 0.9);
    assert_close(breakdown.category_scores[&CategoryId::from("cat-hazard")], 0.62);
    assert_close(breakdown.final_score, 0.62);
    assert!(breakdown.data_quality.is_clean());
}

#[test]
fn single_branch_path_applies_category_and_mode_weights() {
    let category = hazard_category();
    let mode = siting_mode();
    let score = aggregate_score(
        &reference_feature(),
        &risk_dataset(),
        Some(&category),
        Some(&mode),
    );
    assert_close(score.category_score.expect("category score"), 0.35);
    assert_close(score.final_score.expect("final score"), 0.35);
}

#[test]
fn missing_and_unknown_values_contribute_zero_and_are_counted() {
    let feature = feature(&[
        ("risk", Value::from("  ")),
        ("type", Value::from("Z")),
        ("depth", Value::from("deep")),
    ]);
    let breakdown = ScoreAggregator::new().score_feature(&plan(), &feature);

    assert_close(breakdown.final_score, 0.0);
    assert_eq!(
        breakdown.data_quality,
        DataQuality {
            missing_values: 1,
            unparseable_values: 1,
            unknown_attributes: 1,
            missing_stats: 0,
        }
    );
}

#[test]
fn quantitative_fields_without_stats_are_reported() {
    let mut dataset = depth_dataset();
    dataset.set_quantitative_field("depth", Summary::NoData, 1.0);
    let score = aggregate_score(&reference_feature(), &dataset, None, None);
    assert_close(score.dataset_score, 0.0);
}

#[test]
fn scores_are_not_clamped() {
    let mut dataset = risk_dataset();
    dataset.field_weights.insert("risk".to_string(), 1.5);
    let score = aggregate_score(&reference_feature(), &dataset, None, None);
    assert_close(score.dataset_score, 0.95);
}

#[test]
fn run_preserves_feature_order_across_threads() {
    let features: Vec<_> = (0..=1_000)
        .map(|step| {
            feature(&[
                ("risk", Value::Number(step as f64 % 11.0)),
                ("type", Value::from("Y")),
                ("depth", Value::Number(0.0)),
            ])
        })
        .collect();
    let aggregator = ScoreAggregator::new()
        .with_threads(4)
        .expect("pool builds")
        .with_min_chunk_len(16);

    let result = aggregator.run(&plan(), &features);

    assert_eq!(result.total_features(), features.len());
    assert_eq!(result.final_scores().len(), features.len());
    for (index, score) in result.final_scores().iter().enumerate() {
        let expected = (index as f64 % 11.0) / 10.0 * 0.6 * 0.7;
        assert_close(*score, expected);
    }
    assert_eq!(result.data_quality().unknown_attributes, features.len());
}

#[test]
fn run_reports_means_statistics_and_normalized_copy() {
    let features = vec![
        reference_feature(),
        feature(&[
            ("risk", Value::Number(10.0)),
            ("type", Value::from("X")),
            ("depth", Value::Number(10.0)),
        ]),
    ];
    let result = ScoreAggregator::new().run(&plan(), &features);

    assert_eq!(result.id().as_str(), format!("mode-siting_{}", result.processed_at().timestamp()));
    assert_eq!(result.mode_name(), "Site selection");
    let risk_fields = &result.dataset_scores()[&DatasetId::from("ds-risk")];
    assert_close(risk_fields["risk"], (0.3 + 0.6) / 2.0);
    assert_close(risk_fields["type"], 0.2);
    assert_close(result.category_scores()[&CategoryId::from("cat-hazard")], (0.62 + 0.86) / 2.0);

    let stats = result.score_statistics().scores.stats().expect("scores summarized");
    assert_close(stats.min, 0.62);
    assert_close(stats.max, 0.86);

    let normalized = result.normalized_scores().expect("normalized by default");
    assert_eq!(normalized, &[0.0, 1.0]);
    assert_close(result.final_scores()[0], 0.62);
}

#[test]
fn output_settings_trim_result_sections() {
    let mut mode = siting_mode();
    mode.output_settings.include_individual_scores = false;
    mode.output_settings.include_category_scores = false;
    mode.output_settings.normalize_final_score = false;
    let plan = ScoringPlan::resolve(
        &mode,
        &[hazard_category()],
        &[risk_dataset(), depth_dataset()],
        &WeightValidator::default(),
    )
    .expect("plan resolves");

    let result = ScoreAggregator::new().run(&plan, &[reference_feature()]);
    assert!(result.dataset_scores().is_empty());
    assert!(result.category_scores().is_empty());
    assert!(result.normalized_scores().is_none());
    assert_eq!(result.final_scores().len(), 1);
}

#[test]
fn resolve_lists_dangling_references() {
    let error = ScoringPlan::resolve(
        &siting_mode(),
        &[hazard_category()],
        &[risk_dataset()],
        &WeightValidator::default(),
    )
    .expect_err("depth dataset is missing");
    match error {
        PlanError::Validation(error) => {
            assert_eq!(error.entity, "Category");
            assert_eq!(error.id, "cat-hazard");
            assert!(error
                .issues
                .iter()
                .any(|issue| issue.contains("ds-depth")));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn resolve_rejects_unscorable_datasets() {
    let mut broken = depth_dataset();
    broken.field_types.clear();
    let error = ScoringPlan::resolve(
        &siting_mode(),
        &[hazard_category()],
        &[risk_dataset(), broken],
        &WeightValidator::default(),
    )
    .expect_err("depth has no field type");
    assert!(matches!(error, PlanError::Configuration(ref config) if config.dataset.as_str() == "ds-depth"));
}

#[test]
fn resolve_rejects_invalid_weight_sums() {
    let mut risk: Dataset = risk_dataset();
    risk.add_member("risk".to_string(), 0.3);
    let error = ScoringPlan::resolve(
        &siting_mode(),
        &[hazard_category()],
        &[risk, depth_dataset()],
        &WeightValidator::default(),
    )
    .expect_err("field weights sum to 0.7");
    let PlanError::Validation(error) = error else {
        panic!("expected a validation error");
    };
    assert!(error.issues.iter().any(|issue| issue.contains("0.700")));
}

#[test]
fn resolve_uses_the_supplied_tolerance() {
    let mut risk = risk_dataset();
    risk.add_member("risk".to_string(), 0.57);
    let datasets = [risk, depth_dataset()];

    let strict = ScoringPlan::resolve(
        &siting_mode(),
        &[hazard_category()],
        &datasets,
        &WeightValidator::default(),
    );
    assert!(matches!(strict, Err(PlanError::Validation(_))));

    let relaxed = ScoringPlan::resolve(
        &siting_mode(),
        &[hazard_category()],
        &datasets,
        &WeightValidator::new(0.05),
    );
    assert!(relaxed.is_ok());
}

#[test]
fn resolve_rejects_repeated_members_instead_of_counting_them_twice() {
    let mut category = hazard_category();
    category.datasets.push("ds-depth".into());

    let error = ScoringPlan::resolve(
        &siting_mode(),
        &[category],
        &[risk_dataset(), depth_dataset()],
        &WeightValidator::default(),
    )
    .expect_err("ds-depth is listed twice");
    let PlanError::Validation(error) = error else {
        panic!("expected a validation error");
    };
    assert_eq!(error.entity, "Category");
    assert_eq!(
        error.issues,
        vec!["Dataset 'ds-depth' is listed more than once".to_string()]
    );
}
