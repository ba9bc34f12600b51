use super::common::*;
use crate::engine::{analyze_fields, FieldProfile, FieldType, Value, DEFAULT_QUANTITATIVE_THRESHOLD};
use crate::hierarchy::{Dataset, WeightedGroup};

fn survey() -> Vec<crate::engine::Feature> {
    (0..10)
        .map(|index| {
            let mut entries = vec![
                ("elevation", Value::Number(index as f64 * 10.0)),
                ("landcover", Value::from(if index % 2 == 0 { "forest" } else { "urban" })),
            ];
            if index != 3 {
                entries.push(("owner", Value::from("state")));
            }
            feature(&entries)
        })
        .collect()
}

#[test]
fn analyze_fields_profiles_every_property() {
    let profiles = analyze_fields(&survey(), DEFAULT_QUANTITATIVE_THRESHOLD);

    assert_eq!(profiles.total_features, 10);
    assert_eq!(profiles.fields.len(), 3);
    assert_eq!(
        profiles.get("elevation").map(FieldProfile::field_type),
        Some(FieldType::Quantitative)
    );
    assert_eq!(profiles.qualitative_fields().count(), 2);

    let Some(FieldProfile::Qualitative { counts, details }) = profiles.get("owner") else {
        panic!("owner should be qualitative");
    };
    assert_eq!(details.total_count, 10);
    assert_eq!(counts.value_counts.get("state"), Some(&9));

    let Some(FieldProfile::Quantitative { metrics, .. }) = profiles.get("elevation") else {
        panic!("elevation should be quantitative");
    };
    let stats = metrics.stats().expect("numeric column has stats");
    assert_close(stats.max, 90.0);
    assert_eq!(stats.count, 10);
}

#[test]
fn datasets_bootstrap_from_profiles_with_equal_weights() {
    let profiles = analyze_fields(&survey(), DEFAULT_QUANTITATIVE_THRESHOLD);
    let dataset = Dataset::from_profile("Survey", &profiles, &["elevation", "landcover"])
        .expect("fields exist");

    assert_eq!(dataset.selected_fields, vec!["elevation", "landcover"]);
    assert_close(dataset.field_weights.weight_of(&"elevation".to_string()), 0.5);
    assert!(dataset.validate().is_empty());
    assert!(dataset.check_scorable().is_ok());
    assert!(dataset.attribute_tables.contains_key("landcover"));
    assert!(dataset.field_stats.contains_key("elevation"));
    assert_eq!(dataset.total_features, 10);
}

#[test]
fn bootstrapping_unknown_fields_fails() {
    let profiles = analyze_fields(&survey(), DEFAULT_QUANTITATIVE_THRESHOLD);
    let error = Dataset::from_profile("Survey", &profiles, &["elevation", "slope"])
        .expect_err("slope was never observed");
    assert_eq!(error.problems.len(), 1);
    assert!(error.problems[0].contains("slope"));
}
