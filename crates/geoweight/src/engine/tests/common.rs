use crate::engine::{summarize_numbers, AttributeWeightTable, Feature, Value};
use crate::hierarchy::{Category, Dataset, Mode, WeightedGroup};

pub(crate) const EPSILON: f64 = 1e-9;

pub(crate) fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < EPSILON,
        "expected {expected}, got {actual}"
    );
}

/// `risk` (quantitative, 0.6) over observed values 0..=10 and `type` (qualitative, 0.4)
/// with `X` weighted at 50%.
pub(crate) fn risk_dataset() -> Dataset {
    let mut dataset = Dataset::new("Flood risk");
    dataset.id = "ds-risk".into();
    dataset.set_quantitative_field("risk", summarize_numbers(&[0.0, 10.0]), 0.6);

    let mut table = AttributeWeightTable::from_values(&[Value::from("X"), Value::from("Y")]);
    table.set_weight("X", 50.0).expect("valid percentage");
    dataset.set_qualitative_field("type", table, 0.4);
    dataset
}

/// Single quantitative field `depth` over 0..=10 carrying the full weight.
pub(crate) fn depth_dataset() -> Dataset {
    let mut dataset = Dataset::new("Water depth");
    dataset.id = "ds-depth".into();
    dataset.set_quantitative_field("depth", summarize_numbers(&[0.0, 10.0]), 1.0);
    dataset
}

pub(crate) fn hazard_category() -> Category {
    let mut category = Category::new("Hazards");
    category.id = "cat-hazard".into();
    category.add_member(risk_dataset().id, 0.7);
    category.add_member(depth_dataset().id, 0.3);
    category
}

pub(crate) fn siting_mode() -> Mode {
    let mut mode = Mode::new("Site selection", "civil");
    mode.id = "mode-siting".into();
    mode.add_member(hazard_category().id, 1.0);
    mode
}

pub(crate) fn feature(entries: &[(&str, Value)]) -> Feature {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

pub(crate) fn reference_feature() -> Feature {
    feature(&[
        ("risk", Value::Number(5.0)),
        ("type", Value::from("X")),
        ("depth", Value::Number(9.0)),
    ])
}
