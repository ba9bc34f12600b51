use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::attributes::AttributeWeightTable;
use super::classify::{classify_field, ClassificationDetails, FieldClassification, FieldType};
use super::stats::{summarize_quantitative, Summary};
use super::value::{Feature, Value};

/// What the profiler learned about one field of a feature collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "predicted_type", rename_all = "snake_case")]
pub enum FieldProfile {
    Quantitative {
        details: ClassificationDetails,
        metrics: Summary,
    },
    Qualitative {
        details: ClassificationDetails,
        counts: AttributeWeightTable,
    },
}

impl FieldProfile {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldProfile::Quantitative { .. } => FieldType::Quantitative,
            FieldProfile::Qualitative { .. } => FieldType::Qualitative,
        }
    }

    pub fn details(&self) -> ClassificationDetails {
        match self {
            FieldProfile::Quantitative { details, .. }
            | FieldProfile::Qualitative { details, .. } => *details,
        }
    }
}

/// Field profiles for a whole feature collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldProfiles {
    pub total_features: usize,
    pub fields: BTreeMap<String, FieldProfile>,
}

impl FieldProfiles {
    pub fn get(&self, field: &str) -> Option<&FieldProfile> {
        self.fields.get(field)
    }

    pub fn quantitative_fields(&self) -> impl Iterator<Item = (&str, &FieldProfile)> {
        self.of_type(FieldType::Quantitative)
    }

    pub fn qualitative_fields(&self) -> impl Iterator<Item = (&str, &FieldProfile)> {
        self.of_type(FieldType::Qualitative)
    }

    fn of_type(&self, field_type: FieldType) -> impl Iterator<Item = (&str, &FieldProfile)> {
        self.fields
            .iter()
            .filter(move |(_, profile)| profile.field_type() == field_type)
            .map(|(name, profile)| (name.as_str(), profile))
    }
}

/// Classify every property seen on any feature and summarize it accordingly.
///
/// A feature that lacks a property contributes a null for it, so every column has one entry
/// per feature.
pub fn analyze_fields(features: &[Feature], threshold: f64) -> FieldProfiles {
    let names: BTreeSet<&String> = features
        .iter()
        .flat_map(|feature| feature.properties.keys())
        .collect();

    let mut fields = BTreeMap::new();
    for name in names {
        let values: Vec<Value> = features
            .iter()
            .map(|feature| feature.value(name).clone())
            .collect();
        let profile = profile_column(&values, threshold);
        debug!(
            field = %name,
            predicted = %profile.field_type(),
            unique = profile.details().unique_count,
            total = profile.details().total_count,
            "classified field"
        );
        fields.insert(name.clone(), profile);
    }

    FieldProfiles {
        total_features: features.len(),
        fields,
    }
}

/// Classify one column and attach either its statistics or its value counts.
pub fn profile_column(values: &[Value], threshold: f64) -> FieldProfile {
    let FieldClassification {
        field_type,
        details,
    } = classify_field(values, threshold);
    match field_type {
        FieldType::Quantitative => FieldProfile::Quantitative {
            details,
            metrics: summarize_quantitative(values),
        },
        FieldType::Qualitative => FieldProfile::Qualitative {
            details,
            counts: AttributeWeightTable::from_values(values),
        },
    }
}
