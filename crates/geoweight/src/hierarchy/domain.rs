use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{
    AttributeWeightError, AttributeWeightTable, FieldProfile, FieldProfiles, FieldType,
    NormalizedWeightMap, Summary, WeightValidator,
};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(
    /// Opaque identifier of a [`Dataset`].
    DatasetId
);
entity_id!(
    /// Opaque identifier of a [`Category`].
    CategoryId
);
entity_id!(
    /// Opaque identifier of a [`Mode`].
    ModeId
);
entity_id!(
    /// Identifier of a stored processing result, `<mode id>_<unix seconds>`.
    ResultId
);

impl ResultId {
    pub fn for_run(mode_id: &ModeId, processed_at: DateTime<Utc>) -> Self {
        Self(format!("{}_{}", mode_id, processed_at.timestamp()))
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn default_creator() -> String {
    "user".to_string()
}

/// Shared membership behavior of the three weighted levels.
///
/// The provided methods never look outside the entity; whether a member id resolves to a
/// stored record is checked by [`super::HierarchyService`].
pub trait WeightedGroup {
    type Member: Clone + Ord + fmt::Display;

    const KIND: &'static str;
    const MEMBER_KIND: &'static str;

    fn name(&self) -> &str;
    fn members(&self) -> &[Self::Member];
    fn weights(&self) -> &NormalizedWeightMap<Self::Member>;
    fn membership_mut(
        &mut self,
    ) -> (
        &mut Vec<Self::Member>,
        &mut NormalizedWeightMap<Self::Member>,
    );
    fn touch(&mut self);

    /// Level-specific checks appended after the name check.
    fn extra_issues(&self, _issues: &mut Vec<String>) {}

    /// Insert a member or replace its weight. Other weights are left alone.
    fn add_member(&mut self, id: Self::Member, weight: f64) {
        let (members, weights) = self.membership_mut();
        if !members.contains(&id) {
            members.push(id.clone());
        }
        weights.insert(id, weight);
        self.touch();
    }

    /// Drop a member and its weight without renormalizing the rest.
    fn remove_member(&mut self, id: &Self::Member) -> bool {
        let (members, weights) = self.membership_mut();
        let before = members.len();
        members.retain(|member| member != id);
        let had_weight = weights.remove(id).is_some();
        let removed = had_weight || members.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    fn normalize_weights(&mut self) {
        let (_, weights) = self.membership_mut();
        weights.normalize();
        self.touch();
    }

    fn validate(&self) -> Vec<String> {
        self.validate_with(&WeightValidator::default())
    }

    /// Every violation found, in a stable order, so callers can show a full checklist.
    fn validate_with(&self, validator: &WeightValidator) -> Vec<String> {
        let mut issues = Vec::new();

        if self.name().trim().is_empty() {
            issues.push(format!("{} name is required", Self::KIND));
        }
        self.extra_issues(&mut issues);

        if self.members().is_empty() {
            issues.push(format!(
                "{} must contain at least one {}",
                Self::KIND,
                Self::MEMBER_KIND.to_lowercase()
            ));
        }

        let mut seen = BTreeSet::new();
        let mut repeated = BTreeSet::new();
        for member in self.members() {
            if !seen.insert(member) {
                repeated.insert(member);
                continue;
            }
            if !self.weights().contains_key(member) {
                issues.push(format!(
                    "{} '{}' is missing weight configuration",
                    Self::MEMBER_KIND,
                    member
                ));
            }
        }
        for member in repeated {
            issues.push(format!(
                "{} '{}' is listed more than once",
                Self::MEMBER_KIND,
                member
            ));
        }

        // Weights without a member still count toward the sum but never reach a score.
        for key in self.weights().keys().filter(|key| !seen.contains(key)) {
            issues.push(format!(
                "{} '{}' has a weight but is not a member",
                Self::MEMBER_KIND,
                key
            ));
        }

        if let Err(error) = self.weights().check(validator).into_result() {
            issues.push(format!("{} {}", Self::MEMBER_KIND, error));
        }

        issues
    }
}

/// Validate any level of the hierarchy in isolation.
pub fn validate_entity<E: WeightedGroup>(entity: &E) -> Vec<String> {
    entity.validate()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    ApiBuiltin,
    ApiCustom,
    #[default]
    FileUpload,
}

impl DatasetType {
    pub const ALL: [DatasetType; 3] = [
        DatasetType::ApiBuiltin,
        DatasetType::ApiCustom,
        DatasetType::FileUpload,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            DatasetType::ApiBuiltin => "api_builtin",
            DatasetType::ApiCustom => "api_custom",
            DatasetType::FileUpload => "file_upload",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetStatus {
    #[default]
    Created,
    Loading,
    Processed,
    Error,
}

impl DatasetStatus {
    pub const ALL: [DatasetStatus; 4] = [
        DatasetStatus::Created,
        DatasetStatus::Loading,
        DatasetStatus::Processed,
        DatasetStatus::Error,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            DatasetStatus::Created => "created",
            DatasetStatus::Loading => "loading",
            DatasetStatus::Processed => "processed",
            DatasetStatus::Error => "error",
        }
    }
}

/// Flattened view of one selected field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub weight: Option<f64>,
}

/// An entity broke one or more hierarchy rules; every issue is listed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{entity} '{id}' failed validation: {}", .issues.join("; "))]
pub struct ValidationError {
    pub entity: &'static str,
    pub id: String,
    pub issues: Vec<String>,
}

impl ValidationError {
    pub fn new(entity: &'static str, id: impl Into<String>, issues: Vec<String>) -> Self {
        Self {
            entity,
            id: id.into(),
            issues,
        }
    }
}

/// A persisted dataset that cannot be scored safely.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("dataset '{dataset}' is misconfigured: {}", .problems.join("; "))]
pub struct ConfigurationError {
    pub dataset: DatasetId,
    pub problems: Vec<String>,
}

/// One data source: which fields count, how much, and how their values are read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub id: DatasetId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dataset_type: DatasetType,
    #[serde(default)]
    pub source_info: serde_json::Value,
    #[serde(default)]
    pub selected_fields: Vec<String>,
    #[serde(default)]
    pub field_types: BTreeMap<String, FieldType>,
    #[serde(default)]
    pub field_weights: NormalizedWeightMap<String>,
    #[serde(default)]
    pub field_stats: BTreeMap<String, Summary>,
    #[serde(default)]
    pub attribute_tables: BTreeMap<String, AttributeWeightTable>,
    #[serde(default)]
    pub total_features: usize,
    #[serde(default)]
    pub status: DatasetStatus,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_creator")]
    pub created_by: String,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        let created_at = now();
        Self {
            id: DatasetId::generate(),
            name: name.into(),
            description: String::new(),
            dataset_type: DatasetType::default(),
            source_info: serde_json::Value::Null,
            selected_fields: Vec::new(),
            field_types: BTreeMap::new(),
            field_weights: NormalizedWeightMap::new(),
            field_stats: BTreeMap::new(),
            attribute_tables: BTreeMap::new(),
            total_features: 0,
            status: DatasetStatus::default(),
            created_at,
            updated_at: created_at,
            created_by: default_creator(),
        }
    }

    /// Bootstrap a dataset from profiled source fields, splitting the weight evenly.
    pub fn from_profile(
        name: impl Into<String>,
        profiles: &FieldProfiles,
        selected: &[&str],
    ) -> Result<Self, ConfigurationError> {
        let mut dataset = Self::new(name);
        dataset.total_features = profiles.total_features;
        dataset.status = DatasetStatus::Processed;

        let unknown: Vec<String> = selected
            .iter()
            .filter(|field| profiles.get(field).is_none())
            .map(|field| format!("field '{field}' does not exist in the source"))
            .collect();
        if !unknown.is_empty() {
            return Err(ConfigurationError {
                dataset: dataset.id,
                problems: unknown,
            });
        }

        let share = if selected.is_empty() {
            0.0
        } else {
            1.0 / selected.len() as f64
        };
        for field in selected {
            let Some(profile) = profiles.get(field) else {
                continue;
            };
            match profile {
                FieldProfile::Quantitative { metrics, .. } => {
                    dataset.set_quantitative_field(*field, *metrics, share);
                }
                FieldProfile::Qualitative { counts, .. } => {
                    dataset.set_qualitative_field(*field, counts.clone(), share);
                }
            }
        }
        Ok(dataset)
    }

    pub fn set_quantitative_field(&mut self, field: impl Into<String>, stats: Summary, weight: f64) {
        let field = field.into();
        self.attribute_tables.remove(&field);
        self.field_types.insert(field.clone(), FieldType::Quantitative);
        self.field_stats.insert(field.clone(), stats);
        self.add_member(field, weight);
    }

    pub fn set_qualitative_field(
        &mut self,
        field: impl Into<String>,
        table: AttributeWeightTable,
        weight: f64,
    ) {
        let field = field.into();
        self.field_stats.remove(&field);
        self.field_types.insert(field.clone(), FieldType::Qualitative);
        self.attribute_tables.insert(field.clone(), table);
        self.add_member(field, weight);
    }

    /// Weight one observed value of a qualitative field, as a percentage.
    pub fn set_attribute_weight(
        &mut self,
        field: &str,
        value: impl Into<String>,
        percent: f64,
    ) -> Result<(), AttributeWeightError> {
        self.attribute_tables
            .entry(field.to_string())
            .or_default()
            .set_weight(value, percent)?;
        self.touch();
        Ok(())
    }

    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.field_types.get(field).copied()
    }

    pub fn fields(&self) -> Vec<FieldDescriptor> {
        self.selected_fields
            .iter()
            .map(|field| FieldDescriptor {
                name: field.clone(),
                field_type: self.field_type(field),
                weight: self.field_weights.get(field),
            })
            .collect()
    }

    /// Structural problems that would make scores wrong rather than merely low.
    pub fn check_scorable(&self) -> Result<(), ConfigurationError> {
        let mut problems = Vec::new();
        for field in &self.selected_fields {
            if !self.field_weights.contains_key(field) {
                problems.push(format!("selected field '{field}' has no weight"));
            }
            if self.field_type(field).is_none() {
                problems.push(format!("selected field '{field}' has no field type"));
            }
            if let Some(table) = self.attribute_tables.get(field) {
                for error in table.attribute_weights.out_of_range() {
                    problems.push(format!("field '{field}': {error}"));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError {
                dataset: self.id.clone(),
                problems,
            })
        }
    }
}

impl WeightedGroup for Dataset {
    type Member = String;

    const KIND: &'static str = "Dataset";
    const MEMBER_KIND: &'static str = "Field";

    fn name(&self) -> &str {
        &self.name
    }

    fn members(&self) -> &[String] {
        &self.selected_fields
    }

    fn weights(&self) -> &NormalizedWeightMap<String> {
        &self.field_weights
    }

    fn membership_mut(&mut self) -> (&mut Vec<String>, &mut NormalizedWeightMap<String>) {
        (&mut self.selected_fields, &mut self.field_weights)
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }
}

fn default_color() -> String {
    "#3388ff".to_string()
}

/// A weighted group of datasets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub datasets: Vec<DatasetId>,
    #[serde(default)]
    pub dataset_weights: NormalizedWeightMap<DatasetId>,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_creator")]
    pub created_by: String,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        let created_at = now();
        Self {
            id: CategoryId::generate(),
            name: name.into(),
            description: String::new(),
            color: default_color(),
            datasets: Vec::new(),
            dataset_weights: NormalizedWeightMap::new(),
            created_at,
            updated_at: created_at,
            created_by: default_creator(),
        }
    }
}

impl WeightedGroup for Category {
    type Member = DatasetId;

    const KIND: &'static str = "Category";
    const MEMBER_KIND: &'static str = "Dataset";

    fn name(&self) -> &str {
        &self.name
    }

    fn members(&self) -> &[DatasetId] {
        &self.datasets
    }

    fn weights(&self) -> &NormalizedWeightMap<DatasetId> {
        &self.dataset_weights
    }

    fn membership_mut(&mut self) -> (&mut Vec<DatasetId>, &mut NormalizedWeightMap<DatasetId>) {
        (&mut self.datasets, &mut self.dataset_weights)
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }
}

fn enabled() -> bool {
    true
}

/// Which parts of a processing run a mode keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "enabled")]
    pub include_individual_scores: bool,
    #[serde(default = "enabled")]
    pub include_category_scores: bool,
    #[serde(default = "enabled")]
    pub include_final_score: bool,
    #[serde(default = "enabled")]
    pub normalize_final_score: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            include_individual_scores: true,
            include_category_scores: true,
            include_final_score: true,
            normalize_final_score: true,
        }
    }
}

/// Top-level use case (e.g. "military") composed of weighted categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mode {
    #[serde(default)]
    pub id: ModeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub use_case: String,
    #[serde(default)]
    pub categories: Vec<CategoryId>,
    #[serde(default)]
    pub category_weights: NormalizedWeightMap<CategoryId>,
    #[serde(default)]
    pub output_settings: OutputSettings,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_creator")]
    pub created_by: String,
}

impl Mode {
    pub fn new(name: impl Into<String>, use_case: impl Into<String>) -> Self {
        let created_at = now();
        Self {
            id: ModeId::generate(),
            name: name.into(),
            description: String::new(),
            use_case: use_case.into(),
            categories: Vec::new(),
            category_weights: NormalizedWeightMap::new(),
            output_settings: OutputSettings::default(),
            created_at,
            updated_at: created_at,
            created_by: default_creator(),
        }
    }
}

impl WeightedGroup for Mode {
    type Member = CategoryId;

    const KIND: &'static str = "Mode";
    const MEMBER_KIND: &'static str = "Category";

    fn name(&self) -> &str {
        &self.name
    }

    fn members(&self) -> &[CategoryId] {
        &self.categories
    }

    fn weights(&self) -> &NormalizedWeightMap<CategoryId> {
        &self.category_weights
    }

    fn membership_mut(&mut self) -> (&mut Vec<CategoryId>, &mut NormalizedWeightMap<CategoryId>) {
        (&mut self.categories, &mut self.category_weights)
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }

    fn extra_issues(&self, issues: &mut Vec<String>) {
        if self.use_case.trim().is_empty() {
            issues.push("Use case is required".to_string());
        }
    }
}
