use super::common::*;

use crate::engine::{summarize_numbers, WeightValidator};
use crate::hierarchy::{
    Category, CategoryId, Dataset, DatasetId, DatasetStatus, DatasetType, HierarchyError, Mode,
    ModeId, Repository, RepositoryError, WeightedGroup,
};

#[test]
fn create_assigns_ids_and_rejects_bad_weight_sums() {
    let (service, _) = build_service();
    let mut dataset = risk_dataset();
    dataset.id = DatasetId::default();
    let stored = service.create_dataset(dataset).expect("valid dataset");
    assert!(!stored.id.is_blank());

    let mut skewed = depth_dataset();
    skewed.add_member("depth".to_string(), 0.8);
    let error = service.create_dataset(skewed).expect_err("weights sum to 0.8");
    let HierarchyError::Validation(error) = error else {
        panic!("expected validation error, got {error:?}");
    };
    assert_eq!(error.entity, "Dataset");
    assert_eq!(error.id, "ds-depth");
    assert!(error.issues[0].contains("0.800"));
    assert!(service.list_datasets().expect("list").len() == 1);
}

#[test]
fn category_create_lists_every_invalid_dataset_id() {
    let (service, _) = build_service();
    service.create_dataset(risk_dataset()).expect("risk dataset");

    let mut category = Category::new("Mixed");
    category.add_member("ds-risk".into(), 0.5);
    category.add_member("ghost-1".into(), 0.25);
    category.add_member("ghost-2".into(), 0.25);

    let error = service
        .create_category(category)
        .expect_err("two datasets do not exist");
    let HierarchyError::Validation(error) = error else {
        panic!("expected validation error");
    };
    assert_eq!(
        error.issues,
        vec!["Invalid dataset IDs: ghost-1, ghost-2".to_string()]
    );
}

#[test]
fn duplicate_ids_conflict() {
    let service = seeded_service();
    let error = service
        .create_mode(siting_mode())
        .expect_err("mode id already used");
    assert!(matches!(
        error,
        HierarchyError::Repository(RepositoryError::Conflict { collection: "modes", .. })
    ));
}

#[test]
fn deleting_a_dataset_leaves_an_orphan_on_the_category() {
    let service = seeded_service();
    service
        .delete_dataset(&"ds-depth".into())
        .expect("dataset deleted");

    let category = service
        .get_category(&"cat-hazard".into())
        .expect("category not cascaded");
    assert_eq!(category.datasets.len(), 2);

    let report = service
        .validate_category(&"cat-hazard".into())
        .expect("report builds");
    assert!(!report.is_valid);
    assert_eq!(report.orphaned_references, vec!["ds-depth".to_string()]);
    assert!(report
        .issues
        .iter()
        .any(|issue| issue.contains("ds-depth")));

    let hierarchy = service.validate_hierarchy().expect("hierarchy report");
    assert!(!hierarchy.is_valid);
    assert_eq!(hierarchy.orphaned_references.len(), 1);
    assert_eq!(hierarchy.orphaned_references[0].owner_id, "cat-hazard");
    assert_eq!(hierarchy.orphaned_references[0].missing_id, "ds-depth");
}

#[test]
fn processing_an_orphaned_mode_is_rejected_before_scoring() {
    let service = seeded_service();
    service
        .delete_dataset(&"ds-depth".into())
        .expect("dataset deleted");

    let error = service
        .process_mode(&"mode-siting".into(), &[reference_feature()])
        .expect_err("category references a deleted dataset");
    assert!(matches!(error, HierarchyError::Validation(ref err) if err.id == "cat-hazard"));
    assert!(service.list_results().expect("list").is_empty());
}

#[test]
fn process_mode_scores_and_stores_the_result() {
    let service = seeded_service();
    let result = service
        .process_mode(&"mode-siting".into(), &[reference_feature()])
        .expect("mode processes");

    assert_eq!(result.total_features(), 1);
    assert_close(result.final_scores()[0], 0.62);
    assert_close(result.category_scores()[&CategoryId::from("cat-hazard")], 0.62);

    let stored = service.get_result(result.id()).expect("result stored");
    assert_eq!(stored, result);
    assert_eq!(
        service
            .results_for_mode(&"mode-siting".into())
            .expect("by mode")
            .len(),
        1
    );
    service.delete_result(result.id()).expect("result deleted");
    assert!(service.get_result(result.id()).is_err());
}

#[test]
fn update_keeps_identity_and_requires_existing_record() {
    let service = seeded_service();
    let original = service.get_mode(&"mode-siting".into()).expect("mode");

    let mut edited = Mode::new("Site selection v2", "civil");
    edited.add_member("cat-hazard".into(), 1.0);
    let updated = service
        .update_mode(&"mode-siting".into(), edited.clone())
        .expect("update succeeds");
    assert_eq!(updated.id, original.id);
    assert_eq!(updated.created_at, original.created_at);
    assert_eq!(updated.name, "Site selection v2");

    let error = service
        .update_mode(&"mode-missing".into(), edited)
        .expect_err("no such mode");
    assert!(matches!(
        error,
        HierarchyError::Repository(RepositoryError::NotFound { .. })
    ));
}

#[test]
fn modes_filter_by_use_case_ignoring_case() {
    let service = seeded_service();
    let mut other = Mode::new("Patrol", "military");
    other.add_member("cat-hazard".into(), 1.0);
    service.create_mode(other).expect("second mode");

    let civil = service.modes_by_use_case("CIVIL").expect("filter");
    assert_eq!(civil.len(), 1);
    assert_eq!(civil[0].id, ModeId::from("mode-siting"));
}

#[test]
fn mode_hierarchy_resolves_nested_entities() {
    let service = seeded_service();
    let hierarchy = service
        .mode_hierarchy(&"mode-siting".into())
        .expect("hierarchy resolves");
    assert_eq!(hierarchy.category_details.len(), 1);
    assert_eq!(hierarchy.category_details[0].dataset_details.len(), 2);

    let value = serde_json::to_value(&hierarchy).expect("serializes");
    assert_eq!(value["name"], "Site selection");
    assert_eq!(value["category_details"][0]["name"], "Hazards");
}

#[test]
fn summary_counts_entities_and_unused_members() {
    let service = seeded_service();
    let mut spare = Dataset::new("Spare");
    spare.dataset_type = DatasetType::ApiBuiltin;
    spare.status = DatasetStatus::Processed;
    spare.set_quantitative_field("x", summarize_numbers(&[0.0, 1.0]), 1.0);
    let spare = service.create_dataset(spare).expect("spare dataset");

    let summary = service.summary().expect("summary");
    assert_eq!(summary.datasets.total, 3);
    assert_eq!(summary.datasets.by_type["api_builtin"], 1);
    assert_eq!(summary.datasets.by_type["file_upload"], 2);
    assert_eq!(summary.datasets.by_status["processed"], 1);
    assert_close(summary.categories.avg_datasets_per_category, 2.0);
    assert_eq!(summary.modes.by_use_case["Civil"], 1);
    assert_eq!(summary.processing_results.total, 0);

    let report = service.validate_hierarchy().expect("report");
    assert!(report.is_valid);
    assert_eq!(report.unused_datasets, vec![spare.id]);
    assert!(report.unused_categories.is_empty());
    assert_eq!(
        service
            .datasets_by_type(DatasetType::ApiBuiltin)
            .expect("by type")
            .len(),
        1
    );
}

#[test]
fn repository_failures_surface_as_repository_errors() {
    let service = unavailable_service();
    let error = service
        .create_dataset(risk_dataset())
        .expect_err("storage offline");
    assert!(matches!(
        error,
        HierarchyError::Repository(RepositoryError::Unavailable(_))
    ));
}

#[test]
fn dataset_repository_is_shared_with_the_service() {
    let (service, datasets) = build_service();
    datasets.insert(risk_dataset()).expect("direct insert");
    assert_eq!(
        service
            .get_dataset(&"ds-risk".into())
            .expect("visible to service")
            .name,
        "Flood risk"
    );
}

#[test]
fn unscorable_datasets_are_rejected_on_create_and_update() {
    let (service, _) = build_service();
    let mut untyped = Dataset::new("Untyped");
    untyped.id = "ds-untyped".into();
    untyped.add_member("risk".to_string(), 1.0);

    let error = service
        .create_dataset(untyped)
        .expect_err("risk has no field type");
    let HierarchyError::Configuration(error) = error else {
        panic!("expected configuration error, got {error:?}");
    };
    assert_eq!(error.dataset.as_str(), "ds-untyped");
    assert_eq!(
        error.problems,
        vec!["selected field 'risk' has no field type".to_string()]
    );
    assert!(service.list_datasets().expect("list").is_empty());

    let stored = service.create_dataset(risk_dataset()).expect("risk dataset");
    let mut broken = stored.clone();
    broken
        .attribute_tables
        .get_mut("type")
        .expect("type table")
        .attribute_weights = serde_json::from_value(serde_json::json!({ "X": 150.0 }))
        .expect("weights parse");
    let error = service
        .update_dataset(&stored.id, broken)
        .expect_err("150% is out of range");
    assert!(matches!(error, HierarchyError::Configuration(_)));
    assert_eq!(service.get_dataset(&stored.id).expect("dataset"), stored);
}

#[test]
fn configured_tolerance_applies_to_writes_and_processing() {
    let (service, _) = build_service();
    let service = service.with_validator(WeightValidator::new(0.05));

    let mut risk = risk_dataset();
    risk.add_member("risk".to_string(), 0.57);
    service.create_dataset(risk).expect("0.97 is within 0.05");
    service.create_dataset(depth_dataset()).expect("depth dataset");
    service
        .create_category(hazard_category())
        .expect("hazard category");
    service.create_mode(siting_mode()).expect("siting mode");

    let result = service
        .process_mode(&"mode-siting".into(), &[reference_feature()])
        .expect("the same tolerance gates processing");
    assert_eq!(result.final_scores().len(), 1);
}

#[test]
fn repeated_members_are_rejected_on_write() {
    let service = seeded_service();

    let mut doubled = Category::new("Doubled");
    doubled.add_member("ds-depth".into(), 1.0);
    doubled.datasets.push("ds-depth".into());
    let error = service
        .create_category(doubled)
        .expect_err("ds-depth is listed twice");
    let HierarchyError::Validation(error) = error else {
        panic!("expected validation error, got {error:?}");
    };
    assert_eq!(
        error.issues,
        vec!["Dataset 'ds-depth' is listed more than once".to_string()]
    );

    let mut mode = service.get_mode(&"mode-siting".into()).expect("mode");
    mode.categories.push("cat-hazard".into());
    assert!(matches!(
        service.update_mode(&"mode-siting".into(), mode),
        Err(HierarchyError::Validation(_))
    ));
}

#[test]
fn stray_weight_keys_are_reported() {
    let (service, _) = build_service();
    service.create_dataset(depth_dataset()).expect("depth dataset");

    let mut category = Category::new("Leaky");
    category.add_member("ds-depth".into(), 0.5);
    category.dataset_weights.insert("ghost".into(), 0.5);
    let error = service
        .create_category(category)
        .expect_err("ghost carries half the weight");
    let HierarchyError::Validation(error) = error else {
        panic!("expected validation error, got {error:?}");
    };
    assert_eq!(
        error.issues,
        vec!["Dataset 'ghost' has a weight but is not a member".to_string()]
    );
}
