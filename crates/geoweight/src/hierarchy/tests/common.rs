use std::sync::Arc;

use axum::response::Response;
use serde_json::{json, Value as JsonValue};

use crate::engine::{summarize_numbers, AttributeWeightTable, Feature, ProcessingResult, Value};
use crate::hierarchy::{
    hierarchy_router, Category, Dataset, Entity, HierarchyService, InMemoryRepository, Mode,
    Repository, RepositoryError, WeightedGroup,
};

pub(super) fn risk_dataset() -> Dataset {
    let mut dataset = Dataset::new("Flood risk");
    dataset.id = "ds-risk".into();
    dataset.set_quantitative_field("risk", summarize_numbers(&[0.0, 10.0]), 0.6);

    let mut table = AttributeWeightTable::from_values(&[Value::from("X"), Value::from("Y")]);
    table.set_weight("X", 50.0).expect("valid percentage");
    dataset.set_qualitative_field("type", table, 0.4);
    dataset
}

pub(super) fn depth_dataset() -> Dataset {
    let mut dataset = Dataset::new("Water depth");
    dataset.id = "ds-depth".into();
    dataset.set_quantitative_field("depth", summarize_numbers(&[0.0, 10.0]), 1.0);
    dataset
}

pub(super) fn hazard_category() -> Category {
    let mut category = Category::new("Hazards");
    category.id = "cat-hazard".into();
    category.add_member("ds-risk".into(), 0.7);
    category.add_member("ds-depth".into(), 0.3);
    category
}

pub(super) fn siting_mode() -> Mode {
    let mut mode = Mode::new("Site selection", "Civil");
    mode.id = "mode-siting".into();
    mode.add_member("cat-hazard".into(), 1.0);
    mode
}

pub(super) fn reference_feature() -> Feature {
    [
        ("risk", Value::Number(5.0)),
        ("type", Value::from("X")),
        ("depth", Value::Number(9.0)),
    ]
    .into_iter()
    .collect()
}

pub(super) fn reference_geojson() -> JsonValue {
    json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "risk": 5, "type": "X", "depth": 9 },
                "geometry": { "type": "Point", "coordinates": [151.2, -33.8] }
            }
        ]
    })
}

pub(super) fn build_service() -> (HierarchyService, InMemoryRepository<Dataset>) {
    let datasets = InMemoryRepository::<Dataset>::new();
    let service = HierarchyService::new(
        Arc::new(datasets.clone()),
        Arc::new(InMemoryRepository::<Category>::new()),
        Arc::new(InMemoryRepository::<Mode>::new()),
        Arc::new(InMemoryRepository::<ProcessingResult>::new()),
    );
    (service, datasets)
}

/// Service with the reference hierarchy already stored.
pub(super) fn seeded_service() -> HierarchyService {
    let (service, _) = build_service();
    service.create_dataset(risk_dataset()).expect("risk dataset");
    service.create_dataset(depth_dataset()).expect("depth dataset");
    service
        .create_category(hazard_category())
        .expect("hazard category");
    service.create_mode(siting_mode()).expect("siting mode");
    service
}

pub(super) fn unavailable_service() -> HierarchyService {
    HierarchyService::new(
        Arc::new(UnavailableRepository),
        Arc::new(UnavailableRepository),
        Arc::new(UnavailableRepository),
        Arc::new(UnavailableRepository),
    )
}

pub(super) struct UnavailableRepository;

impl<E: Entity> Repository<E> for UnavailableRepository {
    fn insert(&self, _entity: E) -> Result<E, RepositoryError> {
        Err(RepositoryError::Unavailable("disk offline".to_string()))
    }

    fn update(&self, _entity: E) -> Result<E, RepositoryError> {
        Err(RepositoryError::Unavailable("disk offline".to_string()))
    }

    fn fetch(&self, _id: &E::Id) -> Result<Option<E>, RepositoryError> {
        Err(RepositoryError::Unavailable("disk offline".to_string()))
    }

    fn list(&self) -> Result<Vec<E>, RepositoryError> {
        Err(RepositoryError::Unavailable("disk offline".to_string()))
    }

    fn delete(&self, _id: &E::Id) -> Result<E, RepositoryError> {
        Err(RepositoryError::Unavailable("disk offline".to_string()))
    }
}

pub(super) fn router_with_service(service: HierarchyService) -> axum::Router {
    hierarchy_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> JsonValue {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

pub(super) fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
