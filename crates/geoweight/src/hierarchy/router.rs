use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use super::domain::{Category, CategoryId, Dataset, DatasetId, Mode, ModeId, ResultId};
use super::repository::RepositoryError;
use super::service::{HierarchyError, HierarchyService};
use crate::engine::FeatureCollection;

type SharedService = State<Arc<HierarchyService>>;

/// Router builder exposing the hierarchy CRUD, validation and processing endpoints.
pub fn hierarchy_router(service: Arc<HierarchyService>) -> Router {
    Router::new()
        .route("/api/v1/fields/analyze", post(analyze_handler))
        .route(
            "/api/v1/datasets",
            get(list_datasets_handler).post(create_dataset_handler),
        )
        .route(
            "/api/v1/datasets/:dataset_id",
            get(get_dataset_handler)
                .put(update_dataset_handler)
                .delete(delete_dataset_handler),
        )
        .route(
            "/api/v1/categories",
            get(list_categories_handler).post(create_category_handler),
        )
        .route(
            "/api/v1/categories/:category_id",
            get(get_category_handler)
                .put(update_category_handler)
                .delete(delete_category_handler),
        )
        .route(
            "/api/v1/categories/:category_id/validate",
            get(validate_category_handler),
        )
        .route(
            "/api/v1/modes",
            get(list_modes_handler).post(create_mode_handler),
        )
        .route(
            "/api/v1/modes/:mode_id",
            get(get_mode_handler)
                .put(update_mode_handler)
                .delete(delete_mode_handler),
        )
        .route("/api/v1/modes/:mode_id/validate", get(validate_mode_handler))
        .route("/api/v1/modes/:mode_id/hierarchy", get(mode_hierarchy_handler))
        .route("/api/v1/modes/:mode_id/process", post(process_mode_handler))
        .route("/api/v1/modes/:mode_id/results", get(mode_results_handler))
        .route(
            "/api/v1/use-cases/:use_case/modes",
            get(modes_by_use_case_handler),
        )
        .route("/api/v1/hierarchy/validate", get(validate_hierarchy_handler))
        .route("/api/v1/hierarchy/summary", get(summary_handler))
        .route("/api/v1/results", get(list_results_handler))
        .route(
            "/api/v1/results/:result_id",
            get(get_result_handler).delete(delete_result_handler),
        )
        .with_state(service)
}

fn respond<T: Serialize>(status: StatusCode, outcome: Result<T, HierarchyError>) -> Response {
    match outcome {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) fn error_response(error: HierarchyError) -> Response {
    let (status, payload) = match &error {
        HierarchyError::Validation(validation) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": error.to_string(),
                "entity": validation.entity,
                "id": validation.id,
                "issues": validation.issues,
            }),
        ),
        HierarchyError::Configuration(config) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": error.to_string(),
                "dataset": config.dataset,
                "problems": config.problems,
            }),
        ),
        HierarchyError::Repository(RepositoryError::NotFound { .. }) => (
            StatusCode::NOT_FOUND,
            json!({ "error": error.to_string() }),
        ),
        HierarchyError::Repository(RepositoryError::Conflict { .. }) => (
            StatusCode::CONFLICT,
            json!({ "error": error.to_string() }),
        ),
        HierarchyError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": error.to_string() }),
        ),
    };
    (status, Json(payload)).into_response()
}

fn feature_input(document: JsonValue) -> Result<FeatureCollection, Response> {
    FeatureCollection::from_geojson(document).map_err(|error| {
        let payload = json!({ "error": error.to_string() });
        (StatusCode::BAD_REQUEST, Json(payload)).into_response()
    })
}

pub(crate) async fn analyze_handler(
    State(service): SharedService,
    Json(document): Json<JsonValue>,
) -> Response {
    match feature_input(document) {
        Ok(collection) => (StatusCode::OK, Json(service.analyze_features(&collection))).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn list_datasets_handler(State(service): SharedService) -> Response {
    respond(StatusCode::OK, service.list_datasets())
}

pub(crate) async fn create_dataset_handler(
    State(service): SharedService,
    Json(dataset): Json<Dataset>,
) -> Response {
    respond(StatusCode::CREATED, service.create_dataset(dataset))
}

pub(crate) async fn get_dataset_handler(
    State(service): SharedService,
    Path(dataset_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.get_dataset(&DatasetId(dataset_id)))
}

pub(crate) async fn update_dataset_handler(
    State(service): SharedService,
    Path(dataset_id): Path<String>,
    Json(dataset): Json<Dataset>,
) -> Response {
    respond(
        StatusCode::OK,
        service.update_dataset(&DatasetId(dataset_id), dataset),
    )
}

pub(crate) async fn delete_dataset_handler(
    State(service): SharedService,
    Path(dataset_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.delete_dataset(&DatasetId(dataset_id)))
}

pub(crate) async fn list_categories_handler(State(service): SharedService) -> Response {
    respond(StatusCode::OK, service.list_categories())
}

pub(crate) async fn create_category_handler(
    State(service): SharedService,
    Json(category): Json<Category>,
) -> Response {
    respond(StatusCode::CREATED, service.create_category(category))
}

pub(crate) async fn get_category_handler(
    State(service): SharedService,
    Path(category_id): Path<String>,
) -> Response {
    respond(
        StatusCode::OK,
        service.category_with_datasets(&CategoryId(category_id)),
    )
}

pub(crate) async fn update_category_handler(
    State(service): SharedService,
    Path(category_id): Path<String>,
    Json(category): Json<Category>,
) -> Response {
    respond(
        StatusCode::OK,
        service.update_category(&CategoryId(category_id), category),
    )
}

pub(crate) async fn delete_category_handler(
    State(service): SharedService,
    Path(category_id): Path<String>,
) -> Response {
    respond(
        StatusCode::OK,
        service.delete_category(&CategoryId(category_id)),
    )
}

pub(crate) async fn validate_category_handler(
    State(service): SharedService,
    Path(category_id): Path<String>,
) -> Response {
    respond(
        StatusCode::OK,
        service.validate_category(&CategoryId(category_id)),
    )
}

pub(crate) async fn list_modes_handler(State(service): SharedService) -> Response {
    respond(StatusCode::OK, service.list_modes())
}

pub(crate) async fn create_mode_handler(
    State(service): SharedService,
    Json(mode): Json<Mode>,
) -> Response {
    respond(StatusCode::CREATED, service.create_mode(mode))
}

pub(crate) async fn get_mode_handler(
    State(service): SharedService,
    Path(mode_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.get_mode(&ModeId(mode_id)))
}

pub(crate) async fn update_mode_handler(
    State(service): SharedService,
    Path(mode_id): Path<String>,
    Json(mode): Json<Mode>,
) -> Response {
    respond(StatusCode::OK, service.update_mode(&ModeId(mode_id), mode))
}

pub(crate) async fn delete_mode_handler(
    State(service): SharedService,
    Path(mode_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.delete_mode(&ModeId(mode_id)))
}

pub(crate) async fn validate_mode_handler(
    State(service): SharedService,
    Path(mode_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.validate_mode(&ModeId(mode_id)))
}

pub(crate) async fn mode_hierarchy_handler(
    State(service): SharedService,
    Path(mode_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.mode_hierarchy(&ModeId(mode_id)))
}

pub(crate) async fn process_mode_handler(
    State(service): SharedService,
    Path(mode_id): Path<String>,
    Json(document): Json<JsonValue>,
) -> Response {
    let collection = match feature_input(document) {
        Ok(collection) => collection,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.process_mode(&ModeId(mode_id), &collection.features),
    )
}

pub(crate) async fn mode_results_handler(
    State(service): SharedService,
    Path(mode_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.results_for_mode(&ModeId(mode_id)))
}

pub(crate) async fn modes_by_use_case_handler(
    State(service): SharedService,
    Path(use_case): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.modes_by_use_case(&use_case))
}

pub(crate) async fn validate_hierarchy_handler(State(service): SharedService) -> Response {
    respond(StatusCode::OK, service.validate_hierarchy())
}

pub(crate) async fn summary_handler(State(service): SharedService) -> Response {
    respond(StatusCode::OK, service.summary())
}

pub(crate) async fn list_results_handler(State(service): SharedService) -> Response {
    respond(StatusCode::OK, service.list_results())
}

pub(crate) async fn get_result_handler(
    State(service): SharedService,
    Path(result_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.get_result(&ResultId(result_id)))
}

pub(crate) async fn delete_result_handler(
    State(service): SharedService,
    Path(result_id): Path<String>,
) -> Response {
    respond(StatusCode::OK, service.delete_result(&ResultId(result_id)))
}
