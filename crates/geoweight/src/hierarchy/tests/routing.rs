use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tower::ServiceExt;

fn json_request(method: &str, uri: &str, body: &JsonValue) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("body serializes")))
        .expect("request builds")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

#[tokio::test]
async fn dataset_routes_create_and_fetch() {
    let (service, _) = build_service();
    let router = router_with_service(service);
    let payload = serde_json::to_value(risk_dataset()).expect("dataset serializes");

    let response = router
        .clone()
        .oneshot(json_request("POST", "/api/v1/datasets", &payload))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router
        .clone()
        .oneshot(get_request("/api/v1/datasets/ds-risk"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["name"], "Flood risk");

    let response = router
        .oneshot(json_request("POST", "/api/v1/datasets", &payload))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_entities_return_unprocessable_with_issues() {
    let (service, _) = build_service();
    let router = router_with_service(service);
    let payload = json!({
        "name": "Hazards",
        "datasets": ["missing"],
        "dataset_weights": { "missing": 0.5 }
    });

    let response = router
        .oneshot(json_request("POST", "/api/v1/categories", &payload))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["entity"], "Category");
    let issues = body["issues"].as_array().expect("issues listed");
    assert_eq!(issues.len(), 2);
    assert!(issues[1]
        .as_str()
        .unwrap_or_default()
        .contains("missing"));
}

#[tokio::test]
async fn unknown_ids_return_not_found() {
    let service = Arc::new(seeded_service());
    let response = crate::hierarchy::router::get_mode_handler(
        State(service.clone()),
        Path("nope".to_string()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response =
        crate::hierarchy::router::get_result_handler(State(service), Path("nope".to_string()))
            .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn process_route_runs_the_mode_and_exposes_the_result() {
    let router = router_with_service(seeded_service());

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/modes/mode-siting/process",
            &reference_geojson(),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    let score = body["final_scores"][0].as_f64().expect("final score");
    assert_close(score, 0.62);

    let result_id = body["id"].as_str().expect("result id").to_string();
    assert!(result_id.starts_with("mode-siting_"));
    let response = router
        .oneshot(get_request(&format!("/api/v1/results/{result_id}")))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_feature_input_is_a_bad_request() {
    let router = router_with_service(seeded_service());
    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/fields/analyze",
            &json!({ "type": "Polygon", "coordinates": [] }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/fields/analyze",
            &reference_geojson(),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["total_features"], 1);
    assert_eq!(body["fields"]["type"]["predicted_type"], "qualitative");
}

#[tokio::test]
async fn hierarchy_reports_are_served() {
    let service = seeded_service();
    service
        .delete_dataset(&"ds-depth".into())
        .expect("dataset deleted");
    let router = router_with_service(service);

    let response = router
        .clone()
        .oneshot(get_request("/api/v1/hierarchy/validate"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["is_valid"], false);
    assert_eq!(body["orphaned_references"][0]["missing_id"], "ds-depth");

    let response = router
        .clone()
        .oneshot(get_request("/api/v1/categories/cat-hazard/validate"))
        .await
        .expect("route executes");
    let body = read_json_body(response).await;
    assert_eq!(body["orphaned_references"], json!(["ds-depth"]));

    let response = router
        .oneshot(get_request("/api/v1/hierarchy/summary"))
        .await
        .expect("route executes");
    let body = read_json_body(response).await;
    assert_eq!(body["datasets"]["total"], 1);
}

#[tokio::test]
async fn storage_failures_are_internal_errors() {
    let router = router_with_service(unavailable_service());
    let response = router
        .oneshot(get_request("/api/v1/modes"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains("disk offline"));
}

#[tokio::test]
async fn unscorable_dataset_payloads_are_unprocessable() {
    let (service, _) = build_service();
    let router = router_with_service(service);
    let payload = json!({
        "id": "ds-untyped",
        "name": "Untyped",
        "selected_fields": ["risk"],
        "field_weights": { "risk": 1.0 }
    });

    let response = router
        .clone()
        .oneshot(json_request("POST", "/api/v1/datasets", &payload))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["dataset"], "ds-untyped");
    assert_eq!(
        body["problems"],
        json!(["selected field 'risk' has no field type"])
    );

    let response = router
        .oneshot(get_request("/api/v1/datasets"))
        .await
        .expect("route executes");
    assert_eq!(read_json_body(response).await, json!([]));
}
