/// Integration tests for the HTTP surface
///
/// Requests go straight through the router with `oneshot`, covering both a
/// server without a model and one holding a freshly trained forest.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use kc_severity::{
    api::{build_router, AppState},
    metrics::init_metrics,
    ml::{Classifier, PredictionService, RandomForestClassifier, RandomForestParams, SyntheticDataGenerator},
};
use serde_json::{json, Value};
use tower::ServiceExt;

const BODY_LIMIT: usize = 4 * 1024 * 1024;

fn router_without_model() -> Router {
    build_router(AppState::new("/nonexistent/rf_model.bin"))
}

fn router_with_model() -> Router {
    let dataset = SyntheticDataGenerator::new(40, 42).generate().unwrap();
    let params = RandomForestParams::default()
        .with_n_estimators(15)
        .with_seed(42);
    let mut forest = RandomForestClassifier::new(params);
    forest.fit(&dataset).unwrap();

    let service = PredictionService::from_model(forest, "memory://rf_model.bin").unwrap();
    build_router(AppState::new("memory://rf_model.bin").with_predictor(service))
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_index_without_model_shows_message() {
    let (status, body) = send(router_without_model(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Model file not found"));
    assert!(body.contains("kc-pipeline run"));
    assert!(body.contains("no model loaded"));
}

#[tokio::test]
async fn test_predict_without_model_is_unavailable() {
    let (status, body) = send(
        router_without_model(),
        post_json("/v1/predict", json!({"rm_b": 6.5, "rm_f": 7.8, "pachy_min": 520.0})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"]["code"], "MODEL_NOT_LOADED");
    assert_eq!(body["error"]["status"], 503);
}

#[tokio::test]
async fn test_form_without_model_keeps_inputs() {
    let (status, body) = send(
        router_without_model(),
        post_form("/predict", "rm_b=5.7&rm_f=7.0&pachy_min=450"),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("Model file not found"));
    assert!(body.contains(r#"value="5.7""#));
    assert!(!body.contains("Prediction Results"));
}

#[tokio::test]
async fn test_corrupt_model_starts_without_predictor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rf_kc_severity.bin");
    std::fs::write(&path, b"not a model").unwrap();

    let router = build_router(AppState::load(&path));

    let (status, body) = send(router.clone(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("could not be loaded"));
    assert!(!body.contains("Model file not found"));

    let (status, body) = send(
        router,
        post_json("/v1/predict", json!({"rm_b": 6.5, "rm_f": 7.8, "pachy_min": 520.0})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"]["code"], "MODEL_NOT_LOADED");
}

#[tokio::test]
async fn test_health_endpoints() {
    let (status, body) = send(router_without_model(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], false);

    let (status, body) = send(router_without_model(), get("/health/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("model_not_loaded"));

    let (status, body) = send(router_with_model(), get("/health/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("ready"));
}

#[tokio::test]
async fn test_json_prediction() {
    let (status, body) = send(
        router_with_model(),
        post_json("/v1/predict", json!({"Rm_B": 6.5, "Rm_F": 7.8, "Pachy_Min": 530.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["stage"], 0);
    assert_eq!(body["name"], "Stage 0 - Normal");

    let probabilities = body["probabilities"].as_array().unwrap();
    assert_eq!(probabilities.len(), 5);
    let total: f64 = probabilities.iter().map(|p| p.as_f64().unwrap()).sum();
    assert!((total - 1.0).abs() < 1e-9);

    let confidence = body["confidence"].as_f64().unwrap();
    let max = probabilities
        .iter()
        .map(|p| p.as_f64().unwrap())
        .fold(0.0, f64::max);
    assert_eq!(confidence, max);
}

#[tokio::test]
async fn test_json_prediction_rejects_out_of_range() {
    let (status, body) = send(
        router_with_model(),
        post_json("/v1/predict", json!({"rm_b": 6.5, "rm_f": 7.8, "pachy_min": 150.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_form_prediction_renders_results() {
    let (status, body) = send(
        router_with_model(),
        post_form("/predict", "rm_b=4.8&rm_f=6.3&pachy_min=390"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Prediction Results"));
    assert!(body.contains("Clinical Recommendations"));
    assert!(body.contains("Confidence Distribution"));
    assert!(body.contains("<svg"));
    assert!(body.contains(r#"value="4.8""#));
    assert!(body.contains(r#"value="390""#));
    assert!(body.contains("Method: Random Forest (bagged trees)"));
}

#[tokio::test]
async fn test_form_prediction_rejects_out_of_range() {
    let (status, body) = send(
        router_with_model(),
        post_form("/predict", "rm_b=9.5&rm_f=7.8&pachy_min=520"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Validation error"));
    assert!(!body.contains("Prediction Results"));
}

#[tokio::test]
async fn test_metrics_endpoint_counts_predictions() {
    init_metrics().unwrap();
    let router = router_with_model();

    let (status, _) = send(
        router.clone(),
        post_json("/v1/predict", json!({"rm_b": 6.5, "rm_f": 7.8, "pachy_min": 520.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(router, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("kc_severity_predictions_total"));
    assert!(body.contains("kc_severity_http_requests_total"));
}
