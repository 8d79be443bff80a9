//! Integration tests for service and operation listings.

use axum::http::StatusCode;
use serde_json::json;
use shared::models::TraceId;

use super::common::{get, span, test_app};

#[tokio::test]
async fn test_services_and_operations() {
    let app = test_app();
    let trace = TraceId::new(0, 1);
    app.store
        .insert_spans(&[
            span(trace, 1, "frontend", "GET /checkout", 0, 120),
            span(trace, 2, "payments", "charge", 10, 80),
            span(trace, 3, "frontend", "GET /cart", 200, 40),
            span(trace, 4, "frontend", "GET /checkout", 400, 110),
        ])
        .unwrap();

    let (status, response) = get(app.router.clone(), "/api/services").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"], json!(["frontend", "payments"]));
    assert_eq!(response["total"], 2);

    let (status, response) = get(app.router, "/api/services/frontend/operations").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["total"], 2);

    let names: Vec<&str> = response["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|op| op["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["GET /cart", "GET /checkout"]);
}

#[tokio::test]
async fn test_operations_of_unknown_service_are_empty() {
    let app = test_app();

    let (status, response) = get(app.router, "/api/services/ghost/operations").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"], json!([]));
}
