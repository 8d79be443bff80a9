//! Integration tests for health check and general API functionality.
//!
//! Tests cover:
//! - Health check endpoint
//! - Empty store behavior

use axum::http::StatusCode;

use super::common::{get, test_app};

#[tokio::test]
async fn test_health_check() {
    let app = test_app();

    let (status, response) = get(app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "healthy");
    assert_eq!(response["service"], "spanhouse-query");
}

#[tokio::test]
async fn test_empty_store_returns_empty_results() {
    let app = test_app();

    let (status, response) = get(app.router.clone(), "/api/services").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["total"], 0);
    assert!(response["data"].as_array().unwrap().is_empty());

    let (status, response) = get(app.router, "/api/traces?service=api").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["total"], 0);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = test_app();

    let (status, _) = get(app.router, "/api/v1/logs").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
