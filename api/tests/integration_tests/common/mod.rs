//! Common test utilities and helpers for integration tests.
//!
//! This module provides shared functionality used across all integration tests,
//! including test app setup, span fixtures and HTTP request helpers.

use api::{create_router, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use shared::models::{Span, SpanId, TraceId};
use shared::storage::InMemoryStore;
use std::sync::Arc;
use std::time::Duration;

/// A router over fresh in-memory stores, with handles to seed them.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub archive: Arc<InMemoryStore>,
}

/// Creates a test router with fresh in-memory stores.
pub fn test_app() -> TestApp {
    let store = InMemoryStore::new_shared();
    let archive = InMemoryStore::new_shared();
    let state = AppState::in_memory(Arc::clone(&store), Arc::clone(&archive));

    TestApp {
        router: create_router(state),
        store,
        archive,
    }
}

/// Fixed reference time for span fixtures.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Builds a span starting `offset_ms` after [`base_time`].
pub fn span(
    trace_id: TraceId,
    span_id: u64,
    service: &str,
    operation: &str,
    offset_ms: i64,
    duration_ms: u64,
) -> Span {
    Span::new(trace_id, SpanId(span_id), operation, service)
        .with_start_time(base_time() + ChronoDuration::milliseconds(offset_ms))
        .with_duration(Duration::from_millis(duration_ms))
}

/// Helper to make a GET request.
///
/// # Returns
///
/// A tuple containing the response status code and parsed JSON response body.
pub async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = tower::ServiceExt::oneshot(
        app,
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

    (status, json)
}
