//! Integration tests for trace lookup and search.
//!
//! Tests cover:
//! - Retrieving complete traces by ID, in both payload encodings
//! - Searching by service, operation, duration, time window and tags
//! - Ordering and limits of search results
//! - Error handling for missing, malformed and undecodable traces
//! - Archive lookups

use axum::http::StatusCode;
use serde_json::Value;
use shared::codec::{encode, PayloadEncoding};
use shared::models::{SpanId, TraceId};

use super::common::{base_time, get, span, test_app, TestApp};

fn trace_ids(response: &Value) -> Vec<String> {
    response["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["traceID"].as_str().unwrap().to_string())
        .collect()
}

/// Three `checkout` traces 1s apart plus one `search` trace.
fn seeded_app() -> TestApp {
    let app = test_app();
    app.store
        .insert_spans(&[
            span(TraceId::new(0, 0xa1), 1, "frontend", "checkout", 0, 50)
                .with_tag("http.status_code", 200_i64),
            span(TraceId::new(0, 0xa1), 2, "payments", "charge", 5, 30).with_parent(SpanId(1)),
            span(TraceId::new(0, 0xa2), 3, "frontend", "checkout", 1_000, 900)
                .with_tag("http.status_code", 500_i64)
                .with_tag("error", true),
            span(TraceId::new(0, 0xa3), 4, "frontend", "checkout", 2_000, 120),
            span(TraceId::new(0, 0xb1), 5, "frontend", "search", 3_000, 10),
        ])
        .unwrap();
    app
}

#[tokio::test]
async fn test_get_trace_by_id() {
    let app = seeded_app();

    let (status, response) = get(app.router, "/api/traces/00000000000000a1").await;

    assert_eq!(status, StatusCode::OK);
    let trace = &response["data"][0];
    assert_eq!(trace["traceID"], "00000000000000a1");

    let spans = trace["spans"].as_array().unwrap();
    assert_eq!(spans.len(), 2);

    let root = spans.iter().find(|s| s["spanID"] == "0000000000000001").unwrap();
    assert_eq!(root["operationName"], "checkout");
    assert_eq!(root["process"]["serviceName"], "frontend");
    assert_eq!(root["duration"], 50_000_000);
    assert_eq!(root["tags"][0]["key"], "http.status_code");
    assert_eq!(root["tags"][0]["vType"], "int64");

    let child = spans.iter().find(|s| s["spanID"] == "0000000000000002").unwrap();
    assert_eq!(child["references"][0]["refType"], "CHILD_OF");
    assert_eq!(child["references"][0]["spanID"], "0000000000000001");
}

#[tokio::test]
async fn test_get_trace_accepts_short_and_long_ids() {
    let app = test_app();
    let wide = TraceId::new(0x1234, 0xabcd);
    app.store
        .insert_span(&span(wide, 1, "frontend", "checkout", 0, 5))
        .unwrap();
    app.store
        .insert_span(&span(TraceId::new(0, 0xa1), 2, "frontend", "checkout", 0, 5))
        .unwrap();

    let (status, response) = get(
        app.router.clone(),
        "/api/traces/0000000000001234000000000000abcd",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        response["data"][0]["traceID"],
        "0000000000001234000000000000abcd"
    );

    let (status, response) = get(app.router, "/api/traces/a1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"][0]["traceID"], "00000000000000a1");
}

#[tokio::test]
async fn test_trace_with_mixed_payload_encodings() {
    let app = test_app();
    let trace = TraceId::new(0, 0xc1);
    let legacy = span(trace, 2, "legacy", "old-op", 5, 5);

    app.store
        .insert_span(&span(trace, 1, "frontend", "checkout", 0, 10))
        .unwrap();
    app.store
        .insert_payload(trace, encode(&legacy, PayloadEncoding::Json).unwrap())
        .unwrap();

    let (status, response) = get(app.router, "/api/traces/c1").await;

    assert_eq!(status, StatusCode::OK);
    let spans = response["data"][0]["spans"].as_array().unwrap();
    assert_eq!(spans.len(), 2);
    assert!(spans.iter().any(|s| s["process"]["serviceName"] == "legacy"));
}

#[tokio::test]
async fn test_missing_trace_is_404() {
    let app = seeded_app();

    let (status, response) = get(app.router, "/api/traces/ffff").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response["error"], "trace_not_found");
}

#[tokio::test]
async fn test_malformed_trace_id_is_400() {
    let app = seeded_app();

    let (status, response) = get(app.router.clone(), "/api/traces/not-a-trace").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "invalid_trace_id");

    let too_long = "1".repeat(33);
    let (status, _) = get(app.router, &format!("/api/traces/{too_long}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_undecodable_payload_is_500() {
    let app = test_app();
    let trace = TraceId::new(0, 0xd1);
    app.store
        .insert_span(&span(trace, 1, "frontend", "checkout", 0, 10))
        .unwrap();
    app.store.insert_payload(trace, b"{not json".to_vec()).unwrap();

    let (status, response) = get(app.router, "/api/traces/d1").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response["error"], "storage_error");
}

#[tokio::test]
async fn test_find_traces_newest_first() {
    let app = seeded_app();

    let (status, response) = get(app.router, "/api/traces?service=frontend").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["total"], 4);
    assert_eq!(
        trace_ids(&response),
        vec![
            "00000000000000b1",
            "00000000000000a3",
            "00000000000000a2",
            "00000000000000a1"
        ]
    );
    // Search returns whole traces, including spans of other services.
    assert_eq!(response["data"][3]["spans"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_find_traces_with_filters() {
    let app = seeded_app();

    let (_, by_operation) = get(
        app.router.clone(),
        "/api/traces?service=frontend&operation=checkout&limit=2",
    )
    .await;
    assert_eq!(
        trace_ids(&by_operation),
        vec!["00000000000000a3", "00000000000000a2"]
    );

    let (_, by_duration) = get(
        app.router.clone(),
        "/api/traces?service=frontend&minDuration=100ms&maxDuration=1s",
    )
    .await;
    assert_eq!(
        trace_ids(&by_duration),
        vec!["00000000000000a3", "00000000000000a2"]
    );

    let start = base_time().timestamp_micros();
    let end = start + 1_500_000;
    let (_, by_window) = get(
        app.router.clone(),
        &format!("/api/traces?service=frontend&start={start}&end={end}"),
    )
    .await;
    assert_eq!(
        trace_ids(&by_window),
        vec!["00000000000000a2", "00000000000000a1"]
    );

    let tags = urlencoding::encode(r#"{"http.status_code":500,"error":"true"}"#);
    let (_, by_tags) = get(
        app.router,
        &format!("/api/traces?service=frontend&tags={tags}"),
    )
    .await;
    assert_eq!(trace_ids(&by_tags), vec!["00000000000000a2"]);
}

#[tokio::test]
async fn test_find_traces_rejects_bad_parameters() {
    let app = seeded_app();

    for uri in [
        "/api/traces",
        "/api/traces?service=",
        "/api/traces?service=frontend&limit=0",
        "/api/traces?service=frontend&minDuration=quick",
        "/api/traces?service=frontend&maxDuration=340282366920938463463374607431768211.999us",
        "/api/traces?service=frontend&tags=error",
    ] {
        let (status, response) = get(app.router.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(response["error"], "invalid_parameters", "{uri}");
    }
}

#[tokio::test]
async fn test_archive_lookup() {
    let app = test_app();
    let trace = TraceId::new(0, 0xe1);
    app.archive
        .insert_span(&span(trace, 1, "frontend", "checkout", 0, 10))
        .unwrap();

    let (status, response) = get(app.router.clone(), "/api/archive/traces/e1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"][0]["traceID"], "00000000000000e1");

    // The archive is a separate table.
    let (status, _) = get(app.router, "/api/traces/e1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
