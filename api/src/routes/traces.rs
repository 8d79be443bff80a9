//! Trace lookup and search endpoints.

use super::error::{bad_request, not_found, reader_error, ApiError};
use super::services::DataResponse;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::models::{parse_duration, DurationParseError, Span, Trace, TraceId, TraceQueryParameters};
use shared::storage::{ReaderError, TraceReader};
use std::collections::BTreeMap;
use thiserror::Error;
use validator::Validate;

/// Query string of the trace search endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindTracesQuery {
    /// Service to search in.
    pub service: Option<String>,
    /// Exact operation name.
    pub operation: Option<String>,
    /// Earliest start time, in microseconds since the Unix epoch.
    pub start: Option<i64>,
    /// Latest start time, in microseconds since the Unix epoch.
    pub end: Option<i64>,
    /// Minimum span duration, such as `150ms`.
    pub min_duration: Option<String>,
    /// Maximum span duration, such as `2s`.
    pub max_duration: Option<String>,
    /// JSON object of tag constraints.
    pub tags: Option<String>,
    /// Maximum number of traces.
    pub limit: Option<u32>,
}

/// Reasons a search query string is rejected.
#[derive(Debug, Error)]
pub enum ParamError {
    /// A timestamp bound is outside the representable range.
    #[error("Timestamp {name}={value} is out of range")]
    Timestamp {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: i64,
    },

    /// A duration bound does not parse.
    #[error("Invalid {name}: {source}")]
    Duration {
        /// Parameter name.
        name: &'static str,
        /// Parse failure.
        #[source]
        source: DurationParseError,
    },

    /// The tags parameter is not a JSON object.
    #[error("Invalid tags, expected a JSON object: {0}")]
    Tags(#[from] serde_json::Error),

    /// The assembled parameters fail validation.
    #[error("{0}")]
    Invalid(#[from] validator::ValidationErrors),
}

fn micros_to_time(name: &'static str, value: i64) -> Result<DateTime<Utc>, ParamError> {
    DateTime::from_timestamp_micros(value).ok_or(ParamError::Timestamp { name, value })
}

fn duration(
    name: &'static str,
    value: &str,
) -> Result<std::time::Duration, ParamError> {
    parse_duration(value).map_err(|source| ParamError::Duration { name, source })
}

// Non-string JSON values are matched by their JSON text, e.g. `500` or `true`.
fn parse_tags(raw: &str) -> Result<BTreeMap<String, String>, ParamError> {
    let tags: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw)?;
    Ok(tags
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect())
}

impl TryFrom<FindTracesQuery> for TraceQueryParameters {
    type Error = ParamError;

    fn try_from(query: FindTracesQuery) -> Result<Self, Self::Error> {
        let mut params = TraceQueryParameters::new(query.service.unwrap_or_default());
        params.operation_name = query.operation.filter(|op| !op.is_empty());
        params.start_time_min = query
            .start
            .map(|v| micros_to_time("start", v))
            .transpose()?;
        params.start_time_max = query.end.map(|v| micros_to_time("end", v)).transpose()?;
        params.duration_min = query
            .min_duration
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|v| duration("minDuration", v))
            .transpose()?;
        params.duration_max = query
            .max_duration
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|v| duration("maxDuration", v))
            .transpose()?;
        if let Some(raw) = query.tags.as_deref().filter(|v| !v.is_empty()) {
            params.tags = parse_tags(raw)?;
        }
        if let Some(limit) = query.limit {
            params.num_traces = limit;
        }

        params.validate()?;
        Ok(params)
    }
}

/// A trace in the response.
#[derive(Debug, Serialize, Deserialize)]
pub struct TraceResponse {
    /// The trace ID in stored form.
    #[serde(rename = "traceID")]
    pub trace_id: String,
    /// All spans, in storage order.
    pub spans: Vec<Span>,
    /// Trace-level warnings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl From<Trace> for TraceResponse {
    fn from(trace: Trace) -> Self {
        Self {
            trace_id: trace.trace_id().map(|id| id.to_string()).unwrap_or_default(),
            spans: trace.spans,
            warnings: trace.warnings,
        }
    }
}

/// Creates the traces routes.
pub fn traces_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/traces", get(find_traces))
        .route("/api/traces/{trace_id}", get(get_trace))
        .route("/api/archive/traces/{trace_id}", get(get_archived_trace))
        .with_state(state)
}

fn parse_trace_id(input: &str) -> Result<TraceId, ApiError> {
    input.parse().map_err(|source| {
        reader_error(ReaderError::InvalidTraceId {
            input: input.to_string(),
            source,
        })
    })
}

async fn lookup(
    reader: &TraceReader,
    trace_id: &str,
) -> Result<Json<DataResponse<TraceResponse>>, ApiError> {
    let trace_id = parse_trace_id(trace_id)?;
    let trace = reader.get_trace(trace_id).await.map_err(reader_error)?;
    Ok(Json(vec![TraceResponse::from(trace)].into()))
}

async fn get_trace(
    State(state): State<AppState>,
    Path(trace_id): Path<String>,
) -> Result<Json<DataResponse<TraceResponse>>, ApiError> {
    lookup(state.reader(), &trace_id).await
}

async fn get_archived_trace(
    State(state): State<AppState>,
    Path(trace_id): Path<String>,
) -> Result<Json<DataResponse<TraceResponse>>, ApiError> {
    let reader = state
        .archive()
        .ok_or_else(|| not_found("archive_disabled", "No archive span table is configured"))?;
    lookup(reader, &trace_id).await
}

async fn find_traces(
    State(state): State<AppState>,
    Query(query): Query<FindTracesQuery>,
) -> Result<Json<DataResponse<TraceResponse>>, ApiError> {
    let params =
        TraceQueryParameters::try_from(query).map_err(|e| bad_request(e.to_string()))?;

    let traces = state
        .reader()
        .find_traces(&params)
        .await
        .map_err(reader_error)?;

    Ok(Json(
        traces
            .into_iter()
            .map(TraceResponse::from)
            .collect::<Vec<_>>()
            .into(),
    ))
}
