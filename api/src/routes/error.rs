//! Error responses shared by the query routes.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use shared::storage::ReaderError;

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable description.
    pub message: String,
}

/// Rejection returned by query handlers.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

/// A 400 response for malformed request parameters.
pub fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "invalid_parameters", message)
}

/// A 404 response.
pub fn not_found(error: &str, message: impl Into<String>) -> ApiError {
    api_error(StatusCode::NOT_FOUND, error, message)
}

/// Maps a reader error to its HTTP response.
pub fn reader_error(err: ReaderError) -> ApiError {
    match &err {
        ReaderError::TraceNotFound(_) => not_found("trace_not_found", err.to_string()),
        ReaderError::InvalidTraceId { .. } => {
            api_error(StatusCode::BAD_REQUEST, "invalid_trace_id", err.to_string())
        }
        ReaderError::Configuration(_) => {
            tracing::error!(error = %err, "Reader is misconfigured");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                err.to_string(),
            )
        }
        ReaderError::Query { .. } | ReaderError::Scan(_) | ReaderError::Decode(_) => {
            tracing::error!(error = %err, "Trace storage request failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                err.to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::TraceId;
    use shared::storage::MissingTable;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ReaderError::TraceNotFound(TraceId::new(0, 1)),
                StatusCode::NOT_FOUND,
                "trace_not_found",
            ),
            (
                ReaderError::Configuration(MissingTable::Index),
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
            ),
            (
                ReaderError::Scan("bad row".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
            ),
            (
                ReaderError::query("timed out"),
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
            ),
        ];

        for (err, status, code) in cases {
            let (actual, Json(body)) = reader_error(err);
            assert_eq!(actual, status);
            assert_eq!(body.error, code);
        }
    }

    #[test]
    fn test_invalid_trace_id_is_bad_request() {
        let source = "xyz".parse::<TraceId>().unwrap_err();
        let (status, Json(body)) = reader_error(ReaderError::InvalidTraceId {
            input: "xyz".to_string(),
            source,
        });

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "invalid_trace_id");
        assert!(body.message.contains("xyz"));
    }
}
