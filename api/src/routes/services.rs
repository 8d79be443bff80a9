//! Service and operation listing endpoints.

use super::error::{reader_error, ApiError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shared::models::Operation;

/// A list response in the query service's envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    /// The listed items.
    pub data: Vec<T>,
    /// Number of items in `data`.
    pub total: usize,
}

impl<T> From<Vec<T>> for DataResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self {
            total: data.len(),
            data,
        }
    }
}

/// Creates the service listing routes.
pub fn services_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/services", get(list_services))
        .route("/api/services/{service}/operations", get(list_operations))
        .with_state(state)
}

async fn list_services(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<String>>, ApiError> {
    let services = state.reader().get_services().await.map_err(reader_error)?;
    Ok(Json(services.into()))
}

async fn list_operations(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<DataResponse<Operation>>, ApiError> {
    let operations = state
        .reader()
        .get_operations(&service)
        .await
        .map_err(reader_error)?;
    Ok(Json(operations.into()))
}
