//! Spanhouse API Server
//!
//! This crate provides the HTTP query service of the Spanhouse trace storage
//! backend. It serves trace lookups, trace searches and service listings
//! from the `ClickHouse` tables written by the trace ingester.
//!
//! # Architecture
//!
//! The API server is built on Axum and Tokio, providing:
//! - REST endpoints shaped after the Jaeger query API
//! - A `ClickHouse`-backed reader, or an in-memory store for development
//!
//! # Example
//!
//! ```no_run
//! use api::run_server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_server().await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
pub mod db;
mod routes;
mod state;

pub use config::{Config, StorageBackend};
pub use routes::{DataResponse, ErrorResponse, FindTracesQuery, ParamError, TraceResponse};
pub use state::AppState;

use anyhow::Result;
use axum::Router;
use db::Database;
use shared::config::ReaderConfig;
use tokio::net::TcpListener;
use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Runs the Spanhouse API server.
///
/// This function initializes the server with configuration from environment variables
/// and starts listening for incoming connections. It handles graceful shutdown on
/// SIGTERM/SIGINT signals.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;
    let reader_config = ReaderConfig::from_env()?;
    run_server_with_config(config, reader_config).await
}

/// Builds the application state for the configured storage backend.
///
/// An unreachable database is logged, not fatal: readers report query
/// errors per request until it comes up.
pub async fn build_state(config: &Config, reader_config: &ReaderConfig) -> AppState {
    match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Serving from an empty in-memory store");
            AppState::with_in_memory_store()
        }
        StorageBackend::ClickHouse => {
            let db = Database::new(&reader_config.database);
            match db.ping().await {
                Ok(()) => tracing::info!(url = %reader_config.database.url, "Connected to ClickHouse"),
                Err(e) => tracing::warn!(
                    url = %reader_config.database.url,
                    error = %e,
                    "ClickHouse is not reachable yet"
                ),
            }
            AppState::from_config(reader_config, db.executor())
        }
    }
}

/// Runs the Spanhouse API server with the provided configuration.
///
/// This is useful for testing or when you want to provide configuration programmatically.
///
/// # Errors
///
/// Returns an error if:
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server_with_config(config: Config, reader_config: ReaderConfig) -> Result<()> {
    let addr = config.socket_addr()?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        storage = ?config.storage,
        "Spanhouse query server starting"
    );

    let state = build_state(&config, &reader_config).await;
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Creates the main application router with all routes and middleware.
///
/// This function is public to allow testing the router without starting a full server.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::services_routes(state.clone()))
        .merge(routes::traces_routes(state))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
