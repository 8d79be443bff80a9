//! Server configuration module.
//!
//! Handles loading configuration from environment variables with sensible defaults.

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;

/// Where the query service reads spans from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// `ClickHouse` tables described by `ReaderConfig`.
    #[default]
    ClickHouse,
    /// An empty in-process store, for development.
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "clickhouse" => Ok(Self::ClickHouse),
            "memory" => Ok(Self::Memory),
            other => bail!("Unknown storage backend {other:?}, expected clickhouse or memory"),
        }
    }
}

/// Server configuration.
///
/// Configuration values can be set via environment variables:
/// - `SPANHOUSE_HOST`: The host address to bind to (default: "0.0.0.0")
/// - `SPANHOUSE_PORT`: The port to listen on (default: 16686)
/// - `SPANHOUSE_STORAGE`: `clickhouse` or `memory` (default: clickhouse)
#[derive(Debug, Clone)]
pub struct Config {
    /// The host address to bind to.
    pub host: String,
    /// The port to listen on.
    pub port: u16,
    /// The span storage to serve from.
    pub storage: StorageBackend,
}

impl Config {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `SPANHOUSE_PORT` is set but cannot be parsed as a valid port number
    /// - `SPANHOUSE_STORAGE` names an unknown backend
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("SPANHOUSE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = std::env::var("SPANHOUSE_PORT")
            .ok()
            .map(|p| p.parse::<u16>())
            .transpose()
            .context("Invalid SPANHOUSE_PORT")?
            .unwrap_or(16686);

        let storage = std::env::var("SPANHOUSE_STORAGE")
            .ok()
            .map(|s| s.parse::<StorageBackend>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            storage,
        })
    }

    /// Returns the socket address for binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the host and port do not form a valid socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid socket address {}:{}", self.host, self.port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 16686,
            storage: StorageBackend::ClickHouse,
        }
    }
}
