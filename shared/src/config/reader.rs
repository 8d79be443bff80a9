//! Reader configuration.
//!
//! Connection settings and table names are read from `SPANHOUSE_*`
//! environment variables. An empty table name counts as unset, and a
//! missing table is only reported when an operation needs it.

use crate::models::parse_duration;
use crate::storage::{ClickHouseExecutor, QueryExecutor, TraceReader};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Default operations table.
pub const DEFAULT_OPERATIONS_TABLE: &str = "jaeger_operations_local";
/// Default index table.
pub const DEFAULT_INDEX_TABLE: &str = "jaeger_index_local";
/// Default span table.
pub const DEFAULT_SPANS_TABLE: &str = "jaeger_spans_local";
/// Default archive span table.
pub const DEFAULT_ARCHIVE_SPANS_TABLE: &str = "jaeger_archive_spans_local";

/// `ClickHouse` connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `ClickHouse` HTTP URL (e.g., <http://localhost:8123>)
    pub url: String,
    /// Database name to use
    pub database: String,
    /// Username for authentication
    pub user: String,
    /// Password for authentication
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "default".to_string(),
            user: "default".to_string(),
            password: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// Builds a client for these settings.
    #[must_use]
    pub fn client(&self) -> clickhouse::Client {
        clickhouse::Client::default()
            .with_url(&self.url)
            .with_database(&self.database)
            .with_user(&self.user)
            .with_password(&self.password)
    }
}

/// Names of the tables a reader queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    /// Table listing (service, operation) pairs.
    pub operations: Option<String>,
    /// Table searched for trace IDs.
    pub index: Option<String>,
    /// Table holding serialized spans.
    pub spans: Option<String>,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            operations: Some(DEFAULT_OPERATIONS_TABLE.to_string()),
            index: Some(DEFAULT_INDEX_TABLE.to_string()),
            spans: Some(DEFAULT_SPANS_TABLE.to_string()),
        }
    }
}

/// Everything needed to build trace readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Connection settings.
    pub database: DatabaseConfig,
    /// Primary tables.
    pub tables: TableNames,
    /// Archive span table, if archived traces are served.
    pub archive_spans_table: Option<String>,
    /// Upper bound on each statement.
    pub query_timeout: Option<Duration>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            tables: TableNames::default(),
            archive_spans_table: Some(DEFAULT_ARCHIVE_SPANS_TABLE.to_string()),
            query_timeout: None,
        }
    }
}

impl ReaderConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SPANHOUSE_DB_URL`: Database URL (default: <http://localhost:8123>)
    /// - `SPANHOUSE_DB_NAME`: Database name (default: "default")
    /// - `SPANHOUSE_DB_USER`: Database user (default: "default")
    /// - `SPANHOUSE_DB_PASSWORD`: Database password (default: empty)
    /// - `SPANHOUSE_OPERATIONS_TABLE`, `SPANHOUSE_INDEX_TABLE`,
    ///   `SPANHOUSE_SPANS_TABLE`, `SPANHOUSE_ARCHIVE_SPANS_TABLE`: table
    ///   names; set to an empty string to disable
    /// - `SPANHOUSE_QUERY_TIMEOUT`: per-statement timeout such as `30s`
    ///
    /// # Errors
    ///
    /// Returns an error if `SPANHOUSE_QUERY_TIMEOUT` is not a valid duration.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup` instead of the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is not a valid duration.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str, default: String| lookup(key).unwrap_or(default);
        let table = |key: &str, default: Option<String>| match lookup(key) {
            Some(value) if value.is_empty() => None,
            Some(value) => Some(value),
            None => default,
        };

        let query_timeout = lookup("SPANHOUSE_QUERY_TIMEOUT")
            .filter(|value| !value.is_empty())
            .map(|value| {
                parse_duration(&value)
                    .with_context(|| format!("Invalid SPANHOUSE_QUERY_TIMEOUT {value:?}"))
            })
            .transpose()?;

        Ok(Self {
            database: DatabaseConfig {
                url: var("SPANHOUSE_DB_URL", defaults.database.url),
                database: var("SPANHOUSE_DB_NAME", defaults.database.database),
                user: var("SPANHOUSE_DB_USER", defaults.database.user),
                password: var("SPANHOUSE_DB_PASSWORD", defaults.database.password),
            },
            tables: TableNames {
                operations: table("SPANHOUSE_OPERATIONS_TABLE", defaults.tables.operations),
                index: table("SPANHOUSE_INDEX_TABLE", defaults.tables.index),
                spans: table("SPANHOUSE_SPANS_TABLE", defaults.tables.spans),
            },
            archive_spans_table: table(
                "SPANHOUSE_ARCHIVE_SPANS_TABLE",
                defaults.archive_spans_table,
            ),
            query_timeout,
        })
    }

    /// Builds a `ClickHouse` executor for the configured database.
    #[must_use]
    pub fn executor(&self) -> Arc<dyn QueryExecutor> {
        ClickHouseExecutor::new_shared(Arc::new(self.database.client()))
    }

    /// Builds the primary reader over `executor`.
    #[must_use]
    pub fn reader(&self, executor: Arc<dyn QueryExecutor>) -> TraceReader {
        self.apply_timeout(TraceReader::new(executor, self.tables.clone()))
    }

    /// Builds the archive reader, if an archive table is configured.
    #[must_use]
    pub fn archive_reader(&self, executor: Arc<dyn QueryExecutor>) -> Option<TraceReader> {
        self.archive_spans_table
            .as_ref()
            .map(|table| self.apply_timeout(TraceReader::archive(executor, table.clone())))
    }

    fn apply_timeout(&self, reader: TraceReader) -> TraceReader {
        match self.query_timeout {
            Some(timeout) => reader.with_timeout(timeout),
            None => reader,
        }
    }
}
