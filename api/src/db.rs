//! Database connection module for `ClickHouse`.
//!
//! Wraps the client shared by the trace readers and checks connectivity at
//! startup.

use anyhow::{Context, Result};
use clickhouse::Client;
use shared::config::DatabaseConfig;
use shared::storage::{ClickHouseExecutor, QueryExecutor};
use std::sync::Arc;

/// Database client wrapper shared by the primary and archive readers.
#[derive(Clone)]
pub struct Database {
    client: Arc<Client>,
}

impl Database {
    /// Create a new database client from configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// # use api::db::Database;
    /// use shared::config::DatabaseConfig;
    ///
    /// let db = Database::new(&DatabaseConfig::default());
    /// let _executor = db.executor();
    /// ```
    #[must_use]
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            client: Arc::new(config.client()),
        }
    }

    /// Get a reference to the underlying `ClickHouse` client.
    #[must_use]
    pub fn client(&self) -> Arc<Client> {
        Arc::clone(&self.client)
    }

    /// Returns a statement executor over this client.
    #[must_use]
    pub fn executor(&self) -> Arc<dyn QueryExecutor> {
        ClickHouseExecutor::new_shared(self.client())
    }

    /// Test database connectivity by executing a simple query.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached or the query fails.
    pub async fn ping(&self) -> Result<()> {
        self.client
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .context("Failed to ping database")?;
        Ok(())
    }
}
