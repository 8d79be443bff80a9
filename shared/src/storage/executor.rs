//! Statement execution and row materialization.
//!
//! [`QueryExecutor`] is the seam between the reader and the backing store.
//! Implementations run a [`Statement`] and return every row fully drained,
//! so no row cursor outlives the call.

use super::statement::{SqlArg, Statement};
use super::ReaderError;
use async_trait::async_trait;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Executes statements against the backing store.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Runs a statement that selects a single string column
    /// (trace IDs, services or operations).
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Query`] if execution fails and
    /// [`ReaderError::Scan`] if a row is not a single string column.
    async fn fetch_strings(&self, statement: &Statement) -> Result<Vec<String>, ReaderError>;

    /// Runs a statement that selects the serialized span `model` column.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Query`] if execution fails and
    /// [`ReaderError::Scan`] if a row is not a single payload column.
    async fn fetch_payloads(&self, statement: &Statement) -> Result<Vec<Vec<u8>>, ReaderError>;
}

/// A serialized span read from the span table.
#[derive(clickhouse::Row, Deserialize)]
struct ModelRow {
    #[serde(deserialize_with = "deserialize_payload")]
    model: Vec<u8>,
}

// Binary payloads are not valid UTF-8, so the `String` column is read as raw bytes.
fn deserialize_payload<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    struct PayloadVisitor;

    impl Visitor<'_> for PayloadVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a serialized span payload")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.as_bytes().to_vec())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(v.into_bytes())
        }
    }

    deserializer.deserialize_byte_buf(PayloadVisitor)
}

/// `ClickHouse`-backed executor.
///
/// Arguments are bound to the statement's `?` placeholders by the client,
/// which escapes them.
#[derive(Clone)]
pub struct ClickHouseExecutor {
    client: Arc<clickhouse::Client>,
}

impl ClickHouseExecutor {
    /// Creates a new executor over the given client.
    #[must_use]
    pub fn new(client: Arc<clickhouse::Client>) -> Self {
        Self { client }
    }

    /// Creates a new executor wrapped in an Arc.
    #[must_use]
    pub fn new_shared(client: Arc<clickhouse::Client>) -> Arc<Self> {
        Arc::new(Self::new(client))
    }

    fn prepare(&self, statement: &Statement) -> clickhouse::query::Query {
        tracing::debug!(
            db.statement = statement.sql(),
            db.args = statement.args().len(),
            "Executing statement"
        );

        statement
            .args()
            .iter()
            .fold(self.client.query(statement.sql()), |query, arg| match arg {
                SqlArg::String(value) => query.bind(value.as_str()),
                SqlArg::Int(value) => query.bind(*value),
                SqlArg::UInt(value) => query.bind(*value),
            })
    }
}

/// Splits client errors into row-shape failures and execution failures.
fn classify(error: clickhouse::error::Error) -> ReaderError {
    use clickhouse::error::Error;

    match error {
        err @ (Error::NotEnoughData | Error::InvalidUtf8Encoding(_) | Error::InvalidTagEncoding(_)) => {
            ReaderError::Scan(err.to_string())
        }
        err => ReaderError::query(err),
    }
}

#[async_trait]
impl QueryExecutor for ClickHouseExecutor {
    async fn fetch_strings(&self, statement: &Statement) -> Result<Vec<String>, ReaderError> {
        self.prepare(statement)
            .fetch_all::<String>()
            .await
            .map_err(classify)
    }

    async fn fetch_payloads(&self, statement: &Statement) -> Result<Vec<Vec<u8>>, ReaderError> {
        let rows = self
            .prepare(statement)
            .fetch_all::<ModelRow>()
            .await
            .map_err(classify)?;

        Ok(rows.into_iter().map(|row| row.model).collect())
    }
}
