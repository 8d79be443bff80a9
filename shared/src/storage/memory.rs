//! In-memory executor for development and testing.
//!
//! Keeps the three tables in process memory and answers statements by
//! evaluating their [`Plan`] with the same semantics as the SQL text.

use super::executor::QueryExecutor;
use super::statement::{Plan, Predicate, Statement};
use super::ReaderError;
use crate::codec::{self, PayloadEncoding};
use crate::models::{Span, TraceId};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors that can occur while loading the in-memory store.
#[derive(Debug, Error)]
pub enum InMemoryStoreError {
    /// Failed to acquire lock on the store.
    #[error("Failed to acquire lock on in-memory store")]
    LockError,

    /// The span could not be serialized.
    #[error("Failed to encode span: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One row of the index table.
#[derive(Debug, Clone)]
struct IndexRow {
    timestamp: DateTime<Utc>,
    trace_id: String,
    service: String,
    operation: String,
    duration_us: i64,
    tags: Vec<String>,
}

impl IndexRow {
    fn from_span(span: &Span) -> Self {
        Self {
            // The index column keeps microseconds.
            timestamp: span.start_time.trunc_subsecs(6),
            trace_id: span.trace_id.to_string(),
            service: span.service_name().to_string(),
            operation: span.operation_name.clone(),
            duration_us: span.duration_micros(),
            tags: span.index_tags(),
        }
    }

    fn matches(&self, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::Service(service) => &self.service == service,
            Predicate::Operation(operation) => &self.operation == operation,
            Predicate::StartTimeMin(min) => self.timestamp >= min.trunc_subsecs(6),
            Predicate::StartTimeMax(max) => self.timestamp <= max.trunc_subsecs(6),
            Predicate::DurationMin(min) => self.duration_us >= *min,
            Predicate::DurationMax(max) => self.duration_us <= *max,
            Predicate::Tag(entry) => self.tags.contains(entry),
        }
    }
}

/// In-memory stand-in for the index, span and operations tables.
///
/// Spans are stored serialized, so reads go through the same payload
/// decoding as the `ClickHouse` executor.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    index: RwLock<Vec<IndexRow>>,
    /// Payloads keyed by stored trace ID, scanned in key order.
    spans: RwLock<BTreeMap<String, Vec<Vec<u8>>>>,
    operations: RwLock<BTreeSet<(String, String)>>,
    encoding: PayloadEncoding,
}

impl InMemoryStore {
    /// Creates a new empty store that writes protobuf payloads.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty store wrapped in an Arc.
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Sets the encoding used for inserted spans.
    #[must_use]
    pub fn with_encoding(mut self, encoding: PayloadEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Writes a span to all three tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the span cannot be encoded or a lock is poisoned.
    pub fn insert_span(&self, span: &Span) -> Result<(), InMemoryStoreError> {
        let payload = codec::encode(span, self.encoding)?;

        self.insert_payload(span.trace_id, payload)?;
        self.index
            .write()
            .map_err(|_| InMemoryStoreError::LockError)?
            .push(IndexRow::from_span(span));
        self.operations
            .write()
            .map_err(|_| InMemoryStoreError::LockError)?
            .insert((
                span.service_name().to_string(),
                span.operation_name.clone(),
            ));

        Ok(())
    }

    /// Writes several spans.
    ///
    /// # Errors
    ///
    /// Stops at the first span that fails to insert.
    pub fn insert_spans<'a>(
        &self,
        spans: impl IntoIterator<Item = &'a Span>,
    ) -> Result<(), InMemoryStoreError> {
        spans.into_iter().try_for_each(|span| self.insert_span(span))
    }

    /// Writes a raw payload to the span table only.
    ///
    /// Useful for rows written by other encoders, or damaged rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_payload(
        &self,
        trace_id: TraceId,
        payload: Vec<u8>,
    ) -> Result<(), InMemoryStoreError> {
        self.spans
            .write()
            .map_err(|_| InMemoryStoreError::LockError)?
            .entry(trace_id.to_string())
            .or_default()
            .push(payload);
        Ok(())
    }

    /// Returns the number of stored span payloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn span_count(&self) -> Result<usize, InMemoryStoreError> {
        let spans = self.spans.read().map_err(|_| InMemoryStoreError::LockError)?;
        Ok(spans.values().map(Vec::len).sum())
    }

    fn find_trace_ids(
        &self,
        predicates: &[Predicate],
        limit: u32,
    ) -> Result<Vec<String>, ReaderError> {
        let index = self.index.read().map_err(|_| poisoned())?;

        let mut rows: Vec<&IndexRow> = index
            .iter()
            .filter(|row| predicates.iter().all(|p| row.matches(p)))
            .collect();
        rows.sort_by(|a, b| {
            b.service
                .cmp(&a.service)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });

        let mut seen = HashSet::new();
        Ok(rows
            .into_iter()
            .filter(|row| seen.insert(row.trace_id.as_str()))
            .take(limit as usize)
            .map(|row| row.trace_id.clone())
            .collect())
    }

    fn services(&self) -> Result<Vec<String>, ReaderError> {
        let operations = self.operations.read().map_err(|_| poisoned())?;
        let services: BTreeSet<&String> = operations.iter().map(|(service, _)| service).collect();
        Ok(services.into_iter().cloned().collect())
    }

    fn operations(&self, service: &str) -> Result<Vec<String>, ReaderError> {
        let operations = self.operations.read().map_err(|_| poisoned())?;
        Ok(operations
            .iter()
            .filter(|(s, _)| s == service)
            .map(|(_, operation)| operation.clone())
            .collect())
    }

    fn payloads(&self, trace_ids: &[String]) -> Result<Vec<Vec<u8>>, ReaderError> {
        let spans = self.spans.read().map_err(|_| poisoned())?;
        let requested: HashSet<&str> = trace_ids.iter().map(String::as_str).collect();

        Ok(spans
            .iter()
            .filter(|(trace_id, _)| requested.contains(trace_id.as_str()))
            .flat_map(|(_, payloads)| payloads.iter().cloned())
            .collect())
    }
}

fn poisoned() -> ReaderError {
    ReaderError::query(InMemoryStoreError::LockError)
}

fn wrong_shape(statement: &Statement) -> ReaderError {
    ReaderError::Scan(format!(
        "unexpected column type for statement: {}",
        statement.sql()
    ))
}

#[async_trait]
impl QueryExecutor for InMemoryStore {
    async fn fetch_strings(&self, statement: &Statement) -> Result<Vec<String>, ReaderError> {
        match statement.plan() {
            Plan::FindTraceIds {
                predicates, limit, ..
            } => self.find_trace_ids(predicates, *limit),
            Plan::Services { .. } => self.services(),
            Plan::Operations { service, .. } => self.operations(service),
            Plan::FetchSpans { .. } => Err(wrong_shape(statement)),
        }
    }

    async fn fetch_payloads(&self, statement: &Statement) -> Result<Vec<Vec<u8>>, ReaderError> {
        match statement.plan() {
            Plan::FetchSpans { trace_ids, .. } => self.payloads(trace_ids),
            _ => Err(wrong_shape(statement)),
        }
    }
}
