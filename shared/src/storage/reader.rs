//! The trace reader facade.
//!
//! Implements the storage-reader contract (get trace, find trace IDs, find
//! traces, list services, list operations) on top of a [`QueryExecutor`].
//! Each operation issues at most two statements, one after the other.

use super::assembler::assemble;
use super::error::{MissingTable, ReaderError};
use super::executor::QueryExecutor;
use super::statement::Statement;
use crate::codec;
use crate::config::TableNames;
use crate::models::{Operation, Trace, TraceId, TraceQueryParameters};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Reads traces from the index, span and operations tables.
///
/// Holds only immutable configuration and a shared executor, so one reader
/// can serve concurrent requests. Dropping a returned future cancels the
/// statement it is running.
#[derive(Clone)]
pub struct TraceReader {
    executor: Arc<dyn QueryExecutor>,
    tables: TableNames,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for TraceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceReader")
            .field("tables", &self.tables)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TraceReader {
    /// Creates a reader over the given tables.
    ///
    /// Missing table names are reported when an operation needs them.
    #[must_use]
    pub fn new(executor: Arc<dyn QueryExecutor>, tables: TableNames) -> Self {
        Self {
            executor,
            tables,
            timeout: None,
        }
    }

    /// Creates a reader for the archive span table.
    ///
    /// Only trace lookups by ID are available; searches and listings fail
    /// with a configuration error.
    #[must_use]
    pub fn archive(executor: Arc<dyn QueryExecutor>, spans_table: impl Into<String>) -> Self {
        Self::new(
            executor,
            TableNames {
                operations: None,
                index: None,
                spans: Some(spans_table.into()),
            },
        )
    }

    /// Bounds every statement by `timeout`. Expiry is a query error.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the configured table names.
    #[must_use]
    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    fn table(name: Option<&str>, missing: MissingTable) -> Result<&str, ReaderError> {
        name.filter(|n| !n.is_empty())
            .ok_or(ReaderError::Configuration(missing))
    }

    async fn run<T, F>(&self, future: F) -> Result<T, ReaderError>
    where
        F: Future<Output = Result<T, ReaderError>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, future)
                .await
                .map_err(ReaderError::query)?,
            None => future.await,
        }
    }

    /// Fetches one trace by ID.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::TraceNotFound`] if no spans are stored for the
    /// ID, or any error of [`TraceReader::get_traces`].
    #[tracing::instrument(skip(self, trace_id), fields(trace_id = %trace_id))]
    pub async fn get_trace(&self, trace_id: TraceId) -> Result<Trace, ReaderError> {
        self.get_traces(&[trace_id])
            .await?
            .into_iter()
            .next()
            .ok_or(ReaderError::TraceNotFound(trace_id))
    }

    /// Fetches several traces with a single statement.
    ///
    /// Traces come back in `trace_ids` order; IDs with no stored spans are
    /// left out. An empty list returns immediately without a statement.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no span table is set, and propagates
    /// query, scan and decode errors. A payload that fails to decode fails
    /// the whole call.
    #[tracing::instrument(skip(self, trace_ids), fields(count = trace_ids.len()))]
    pub async fn get_traces(&self, trace_ids: &[TraceId]) -> Result<Vec<Trace>, ReaderError> {
        if trace_ids.is_empty() {
            return Ok(Vec::new());
        }

        let table = Self::table(self.tables.spans.as_deref(), MissingTable::Spans)?;

        let mut seen = HashSet::with_capacity(trace_ids.len());
        let requested: Vec<TraceId> = trace_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let statement = Statement::fetch_spans(table, &requested);
        let payloads = self.run(self.executor.fetch_payloads(&statement)).await?;

        let spans = payloads
            .iter()
            .map(|payload| {
                codec::decode(payload).map_err(|error| {
                    tracing::warn!(%error, bytes = payload.len(), "Failed to decode span payload");
                    ReaderError::from(error)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(assemble(&requested, spans))
    }

    /// Finds the IDs of traces matching `params`, newest first.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no index table is set, a scan error
    /// if a stored trace ID does not parse, and propagates query errors.
    #[tracing::instrument(skip(self, params), fields(service = %params.service_name))]
    pub async fn find_trace_ids(
        &self,
        params: &TraceQueryParameters,
    ) -> Result<Vec<TraceId>, ReaderError> {
        let table = Self::table(self.tables.index.as_deref(), MissingTable::Index)?;

        let statement = Statement::find_trace_ids(table, params);
        let rows = self.run(self.executor.fetch_strings(&statement)).await?;

        rows.iter()
            .map(|row| {
                row.parse()
                    .map_err(|e| ReaderError::Scan(format!("invalid trace ID {row:?}: {e}")))
            })
            .collect()
    }

    /// Finds traces matching `params`, in the order of
    /// [`TraceReader::find_trace_ids`].
    ///
    /// # Errors
    ///
    /// Propagates errors from both the search and the batch fetch.
    #[tracing::instrument(skip(self, params), fields(service = %params.service_name))]
    pub async fn find_traces(
        &self,
        params: &TraceQueryParameters,
    ) -> Result<Vec<Trace>, ReaderError> {
        let trace_ids = self.find_trace_ids(params).await?;
        self.get_traces(&trace_ids).await
    }

    /// Lists the services that have recorded operations.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no operations table is set, and
    /// propagates query and scan errors.
    #[tracing::instrument(skip(self))]
    pub async fn get_services(&self) -> Result<Vec<String>, ReaderError> {
        let table = Self::table(self.tables.operations.as_deref(), MissingTable::Operations)?;

        let statement = Statement::services(table);
        self.run(self.executor.fetch_strings(&statement)).await
    }

    /// Lists the operations recorded for `service`.
    ///
    /// An unknown service yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no operations table is set, and
    /// propagates query and scan errors.
    #[tracing::instrument(skip(self))]
    pub async fn get_operations(&self, service: &str) -> Result<Vec<Operation>, ReaderError> {
        let table = Self::table(self.tables.operations.as_deref(), MissingTable::Operations)?;

        let statement = Statement::operations(table, service);
        let names = self.run(self.executor.fetch_strings(&statement)).await?;

        Ok(names
            .into_iter()
            .map(|name| Operation {
                service: service.to_string(),
                name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, PayloadEncoding};
    use crate::models::{Span, SpanId};
    use crate::storage::statement::{Plan, SqlArg};
    use crate::storage::testing::RecordingExecutor;

    fn tables() -> TableNames {
        TableNames {
            operations: Some("ops".to_string()),
            index: Some("idx".to_string()),
            spans: Some("spans".to_string()),
        }
    }

    fn reader(executor: &Arc<RecordingExecutor>) -> TraceReader {
        TraceReader::new(Arc::clone(executor) as Arc<dyn QueryExecutor>, tables())
    }

    fn payload(trace: TraceId, span: u64, encoding: PayloadEncoding) -> Vec<u8> {
        encode(&Span::new(trace, SpanId(span), "op", "api"), encoding).unwrap()
    }

    #[tokio::test]
    async fn test_get_trace_issues_single_element_batch() {
        let id = TraceId::new(0, 0xabc);
        let executor = Arc::new(RecordingExecutor::new().with_payloads(vec![
            payload(id, 1, PayloadEncoding::Protobuf),
            payload(id, 2, PayloadEncoding::Json),
        ]));

        let trace = reader(&executor).get_trace(id).await.unwrap();

        assert_eq!(trace.span_count(), 2);
        let statements = executor.statements();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql(),
            "SELECT model FROM spans WHERE traceID IN (?)"
        );
        assert_eq!(
            statements[0].args(),
            &[SqlArg::String("0000000000000abc".to_string())]
        );
    }

    #[tokio::test]
    async fn test_get_trace_without_rows_is_not_found() {
        let id = TraceId::new(0, 1);
        let executor = Arc::new(RecordingExecutor::new().with_payloads(Vec::new()));

        let err = reader(&executor).get_trace(id).await.unwrap_err();

        assert!(matches!(err, ReaderError::TraceNotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn test_get_trace_propagates_query_error() {
        let executor = Arc::new(RecordingExecutor::new());

        let err = reader(&executor)
            .get_trace(TraceId::new(0, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, ReaderError::Query { .. }));
    }

    #[tokio::test]
    async fn test_undecodable_payload_fails_whole_request() {
        let id = TraceId::new(0, 1);
        let executor = Arc::new(RecordingExecutor::new().with_payloads(vec![
            payload(id, 1, PayloadEncoding::Protobuf),
            b"{broken".to_vec(),
        ]));

        let err = reader(&executor).get_traces(&[id]).await.unwrap_err();

        assert!(matches!(err, ReaderError::Decode(_)));
    }

    #[tokio::test]
    async fn test_get_traces_deduplicates_requested_ids() {
        let a = TraceId::new(0, 1);
        let b = TraceId::new(0, 2);
        let executor = Arc::new(RecordingExecutor::new().with_payloads(vec![
            payload(a, 1, PayloadEncoding::Protobuf),
            payload(b, 2, PayloadEncoding::Protobuf),
        ]));

        let traces = reader(&executor).get_traces(&[b, a, b]).await.unwrap();

        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].trace_id(), Some(b));
        assert_eq!(executor.statements()[0].args().len(), 2);
    }

    #[tokio::test]
    async fn test_get_traces_requires_span_table() {
        let executor = Arc::new(RecordingExecutor::new());
        let reader = TraceReader::new(
            Arc::clone(&executor) as Arc<dyn QueryExecutor>,
            TableNames {
                spans: None,
                ..tables()
            },
        );

        let err = reader.get_traces(&[TraceId::new(0, 1)]).await.unwrap_err();

        assert!(matches!(
            err,
            ReaderError::Configuration(MissingTable::Spans)
        ));
        assert!(executor.statements().is_empty());
    }

    #[tokio::test]
    async fn test_find_trace_ids_parses_rows_in_order() {
        let executor = Arc::new(
            RecordingExecutor::new().with_strings(&["00000000000000030000000000000001", "02"]),
        );

        let ids = reader(&executor)
            .find_trace_ids(&TraceQueryParameters::new("api"))
            .await
            .unwrap();

        assert_eq!(ids, vec![TraceId::new(3, 1), TraceId::new(0, 2)]);
        assert!(matches!(
            executor.statements()[0].plan(),
            Plan::FindTraceIds { table, .. } if table == "idx"
        ));
    }

    #[tokio::test]
    async fn test_find_trace_ids_rejects_malformed_id() {
        let executor = Arc::new(RecordingExecutor::new().with_strings(&["not-hex"]));

        let err = reader(&executor)
            .find_trace_ids(&TraceQueryParameters::new("api"))
            .await
            .unwrap_err();

        assert!(matches!(err, ReaderError::Scan(_)));
    }

    #[tokio::test]
    async fn test_find_trace_ids_requires_index_table() {
        let executor = Arc::new(RecordingExecutor::new());
        let reader = TraceReader::new(
            Arc::clone(&executor) as Arc<dyn QueryExecutor>,
            TableNames {
                index: None,
                ..tables()
            },
        );

        let err = reader
            .find_trace_ids(&TraceQueryParameters::new("api"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReaderError::Configuration(MissingTable::Index)
        ));
        assert!(executor.statements().is_empty());
    }

    #[tokio::test]
    async fn test_empty_table_name_is_missing() {
        let executor = Arc::new(RecordingExecutor::new());
        let reader = TraceReader::new(
            Arc::clone(&executor) as Arc<dyn QueryExecutor>,
            TableNames {
                index: Some(String::new()),
                ..tables()
            },
        );

        let err = reader
            .find_trace_ids(&TraceQueryParameters::new("api"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReaderError::Configuration(MissingTable::Index)
        ));
    }

    #[tokio::test]
    async fn test_find_traces_skips_batch_when_no_ids() {
        // No payload response is queued, so a batch statement would fail.
        let executor = Arc::new(RecordingExecutor::new().with_strings(&[]));

        let traces = reader(&executor)
            .find_traces(&TraceQueryParameters::new("api"))
            .await
            .unwrap();

        assert!(traces.is_empty());
        assert_eq!(executor.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_find_traces_preserves_search_order() {
        let newest = TraceId::new(0, 0xb);
        let older = TraceId::new(0, 0xa);
        // The span table scans in trace ID order, not search order.
        let executor = Arc::new(
            RecordingExecutor::new()
                .with_strings(&["000000000000000b", "000000000000000a"])
                .with_payloads(vec![
                    payload(older, 1, PayloadEncoding::Json),
                    payload(newest, 2, PayloadEncoding::Protobuf),
                    payload(older, 3, PayloadEncoding::Protobuf),
                ]),
        );

        let traces = reader(&executor)
            .find_traces(&TraceQueryParameters::new("api"))
            .await
            .unwrap();

        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].trace_id(), Some(newest));
        assert_eq!(traces[1].trace_id(), Some(older));
        assert_eq!(traces[1].span_count(), 2);

        let statements = executor.statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[1].sql(),
            "SELECT model FROM spans WHERE traceID IN (?, ?)"
        );
    }

    #[tokio::test]
    async fn test_find_traces_propagates_search_error() {
        let executor = Arc::new(
            RecordingExecutor::new().with_strings_error(ReaderError::query("connection refused")),
        );

        let err = reader(&executor)
            .find_traces(&TraceQueryParameters::new("api"))
            .await
            .unwrap_err();

        assert!(matches!(err, ReaderError::Query { .. }));
        assert_eq!(executor.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_get_services() {
        let executor = Arc::new(RecordingExecutor::new().with_strings(&["api", "web"]));

        let services = reader(&executor).get_services().await.unwrap();

        assert_eq!(services, vec!["api", "web"]);
        assert_eq!(
            executor.statements()[0].sql(),
            "SELECT service FROM ops GROUP BY service"
        );
    }

    #[tokio::test]
    async fn test_get_services_requires_operations_table() {
        let executor = Arc::new(RecordingExecutor::new());
        let reader = TraceReader::new(
            Arc::clone(&executor) as Arc<dyn QueryExecutor>,
            TableNames {
                operations: None,
                ..tables()
            },
        );

        let services = reader.get_services().await;
        let operations = reader.get_operations("api").await;

        assert!(matches!(
            services,
            Err(ReaderError::Configuration(MissingTable::Operations))
        ));
        assert!(matches!(
            operations,
            Err(ReaderError::Configuration(MissingTable::Operations))
        ));
    }

    #[tokio::test]
    async fn test_get_operations() {
        let executor = Arc::new(RecordingExecutor::new().with_strings(&["GET /", "POST /"]));

        let operations = reader(&executor).get_operations("api").await.unwrap();

        assert_eq!(
            operations,
            vec![
                Operation {
                    service: "api".to_string(),
                    name: "GET /".to_string()
                },
                Operation {
                    service: "api".to_string(),
                    name: "POST /".to_string()
                },
            ]
        );
        assert_eq!(
            executor.statements()[0].args(),
            &[SqlArg::String("api".to_string())]
        );
    }

    #[tokio::test]
    async fn test_get_operations_for_unknown_service_is_empty() {
        let executor = Arc::new(RecordingExecutor::new().with_strings(&[]));

        let operations = reader(&executor).get_operations("nobody").await.unwrap();

        assert!(operations.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_a_query_error() {
        let executor = Arc::new(
            RecordingExecutor::new()
                .with_strings(&["api"])
                .with_delay(Duration::from_secs(5)),
        );

        let err = reader(&executor)
            .with_timeout(Duration::from_millis(10))
            .get_services()
            .await
            .unwrap_err();

        assert!(matches!(err, ReaderError::Query { .. }));
    }

    #[tokio::test]
    async fn test_archive_reader_only_serves_lookups() {
        let id = TraceId::new(0, 5);
        let executor = Arc::new(
            RecordingExecutor::new().with_payloads(vec![payload(id, 1, PayloadEncoding::Json)]),
        );
        let reader = TraceReader::archive(
            Arc::clone(&executor) as Arc<dyn QueryExecutor>,
            "jaeger_archive_spans_local",
        );

        let trace = reader.get_trace(id).await.unwrap();
        let search = reader.find_traces(&TraceQueryParameters::new("api")).await;

        assert_eq!(trace.span_count(), 1);
        assert!(matches!(
            search,
            Err(ReaderError::Configuration(MissingTable::Index))
        ));
        assert_eq!(
            executor.statements()[0].sql(),
            "SELECT model FROM jaeger_archive_spans_local WHERE traceID IN (?)"
        );
    }
}
