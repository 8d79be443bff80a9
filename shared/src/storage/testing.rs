//! Test doubles for the executor seam.

use super::statement::Statement;
use super::{QueryExecutor, ReaderError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

type Queue<T> = Mutex<VecDeque<Result<T, ReaderError>>>;

/// Records every statement and replays queued responses in order.
///
/// A statement with no queued response fails with a query error.
#[derive(Default)]
pub(crate) struct RecordingExecutor {
    statements: Mutex<Vec<Statement>>,
    strings: Queue<Vec<String>>,
    payloads: Queue<Vec<Vec<u8>>>,
    delay: Option<Duration>,
}

impl RecordingExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_strings(mut self, rows: &[&str]) -> Self {
        let rows = rows.iter().map(ToString::to_string).collect();
        self.strings.get_mut().unwrap().push_back(Ok(rows));
        self
    }

    pub(crate) fn with_strings_error(mut self, error: ReaderError) -> Self {
        self.strings.get_mut().unwrap().push_back(Err(error));
        self
    }

    pub(crate) fn with_payloads(mut self, rows: Vec<Vec<u8>>) -> Self {
        self.payloads.get_mut().unwrap().push_back(Ok(rows));
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn statements(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }

    async fn respond<T>(&self, statement: &Statement, queue: &Queue<T>) -> Result<T, ReaderError> {
        self.statements.lock().unwrap().push(statement.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let response = queue.lock().unwrap().pop_front();
        response.unwrap_or_else(|| {
            Err(ReaderError::query(format!(
                "unexpected statement: {}",
                statement.sql()
            )))
        })
    }
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn fetch_strings(&self, statement: &Statement) -> Result<Vec<String>, ReaderError> {
        self.respond(statement, &self.strings).await
    }

    async fn fetch_payloads(&self, statement: &Statement) -> Result<Vec<Vec<u8>>, ReaderError> {
        self.respond(statement, &self.payloads).await
    }
}
