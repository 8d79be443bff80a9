//! Application state module.
//!
//! Defines the shared application state that is passed to route handlers.

use shared::config::{ReaderConfig, TableNames, DEFAULT_ARCHIVE_SPANS_TABLE};
use shared::storage::{InMemoryStore, QueryExecutor, TraceReader};
use std::sync::Arc;

/// Application state shared across all request handlers.
///
/// Readers hold only configuration and a shared executor, so cloning the
/// state per request is cheap.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Reader over the primary tables.
    reader: TraceReader,
    /// Reader over the archive span table, if configured.
    archive: Option<TraceReader>,
}

impl AppState {
    /// Creates a new application state with the given readers.
    #[must_use]
    pub fn new(reader: TraceReader, archive: Option<TraceReader>) -> Self {
        Self { reader, archive }
    }

    /// Creates readers for `config` over a shared executor.
    #[must_use]
    pub fn from_config(config: &ReaderConfig, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            reader: config.reader(Arc::clone(&executor)),
            archive: config.archive_reader(executor),
        }
    }

    /// Creates a new application state over a fresh in-memory store.
    ///
    /// This is useful for development and testing.
    #[must_use]
    pub fn with_in_memory_store() -> Self {
        Self::in_memory(InMemoryStore::new_shared(), InMemoryStore::new_shared())
    }

    /// Creates a state reading the primary tables from `store` and the
    /// archive table from `archive`.
    #[must_use]
    pub fn in_memory(store: Arc<InMemoryStore>, archive: Arc<InMemoryStore>) -> Self {
        Self {
            reader: TraceReader::new(store, TableNames::default()),
            archive: Some(TraceReader::archive(archive, DEFAULT_ARCHIVE_SPANS_TABLE)),
        }
    }

    /// Returns the primary reader.
    #[must_use]
    pub fn reader(&self) -> &TraceReader {
        &self.reader
    }

    /// Returns the archive reader, if one is configured.
    #[must_use]
    pub fn archive(&self) -> Option<&TraceReader> {
        self.archive.as_ref()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_in_memory_store()
    }
}
