//! Errors returned by the trace reader.

use crate::codec::DecodeError;
use crate::models::{IdParseError, TraceId};
use std::fmt;
use thiserror::Error;

/// Boxed error cause carried by [`ReaderError::Query`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A backing table the reader needs but was not configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissingTable {
    /// The operations table, used to enumerate services and operations.
    Operations,
    /// The index table, used to search for trace IDs.
    Index,
    /// The span table, used to fetch span payloads.
    Spans,
}

impl fmt::Display for MissingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operations => write!(f, "no operations table supplied"),
            Self::Index => write!(f, "no index table supplied"),
            Self::Spans => write!(f, "no spans table supplied"),
        }
    }
}

/// Errors that can occur while reading traces.
///
/// No variant is retried internally and no partial result accompanies an
/// error.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// A required table name was not configured.
    #[error("Configuration error: {0}")]
    Configuration(MissingTable),

    /// The statement failed to execute, including cancellation and timeouts.
    #[error("Query failed: {source}")]
    Query {
        /// The underlying transport or server error.
        #[source]
        source: BoxError,
    },

    /// A returned row did not have the expected column shape.
    #[error("Failed to scan row: {0}")]
    Scan(String),

    /// A stored span payload matched neither supported encoding.
    #[error("Failed to decode span: {0}")]
    Decode(#[from] DecodeError),

    /// The requested trace has no stored spans.
    #[error("Trace not found: {0}")]
    TraceNotFound(TraceId),

    /// A caller-supplied trace ID is not valid.
    #[error("Invalid trace ID {input:?}: {source}")]
    InvalidTraceId {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        #[source]
        source: IdParseError,
    },
}

impl ReaderError {
    /// Wraps an execution failure.
    pub fn query(source: impl Into<BoxError>) -> Self {
        Self::Query {
            source: source.into(),
        }
    }

    /// Returns true if this error means the trace does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TraceNotFound(_))
    }
}
