//! Spanhouse Shared Library
//!
//! This crate contains the read path of the Spanhouse trace storage backend:
//! the span model, the stored payload codec, the query builder and the
//! trace reader facade.
//!
//! # Modules
//!
//! - [`models`] - Span, trace and query parameter models
//! - [`codec`] - Span payload decoding (JSON and protobuf)
//! - [`storage`] - Statement building, execution and the trace reader
//! - [`config`] - Database connection and table settings
//!
//! # Example
//!
//! ```
//! use shared::config::TableNames;
//! use shared::models::{Span, SpanId, TraceId};
//! use shared::storage::{InMemoryStore, TraceReader};
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryStore::new_shared();
//! let trace_id = TraceId::new(0, 0xabc);
//! store
//!     .insert_span(&Span::new(trace_id, SpanId(1), "GET /users", "api"))
//!     .unwrap();
//!
//! let reader = TraceReader::new(store, TableNames::default());
//! let trace = reader.get_trace(trace_id).await.unwrap();
//!
//! assert_eq!(trace.span_count(), 1);
//! assert_eq!(reader.get_services().await.unwrap(), vec!["api"]);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod codec;
pub mod config;
pub mod models;
pub mod storage;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use validator;
