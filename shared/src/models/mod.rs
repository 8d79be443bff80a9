//! Data models for the Spanhouse trace reader.
//!
//! This module contains the span and trace structures rebuilt from stored
//! rows and the parameter types used to search for them.

pub mod query;
pub mod trace;

pub use query::{
    parse_duration, DurationParseError, Operation, TraceQueryParameters, DEFAULT_NUM_TRACES,
};
pub use trace::{
    IdParseError, KeyValue, Log, Process, Span, SpanId, SpanRef, SpanRefType, TagValue, Trace,
    TraceId,
};
