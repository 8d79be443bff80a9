//! Trace and span data models.
//!
//! Defines the span model stored in the span table's `model` column and the
//! trace grouping the reader hands back to callers. The serde representation
//! of [`Span`] is the response shape of the query API; stored payloads go
//! through [`crate::codec`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when parsing a trace or span identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// The identifier string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The identifier has more hex digits than fit into the ID type.
    #[error("ID is too long: {len} hex digits, at most {max} allowed")]
    TooLong {
        /// Number of digits supplied.
        len: usize,
        /// Maximum number of digits accepted.
        max: usize,
    },

    /// The identifier contains a non-hex character.
    #[error("ID is not valid hex: {0}")]
    InvalidHex(String),

    /// A binary identifier has the wrong byte length.
    #[error("ID must be {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected byte length.
        expected: usize,
        /// Supplied byte length.
        actual: usize,
    },
}

fn parse_hex_u64(digits: &str) -> Result<u64, IdParseError> {
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(IdParseError::InvalidHex(digits.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| IdParseError::InvalidHex(digits.to_string()))
}

/// A 128-bit trace identifier.
///
/// The string form is the one written to the `traceID` columns: 16 hex
/// digits of `low` when `high` is zero, otherwise 32 hex digits of
/// `high` followed by `low`.
///
/// # Example
///
/// ```
/// use shared::models::TraceId;
///
/// let id: TraceId = "00000000000000010000000000000002".parse().unwrap();
/// assert_eq!(id, TraceId::new(1, 2));
/// assert_eq!(id.to_string(), "00000000000000010000000000000002");
///
/// let short = TraceId::new(0, 0xabc);
/// assert_eq!(short.to_string(), "0000000000000abc");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct TraceId {
    /// Upper 64 bits.
    pub high: u64,
    /// Lower 64 bits.
    pub low: u64,
}

impl TraceId {
    /// Creates a trace ID from its two halves.
    #[must_use]
    pub const fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }

    /// Returns the big-endian 16-byte form used by the binary payload encoding.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.high.to_be_bytes());
        bytes[8..].copy_from_slice(&self.low.to_be_bytes());
        bytes
    }

    /// Parses the big-endian 16-byte form.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not exactly 16 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdParseError> {
        let bytes: [u8; 16] = bytes.try_into().map_err(|_| IdParseError::InvalidLength {
            expected: 16,
            actual: bytes.len(),
        })?;
        let mut high = [0u8; 8];
        let mut low = [0u8; 8];
        high.copy_from_slice(&bytes[..8]);
        low.copy_from_slice(&bytes[8..]);
        Ok(Self {
            high: u64::from_be_bytes(high),
            low: u64::from_be_bytes(low),
        })
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.high == 0 {
            write!(f, "{:016x}", self.low)
        } else {
            write!(f, "{:016x}{:016x}", self.high, self.low)
        }
    }
}

impl FromStr for TraceId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdParseError::Empty);
        }
        if s.len() > 32 {
            return Err(IdParseError::TooLong {
                len: s.len(),
                max: 32,
            });
        }
        if !s.is_ascii() {
            return Err(IdParseError::InvalidHex(s.to_string()));
        }

        if s.len() > 16 {
            let (high, low) = s.split_at(s.len() - 16);
            Ok(Self {
                high: parse_hex_u64(high)?,
                low: parse_hex_u64(low)?,
            })
        } else {
            Ok(Self {
                high: 0,
                low: parse_hex_u64(s)?,
            })
        }
    }
}

impl TryFrom<String> for TraceId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TraceId> for String {
    fn from(id: TraceId) -> Self {
        id.to_string()
    }
}

/// A 64-bit span identifier, rendered as 16 hex digits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct SpanId(pub u64);

impl SpanId {
    /// Parses the big-endian 8-byte form used by the binary payload encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not exactly 8 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdParseError> {
        let bytes: [u8; 8] = bytes.try_into().map_err(|_| IdParseError::InvalidLength {
            expected: 8,
            actual: bytes.len(),
        })?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdParseError::Empty);
        }
        if s.len() > 16 {
            return Err(IdParseError::TooLong {
                len: s.len(),
                max: 16,
            });
        }
        parse_hex_u64(s).map(Self)
    }
}

impl TryFrom<String> for SpanId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SpanId> for String {
    fn from(id: SpanId) -> Self {
        id.to_string()
    }
}

/// Typed value of a tag or log field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "vType", content = "value", rename_all = "lowercase")]
pub enum TagValue {
    /// A string value.
    String(String),
    /// A boolean value.
    Bool(bool),
    /// A signed integer value.
    Int64(i64),
    /// A floating point value.
    Float64(f64),
    /// Raw bytes, base64 in JSON.
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl TagValue {
    /// Renders the value the way the index table's `tags` column stores it.
    ///
    /// Binary values are rendered as lowercase hex.
    #[must_use]
    pub fn as_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Int64(i) => i.to_string(),
            Self::Float64(f) => f.to_string(),
            Self::Binary(bytes) => hex::encode(bytes),
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<Vec<u8>> for TagValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

/// A key with a typed value, used for span tags, process tags and log fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    /// The tag key.
    pub key: String,
    /// The tag value.
    #[serde(flatten)]
    pub value: TagValue,
}

impl KeyValue {
    /// Creates a new key/value pair.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns the `key=value` form matched by the index table's tag filter.
    #[must_use]
    pub fn index_entry(&self) -> String {
        format!("{}={}", self.key, self.value.as_string())
    }
}

/// The relationship a span has with another span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanRefType {
    /// The referenced span is the parent of this span.
    #[default]
    ChildOf,
    /// The referenced span causally precedes this span.
    FollowsFrom,
}

/// A reference from one span to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRef {
    /// Trace of the referenced span.
    #[serde(rename = "traceID")]
    pub trace_id: TraceId,
    /// The referenced span.
    #[serde(rename = "spanID")]
    pub span_id: SpanId,
    /// Kind of reference.
    pub ref_type: SpanRefType,
}

/// A timestamped set of fields recorded during a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    /// When the log was recorded.
    pub timestamp: DateTime<Utc>,
    /// The recorded fields.
    #[serde(default)]
    pub fields: Vec<KeyValue>,
}

/// The process that emitted a span.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    /// Name of the service the process belongs to.
    pub service_name: String,
    /// Process-level tags.
    #[serde(default)]
    pub tags: Vec<KeyValue>,
}

/// A span representing a unit of work in a distributed trace.
///
/// # Example
///
/// ```
/// use shared::models::{Span, SpanId, TraceId};
/// use std::time::Duration;
///
/// let span = Span::new(TraceId::new(0, 1), SpanId(2), "GET /api/users", "api-service")
///     .with_duration(Duration::from_millis(15))
///     .with_tag("http.method", "GET")
///     .with_tag("http.status_code", 200_i64);
///
/// assert_eq!(span.service_name(), "api-service");
/// assert_eq!(span.duration_micros(), 15_000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    /// Identifier of the trace this span belongs to.
    #[serde(rename = "traceID")]
    pub trace_id: TraceId,

    /// Identifier of this span.
    #[serde(rename = "spanID")]
    pub span_id: SpanId,

    /// The operation this span represents.
    pub operation_name: String,

    /// References to other spans.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<SpanRef>,

    /// Sampling and debug flags.
    #[serde(default)]
    pub flags: u32,

    /// When the span started.
    pub start_time: DateTime<Utc>,

    /// How long the span took.
    #[serde(with = "duration_nanos")]
    pub duration: Duration,

    /// Span tags.
    #[serde(default)]
    pub tags: Vec<KeyValue>,

    /// Logs recorded during the span.
    #[serde(default)]
    pub logs: Vec<Log>,

    /// The emitting process.
    #[serde(default)]
    pub process: Process,

    /// Process identifier within a batch, usually empty once stored.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub process_id: String,

    /// Warnings attached while the span was collected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Span {
    /// Creates a span starting now with zero duration.
    #[must_use]
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        operation_name: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            operation_name: operation_name.into(),
            references: Vec::new(),
            flags: 0,
            start_time: Utc::now(),
            duration: Duration::ZERO,
            tags: Vec::new(),
            logs: Vec::new(),
            process: Process {
                service_name: service_name.into(),
                tags: Vec::new(),
            },
            process_id: String::new(),
            warnings: Vec::new(),
        }
    }

    /// Makes this span a child of `parent` within the same trace.
    #[must_use]
    pub fn with_parent(mut self, parent: SpanId) -> Self {
        self.references.push(SpanRef {
            trace_id: self.trace_id,
            span_id: parent,
            ref_type: SpanRefType::ChildOf,
        });
        self
    }

    /// Adds a reference to another span.
    #[must_use]
    pub fn with_reference(mut self, reference: SpanRef) -> Self {
        self.references.push(reference);
        self
    }

    /// Sets the start time.
    #[must_use]
    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the flags.
    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Adds a span tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.push(KeyValue::new(key, value));
        self
    }

    /// Adds a process tag.
    #[must_use]
    pub fn with_process_tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.process.tags.push(KeyValue::new(key, value));
        self
    }

    /// Adds a log entry.
    #[must_use]
    pub fn with_log(mut self, timestamp: DateTime<Utc>, fields: Vec<KeyValue>) -> Self {
        self.logs.push(Log { timestamp, fields });
        self
    }

    /// Adds a warning.
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Returns the name of the service that emitted this span.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.process.service_name
    }

    /// Returns the parent span ID, taken from the first `CHILD_OF` reference
    /// within the same trace.
    #[must_use]
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.references
            .iter()
            .find(|r| r.ref_type == SpanRefType::ChildOf && r.trace_id == self.trace_id)
            .map(|r| r.span_id)
    }

    /// Returns true if this is a root span (no parent).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_span_id().is_none()
    }

    /// Returns the duration in whole microseconds, as stored in `durationUs`.
    #[must_use]
    pub fn duration_micros(&self) -> i64 {
        i64::try_from(self.duration.as_micros()).unwrap_or(i64::MAX)
    }

    /// Returns the deduplicated `key=value` entries the index table keeps
    /// for this span: span tags, process tags and log fields.
    #[must_use]
    pub fn index_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .tags
            .iter()
            .chain(&self.process.tags)
            .chain(self.logs.iter().flat_map(|log| &log.fields))
            .map(KeyValue::index_entry)
            .collect();
        tags.sort_unstable();
        tags.dedup();
        tags
    }
}

/// A trace consisting of one or more spans sharing a trace ID.
///
/// Spans keep the order in which they were read from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// All spans in this trace.
    pub spans: Vec<Span>,

    /// Trace-level warnings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Trace {
    /// Creates a trace holding a single span.
    #[must_use]
    pub fn from_span(span: Span) -> Self {
        Self {
            spans: vec![span],
            warnings: Vec::new(),
        }
    }

    /// Creates a trace from a collection of spans, or `None` if it is empty.
    #[must_use]
    pub fn from_spans(spans: Vec<Span>) -> Option<Self> {
        if spans.is_empty() {
            return None;
        }

        Some(Self {
            spans,
            warnings: Vec::new(),
        })
    }

    /// Appends a span.
    pub fn push(&mut self, span: Span) {
        self.spans.push(span);
    }

    /// Returns the trace ID of the first span.
    #[must_use]
    pub fn trace_id(&self) -> Option<TraceId> {
        self.spans.first().map(|s| s.trace_id)
    }

    /// Returns the first root span if it exists.
    #[must_use]
    pub fn root_span(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.is_root())
    }

    /// Returns the number of spans in this trace.
    #[must_use]
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// Returns all services involved in this trace.
    #[must_use]
    pub fn services(&self) -> Vec<&str> {
        let mut services: Vec<&str> = self.spans.iter().map(Span::service_name).collect();
        services.sort_unstable();
        services.dedup();
        services
    }
}

/// Serializes a [`Duration`] as integer nanoseconds.
mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(duration.as_nanos()).map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}

/// Serializes bytes as standard base64.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
