//! Query parameter models for trace searches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

/// Default number of traces returned by a search.
pub const DEFAULT_NUM_TRACES: u32 = 20;

/// Parameters for finding traces through the index table.
///
/// Unset or zero bounds are unbounded. Tags are equality constraints that
/// must all hold; they are kept ordered so the generated statement is
/// deterministic.
///
/// # Example
///
/// ```
/// use shared::models::TraceQueryParameters;
/// use std::time::Duration;
///
/// let params = TraceQueryParameters::new("api")
///     .with_operation("GET /users")
///     .with_duration_min(Duration::from_millis(100))
///     .with_tag("error", "true")
///     .with_num_traces(50);
///
/// assert_eq!(params.service_name, "api");
/// assert_eq!(params.tags.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct TraceQueryParameters {
    /// Service to search in. Required.
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Operation to match exactly. An empty name is treated as unset.
    pub operation_name: Option<String>,

    /// Tag equality constraints.
    pub tags: BTreeMap<String, String>,

    /// Earliest span start time (inclusive).
    pub start_time_min: Option<DateTime<Utc>>,

    /// Latest span start time (inclusive).
    pub start_time_max: Option<DateTime<Utc>>,

    /// Minimum span duration (inclusive). Zero is unbounded.
    pub duration_min: Option<Duration>,

    /// Maximum span duration (inclusive). Zero is unbounded.
    pub duration_max: Option<Duration>,

    /// Maximum number of trace IDs to return.
    #[validate(range(min = 1, message = "Number of traces must be positive"))]
    pub num_traces: u32,
}

impl Default for TraceQueryParameters {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            operation_name: None,
            tags: BTreeMap::new(),
            start_time_min: None,
            start_time_max: None,
            duration_min: None,
            duration_max: None,
            num_traces: DEFAULT_NUM_TRACES,
        }
    }
}

impl TraceQueryParameters {
    /// Creates parameters for the given service with default limits.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Sets the operation filter.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation_name = Some(operation.into());
        self
    }

    /// Adds a tag equality constraint.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sets the earliest start time.
    #[must_use]
    pub fn with_start_time_min(mut self, start: DateTime<Utc>) -> Self {
        self.start_time_min = Some(start);
        self
    }

    /// Sets the latest start time.
    #[must_use]
    pub fn with_start_time_max(mut self, end: DateTime<Utc>) -> Self {
        self.start_time_max = Some(end);
        self
    }

    /// Sets the minimum duration.
    #[must_use]
    pub fn with_duration_min(mut self, duration: Duration) -> Self {
        self.duration_min = Some(duration);
        self
    }

    /// Sets the maximum duration.
    #[must_use]
    pub fn with_duration_max(mut self, duration: Duration) -> Self {
        self.duration_max = Some(duration);
        self
    }

    /// Sets the maximum number of traces.
    #[must_use]
    pub fn with_num_traces(mut self, num_traces: u32) -> Self {
        self.num_traces = num_traces;
        self
    }
}

/// An operation recorded for a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    /// The service the operation belongs to.
    pub service: String,
    /// The operation name.
    pub name: String,
}

/// Errors that can occur when parsing a duration string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    /// The input was empty.
    #[error("Duration cannot be empty")]
    Empty,

    /// The numeric part could not be parsed.
    #[error("Invalid duration value: {0}")]
    InvalidNumber(String),

    /// The unit suffix is not recognised.
    #[error("Unknown duration unit in {0:?}, expected one of ns, us, ms, s, m, h")]
    UnknownUnit(String),
}

/// Parses a duration such as `150ms`, `1.5s`, `200us`, `2m` or `1h`.
///
/// # Errors
///
/// Returns an error if the number or the unit is not valid.
///
/// # Example
///
/// ```
/// use shared::models::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
/// assert_eq!(parse_duration("200us").unwrap(), Duration::from_micros(200));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| DurationParseError::UnknownUnit(input.to_string()))?;
    let (number, unit) = input.split_at(split);

    let nanos_per_unit: u128 = match unit {
        "ns" => 1,
        "us" | "µs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60_000_000_000,
        "h" => 3_600_000_000_000,
        _ => return Err(DurationParseError::UnknownUnit(input.to_string())),
    };

    let invalid = || DurationParseError::InvalidNumber(number.to_string());
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let mut nanos = whole.checked_mul(nanos_per_unit).ok_or_else(invalid)?;

    if !fraction.is_empty() {
        let digits = u32::try_from(fraction.len()).map_err(|_| invalid())?;
        let scale = 10u128.checked_pow(digits).ok_or_else(invalid)?;
        let fraction: u128 = fraction.parse().map_err(|_| invalid())?;
        let fraction_nanos = fraction.checked_mul(nanos_per_unit).ok_or_else(invalid)? / scale;
        nanos = nanos.checked_add(fraction_nanos).ok_or_else(invalid)?;
    }

    u64::try_from(nanos)
        .map(Duration::from_nanos)
        .map_err(|_| invalid())
}
