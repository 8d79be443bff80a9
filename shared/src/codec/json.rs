//! Textual span payload encoding.
//!
//! Row structs matching the JSON the span writer stored before the binary
//! encoding took over: snake_case keys, trace and span IDs as standard
//! base64 of their big-endian bytes, `start_time` in RFC 3339, `duration`
//! in integer nanoseconds and enums as their numeric values. Absent lists
//! are written as `null`, and `null` or a missing key decodes as empty.

use super::DecodeError;
use crate::models::{KeyValue, Log, Process, Span, SpanId, SpanRef, SpanRefType, TagValue, TraceId};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const VALUE_TYPE_STRING: i32 = 0;
const VALUE_TYPE_BOOL: i32 = 1;
const VALUE_TYPE_INT64: i32 = 2;
const VALUE_TYPE_FLOAT64: i32 = 3;
const VALUE_TYPE_BINARY: i32 = 4;

const REF_TYPE_CHILD_OF: i32 = 0;
const REF_TYPE_FOLLOWS_FROM: i32 = 1;

/// Stored JSON form of [`Span`].
#[derive(Debug, Serialize, Deserialize)]
struct SpanRow {
    trace_id: String,
    span_id: String,
    #[serde(default)]
    operation_name: String,
    #[serde(default)]
    references: Option<Vec<SpanRefRow>>,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    flags: u32,
    start_time: DateTime<Utc>,
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    tags: Option<Vec<KeyValueRow>>,
    #[serde(default)]
    logs: Option<Vec<LogRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    process: Option<ProcessRow>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    process_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SpanRefRow {
    trace_id: String,
    span_id: String,
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    ref_type: i32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyValueRow {
    key: String,
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    v_type: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    v_str: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    v_bool: bool,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    v_int64: i64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    v_float64: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v_binary: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LogRow {
    timestamp: DateTime<Utc>,
    #[serde(default)]
    fields: Option<Vec<KeyValueRow>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProcessRow {
    #[serde(default)]
    service_name: String,
    #[serde(default)]
    tags: Option<Vec<KeyValueRow>>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_u32(value: &u32) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_i32(value: &i32) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_f64(value: &f64) -> bool {
    *value == 0.0
}

/// Encodes a span in the textual format.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(span: &Span) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&SpanRow::from(span))
}

/// Decodes a span from the textual format.
///
/// # Errors
///
/// Returns an error if the bytes are not a JSON span row or a field holds a
/// value the span model cannot represent.
pub fn decode(payload: &[u8]) -> Result<Span, DecodeError> {
    serde_json::from_slice::<SpanRow>(payload)?.try_into()
}

fn invalid(field: &'static str, reason: impl ToString) -> DecodeError {
    DecodeError::InvalidField {
        field,
        reason: reason.to_string(),
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn trace_id_from_row(field: &'static str, encoded: &str) -> Result<TraceId, DecodeError> {
    let bytes = STANDARD.decode(encoded).map_err(|e| invalid(field, e))?;
    TraceId::from_bytes(&bytes).map_err(|e| invalid(field, e))
}

fn span_id_from_row(field: &'static str, encoded: &str) -> Result<SpanId, DecodeError> {
    let bytes = STANDARD.decode(encoded).map_err(|e| invalid(field, e))?;
    SpanId::from_bytes(&bytes).map_err(|e| invalid(field, e))
}

fn span_id_to_row(id: SpanId) -> String {
    STANDARD.encode(id.0.to_be_bytes())
}

impl From<&KeyValue> for KeyValueRow {
    fn from(kv: &KeyValue) -> Self {
        let mut row = Self {
            key: kv.key.clone(),
            ..Self::default()
        };
        match &kv.value {
            TagValue::String(v) => {
                row.v_type = VALUE_TYPE_STRING;
                row.v_str.clone_from(v);
            }
            TagValue::Bool(v) => {
                row.v_type = VALUE_TYPE_BOOL;
                row.v_bool = *v;
            }
            TagValue::Int64(v) => {
                row.v_type = VALUE_TYPE_INT64;
                row.v_int64 = *v;
            }
            TagValue::Float64(v) => {
                row.v_type = VALUE_TYPE_FLOAT64;
                row.v_float64 = *v;
            }
            TagValue::Binary(v) => {
                row.v_type = VALUE_TYPE_BINARY;
                row.v_binary = non_empty(v.clone()).map(|bytes| STANDARD.encode(bytes));
            }
        }
        row
    }
}

impl TryFrom<KeyValueRow> for KeyValue {
    type Error = DecodeError;

    fn try_from(row: KeyValueRow) -> Result<Self, Self::Error> {
        let value = match row.v_type {
            VALUE_TYPE_STRING => TagValue::String(row.v_str),
            VALUE_TYPE_BOOL => TagValue::Bool(row.v_bool),
            VALUE_TYPE_INT64 => TagValue::Int64(row.v_int64),
            VALUE_TYPE_FLOAT64 => TagValue::Float64(row.v_float64),
            VALUE_TYPE_BINARY => TagValue::Binary(match row.v_binary {
                Some(encoded) => STANDARD
                    .decode(encoded)
                    .map_err(|e| invalid("tag.v_binary", e))?,
                None => Vec::new(),
            }),
            other => return Err(invalid("tag.v_type", format!("unknown value type {other}"))),
        };
        Ok(Self {
            key: row.key,
            value,
        })
    }
}

fn key_values_to_row(kvs: &[KeyValue]) -> Option<Vec<KeyValueRow>> {
    non_empty(kvs.iter().map(KeyValueRow::from).collect())
}

fn key_values_from_row(rows: Option<Vec<KeyValueRow>>) -> Result<Vec<KeyValue>, DecodeError> {
    rows.unwrap_or_default()
        .into_iter()
        .map(KeyValue::try_from)
        .collect()
}

impl From<&Span> for SpanRow {
    fn from(span: &Span) -> Self {
        Self {
            trace_id: STANDARD.encode(span.trace_id.to_bytes()),
            span_id: span_id_to_row(span.span_id),
            operation_name: span.operation_name.clone(),
            references: non_empty(
                span.references
                    .iter()
                    .map(|r| SpanRefRow {
                        trace_id: STANDARD.encode(r.trace_id.to_bytes()),
                        span_id: span_id_to_row(r.span_id),
                        ref_type: match r.ref_type {
                            SpanRefType::ChildOf => REF_TYPE_CHILD_OF,
                            SpanRefType::FollowsFrom => REF_TYPE_FOLLOWS_FROM,
                        },
                    })
                    .collect(),
            ),
            flags: span.flags,
            start_time: span.start_time,
            duration: i64::try_from(span.duration.as_nanos()).unwrap_or(i64::MAX),
            tags: key_values_to_row(&span.tags),
            logs: non_empty(
                span.logs
                    .iter()
                    .map(|log| LogRow {
                        timestamp: log.timestamp,
                        fields: key_values_to_row(&log.fields),
                    })
                    .collect(),
            ),
            process: Some(ProcessRow {
                service_name: span.process.service_name.clone(),
                tags: key_values_to_row(&span.process.tags),
            }),
            process_id: span.process_id.clone(),
            warnings: non_empty(span.warnings.clone()),
        }
    }
}

impl TryFrom<SpanRow> for Span {
    type Error = DecodeError;

    fn try_from(row: SpanRow) -> Result<Self, Self::Error> {
        let references = row
            .references
            .unwrap_or_default()
            .into_iter()
            .map(|r| {
                let ref_type = match r.ref_type {
                    REF_TYPE_CHILD_OF => SpanRefType::ChildOf,
                    REF_TYPE_FOLLOWS_FROM => SpanRefType::FollowsFrom,
                    other => {
                        return Err(invalid(
                            "references.ref_type",
                            format!("unknown reference type {other}"),
                        ))
                    }
                };
                Ok(SpanRef {
                    trace_id: trace_id_from_row("references.trace_id", &r.trace_id)?,
                    span_id: span_id_from_row("references.span_id", &r.span_id)?,
                    ref_type,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        let logs = row
            .logs
            .unwrap_or_default()
            .into_iter()
            .map(|log| {
                Ok(Log {
                    timestamp: log.timestamp,
                    fields: key_values_from_row(log.fields)?,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        let process = match row.process {
            Some(process) => Process {
                service_name: process.service_name,
                tags: key_values_from_row(process.tags)?,
            },
            None => Process::default(),
        };

        let duration = u64::try_from(row.duration).map_err(|e| invalid("duration", e))?;

        Ok(Self {
            trace_id: trace_id_from_row("trace_id", &row.trace_id)?,
            span_id: span_id_from_row("span_id", &row.span_id)?,
            operation_name: row.operation_name,
            references,
            flags: row.flags,
            start_time: row.start_time,
            duration: Duration::from_nanos(duration),
            tags: key_values_from_row(row.tags)?,
            logs,
            process,
            process_id: row.process_id,
            warnings: row.warnings.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_decode_stored_row_with_null_lists() {
        let payload = br#"{"trace_id":"AAAAAAAAAAEAAAAAAAAAAg==","span_id":"AAAAAAAAAAM=","operation_name":"GET /health","references":null,"flags":1,"start_time":"2024-01-01T00:00:00Z","duration":1500000,"tags":null,"logs":null,"process":{"service_name":"api","tags":null}}"#;

        let span = decode(payload).unwrap();

        assert_eq!(span.trace_id, TraceId::new(1, 2));
        assert_eq!(span.span_id, SpanId(3));
        assert_eq!(span.operation_name, "GET /health");
        assert_eq!(span.flags, 1);
        assert_eq!(
            span.start_time,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(span.duration, Duration::from_micros(1500));
        assert_eq!(span.service_name(), "api");
        assert!(span.references.is_empty());
        assert!(span.tags.is_empty());
        assert!(span.logs.is_empty());
    }

    #[test]
    fn test_decode_stored_row_with_tags_refs_and_logs() {
        let payload = br#"{
            "trace_id": "AAAAAAAAAAAAAAAAAAAAoQ==",
            "span_id": "AAAAAAAAAAI=",
            "operation_name": "charge",
            "references": [
                {"trace_id": "AAAAAAAAAAAAAAAAAAAAoQ==", "span_id": "AAAAAAAAAAE="},
                {"trace_id": "AAAAAAAAAAAAAAAAAAAAsQ==", "span_id": "AAAAAAAAAAU=", "ref_type": 1}
            ],
            "start_time": "2024-03-01T13:30:00.123456789+01:00",
            "duration": 30000000,
            "tags": [
                {"key": "http.method", "v_str": "POST"},
                {"key": "error", "v_type": 1, "v_bool": true},
                {"key": "http.status_code", "v_type": 2, "v_int64": 502},
                {"key": "sample.rate", "v_type": 3, "v_float64": 0.5},
                {"key": "blob", "v_type": 4, "v_binary": "AQID"}
            ],
            "logs": [
                {"timestamp": "2024-03-01T12:30:00.2Z", "fields": [{"key": "event", "v_str": "retry"}]}
            ],
            "process": {"service_name": "payments", "tags": [{"key": "hostname", "v_str": "pay-1"}]},
            "warnings": ["clock skew adjusted"]
        }"#;

        let span = decode(payload).unwrap();

        assert_eq!(span.parent_span_id(), Some(SpanId(1)));
        assert_eq!(span.references[1].trace_id, TraceId::new(0, 0xb1));
        assert_eq!(span.references[1].ref_type, SpanRefType::FollowsFrom);
        assert_eq!(
            span.start_time,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
                + chrono::Duration::nanoseconds(123_456_789)
        );
        assert_eq!(
            span.tags,
            vec![
                KeyValue::new("http.method", "POST"),
                KeyValue::new("error", true),
                KeyValue::new("http.status_code", 502_i64),
                KeyValue::new("sample.rate", 0.5),
                KeyValue::new("blob", vec![1_u8, 2, 3]),
            ]
        );
        assert_eq!(span.logs[0].fields, vec![KeyValue::new("event", "retry")]);
        assert_eq!(span.process.tags, vec![KeyValue::new("hostname", "pay-1")]);
        assert_eq!(span.warnings, vec!["clock skew adjusted".to_string()]);
    }

    #[test]
    fn test_encode_writes_stored_layout() {
        let span = Span::new(TraceId::new(1, 2), SpanId(3), "GET /health", "api")
            .with_start_time(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .with_duration(Duration::from_micros(1500))
            .with_tag("http.status_code", 200_i64);

        let row: serde_json::Value = serde_json::from_slice(&encode(&span).unwrap()).unwrap();

        assert_eq!(row["trace_id"], "AAAAAAAAAAEAAAAAAAAAAg==");
        assert_eq!(row["span_id"], "AAAAAAAAAAM=");
        assert_eq!(row["operation_name"], "GET /health");
        assert_eq!(row["duration"], 1_500_000);
        assert_eq!(row["references"], serde_json::Value::Null);
        assert_eq!(row["logs"], serde_json::Value::Null);
        assert_eq!(
            row["tags"],
            serde_json::json!([{"key": "http.status_code", "v_type": 2, "v_int64": 200}])
        );
        assert_eq!(row["process"]["service_name"], "api");
    }

    #[test]
    fn test_hex_ids_are_rejected() {
        let payload = br#"{"trace_id":"00000000000000010000000000000002","span_id":"AAAAAAAAAAM=","start_time":"2024-01-01T00:00:00Z"}"#;

        let err = decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { field: "trace_id", .. }));
    }

    #[test]
    fn test_unknown_value_type_is_rejected() {
        let payload = br#"{"trace_id":"AAAAAAAAAAEAAAAAAAAAAg==","span_id":"AAAAAAAAAAM=","start_time":"2024-01-01T00:00:00Z","tags":[{"key":"k","v_type":9}]}"#;

        let err = decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { field: "tag.v_type", .. }));
    }

    #[test]
    fn test_negative_duration_is_rejected() {
        let payload = br#"{"trace_id":"AAAAAAAAAAEAAAAAAAAAAg==","span_id":"AAAAAAAAAAM=","start_time":"2024-01-01T00:00:00Z","duration":-5}"#;

        let err = decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { field: "duration", .. }));
    }
}
