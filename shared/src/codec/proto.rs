//! Binary span payload encoding.
//!
//! Protobuf messages matching the stored span model, plus conversions to
//! and from [`Span`]. Field number 15 is never used at the top level, so an
//! encoded span never starts with byte `0x7B` (`{`).

#![allow(missing_docs)]

use super::DecodeError;
use crate::models::{KeyValue, Log, Process, Span, SpanId, SpanRef, SpanRefType, TagValue, TraceId};
use chrono::{DateTime, Utc};
use prost::Message;
use std::time::Duration;

/// Protobuf form of [`Span`].
#[derive(Clone, PartialEq, Message)]
pub struct SpanProto {
    #[prost(bytes = "vec", tag = "1")]
    pub trace_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub span_id: Vec<u8>,
    #[prost(string, tag = "3")]
    pub operation_name: String,
    #[prost(message, repeated, tag = "4")]
    pub references: Vec<SpanRefProto>,
    #[prost(uint32, tag = "5")]
    pub flags: u32,
    #[prost(message, optional, tag = "6")]
    pub start_time: Option<prost_types::Timestamp>,
    #[prost(message, optional, tag = "7")]
    pub duration: Option<prost_types::Duration>,
    #[prost(message, repeated, tag = "8")]
    pub tags: Vec<KeyValueProto>,
    #[prost(message, repeated, tag = "9")]
    pub logs: Vec<LogProto>,
    #[prost(message, optional, tag = "10")]
    pub process: Option<ProcessProto>,
    #[prost(string, tag = "11")]
    pub process_id: String,
    #[prost(string, repeated, tag = "12")]
    pub warnings: Vec<String>,
}

/// Protobuf value type discriminator for [`KeyValueProto`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ValueTypeProto {
    String = 0,
    Bool = 1,
    Int64 = 2,
    Float64 = 3,
    Binary = 4,
}

/// Protobuf form of [`KeyValue`].
#[derive(Clone, PartialEq, Message)]
pub struct KeyValueProto {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(enumeration = "ValueTypeProto", tag = "2")]
    pub v_type: i32,
    #[prost(string, tag = "3")]
    pub v_str: String,
    #[prost(bool, tag = "4")]
    pub v_bool: bool,
    #[prost(int64, tag = "5")]
    pub v_int64: i64,
    #[prost(double, tag = "6")]
    pub v_float64: f64,
    #[prost(bytes = "vec", tag = "7")]
    pub v_binary: Vec<u8>,
}

/// Protobuf form of [`Log`].
#[derive(Clone, PartialEq, Message)]
pub struct LogProto {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<prost_types::Timestamp>,
    #[prost(message, repeated, tag = "2")]
    pub fields: Vec<KeyValueProto>,
}

/// Protobuf reference type for [`SpanRefProto`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SpanRefTypeProto {
    ChildOf = 0,
    FollowsFrom = 1,
}

/// Protobuf form of [`SpanRef`].
#[derive(Clone, PartialEq, Message)]
pub struct SpanRefProto {
    #[prost(bytes = "vec", tag = "1")]
    pub trace_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub span_id: Vec<u8>,
    #[prost(enumeration = "SpanRefTypeProto", tag = "3")]
    pub ref_type: i32,
}

/// Protobuf form of [`Process`].
#[derive(Clone, PartialEq, Message)]
pub struct ProcessProto {
    #[prost(string, tag = "1")]
    pub service_name: String,
    #[prost(message, repeated, tag = "2")]
    pub tags: Vec<KeyValueProto>,
}

/// Encodes a span in the binary format.
#[must_use]
pub fn encode(span: &Span) -> Vec<u8> {
    SpanProto::from(span).encode_to_vec()
}

/// Decodes a span from the binary format.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid protobuf span or a field
/// holds an out-of-range value.
pub fn decode(payload: &[u8]) -> Result<Span, DecodeError> {
    SpanProto::decode(payload)?.try_into()
}

fn invalid(field: &'static str, reason: impl ToString) -> DecodeError {
    DecodeError::InvalidField {
        field,
        reason: reason.to_string(),
    }
}

fn timestamp_to_proto(time: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: time.timestamp(),
        nanos: i32::try_from(time.timestamp_subsec_nanos()).unwrap_or(i32::MAX),
    }
}

fn timestamp_from_proto(
    field: &'static str,
    timestamp: Option<prost_types::Timestamp>,
) -> Result<DateTime<Utc>, DecodeError> {
    let Some(timestamp) = timestamp else {
        return Ok(DateTime::UNIX_EPOCH);
    };
    let nanos = u32::try_from(timestamp.nanos).map_err(|e| invalid(field, e))?;
    DateTime::from_timestamp(timestamp.seconds, nanos)
        .ok_or_else(|| invalid(field, "timestamp out of range"))
}

fn duration_to_proto(duration: Duration) -> prost_types::Duration {
    prost_types::Duration {
        seconds: i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
        nanos: i32::try_from(duration.subsec_nanos()).unwrap_or(i32::MAX),
    }
}

fn duration_from_proto(duration: Option<prost_types::Duration>) -> Result<Duration, DecodeError> {
    let Some(duration) = duration else {
        return Ok(Duration::ZERO);
    };
    let seconds = u64::try_from(duration.seconds).map_err(|e| invalid("duration", e))?;
    let nanos = u32::try_from(duration.nanos).map_err(|e| invalid("duration", e))?;
    if nanos >= 1_000_000_000 {
        return Err(invalid("duration", "nanos out of range"));
    }
    Ok(Duration::new(seconds, nanos))
}

impl From<&KeyValue> for KeyValueProto {
    fn from(kv: &KeyValue) -> Self {
        let mut proto = Self {
            key: kv.key.clone(),
            ..Self::default()
        };
        match &kv.value {
            TagValue::String(v) => {
                proto.v_type = ValueTypeProto::String as i32;
                proto.v_str.clone_from(v);
            }
            TagValue::Bool(v) => {
                proto.v_type = ValueTypeProto::Bool as i32;
                proto.v_bool = *v;
            }
            TagValue::Int64(v) => {
                proto.v_type = ValueTypeProto::Int64 as i32;
                proto.v_int64 = *v;
            }
            TagValue::Float64(v) => {
                proto.v_type = ValueTypeProto::Float64 as i32;
                proto.v_float64 = *v;
            }
            TagValue::Binary(v) => {
                proto.v_type = ValueTypeProto::Binary as i32;
                proto.v_binary.clone_from(v);
            }
        }
        proto
    }
}

impl TryFrom<KeyValueProto> for KeyValue {
    type Error = DecodeError;

    fn try_from(proto: KeyValueProto) -> Result<Self, Self::Error> {
        let value_type =
            ValueTypeProto::try_from(proto.v_type).map_err(|e| invalid("tag.vType", e))?;
        let value = match value_type {
            ValueTypeProto::String => TagValue::String(proto.v_str),
            ValueTypeProto::Bool => TagValue::Bool(proto.v_bool),
            ValueTypeProto::Int64 => TagValue::Int64(proto.v_int64),
            ValueTypeProto::Float64 => TagValue::Float64(proto.v_float64),
            ValueTypeProto::Binary => TagValue::Binary(proto.v_binary),
        };
        Ok(Self {
            key: proto.key,
            value,
        })
    }
}

fn key_values_from_proto(protos: Vec<KeyValueProto>) -> Result<Vec<KeyValue>, DecodeError> {
    protos.into_iter().map(KeyValue::try_from).collect()
}

impl From<&Span> for SpanProto {
    fn from(span: &Span) -> Self {
        Self {
            trace_id: span.trace_id.to_bytes().to_vec(),
            span_id: span.span_id.0.to_be_bytes().to_vec(),
            operation_name: span.operation_name.clone(),
            references: span
                .references
                .iter()
                .map(|r| SpanRefProto {
                    trace_id: r.trace_id.to_bytes().to_vec(),
                    span_id: r.span_id.0.to_be_bytes().to_vec(),
                    ref_type: match r.ref_type {
                        SpanRefType::ChildOf => SpanRefTypeProto::ChildOf as i32,
                        SpanRefType::FollowsFrom => SpanRefTypeProto::FollowsFrom as i32,
                    },
                })
                .collect(),
            flags: span.flags,
            start_time: Some(timestamp_to_proto(span.start_time)),
            duration: Some(duration_to_proto(span.duration)),
            tags: span.tags.iter().map(KeyValueProto::from).collect(),
            logs: span
                .logs
                .iter()
                .map(|log| LogProto {
                    timestamp: Some(timestamp_to_proto(log.timestamp)),
                    fields: log.fields.iter().map(KeyValueProto::from).collect(),
                })
                .collect(),
            process: Some(ProcessProto {
                service_name: span.process.service_name.clone(),
                tags: span.process.tags.iter().map(KeyValueProto::from).collect(),
            }),
            process_id: span.process_id.clone(),
            warnings: span.warnings.clone(),
        }
    }
}

impl TryFrom<SpanProto> for Span {
    type Error = DecodeError;

    fn try_from(proto: SpanProto) -> Result<Self, Self::Error> {
        let references = proto
            .references
            .into_iter()
            .map(|r| {
                let ref_type = match SpanRefTypeProto::try_from(r.ref_type)
                    .map_err(|e| invalid("references.refType", e))?
                {
                    SpanRefTypeProto::ChildOf => SpanRefType::ChildOf,
                    SpanRefTypeProto::FollowsFrom => SpanRefType::FollowsFrom,
                };
                Ok(SpanRef {
                    trace_id: TraceId::from_bytes(&r.trace_id)
                        .map_err(|e| invalid("references.traceID", e))?,
                    span_id: SpanId::from_bytes(&r.span_id)
                        .map_err(|e| invalid("references.spanID", e))?,
                    ref_type,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        let logs = proto
            .logs
            .into_iter()
            .map(|log| {
                Ok(Log {
                    timestamp: timestamp_from_proto("logs.timestamp", log.timestamp)?,
                    fields: key_values_from_proto(log.fields)?,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        let process = match proto.process {
            Some(process) => Process {
                service_name: process.service_name,
                tags: key_values_from_proto(process.tags)?,
            },
            None => Process::default(),
        };

        Ok(Self {
            trace_id: TraceId::from_bytes(&proto.trace_id).map_err(|e| invalid("traceID", e))?,
            span_id: SpanId::from_bytes(&proto.span_id).map_err(|e| invalid("spanID", e))?,
            operation_name: proto.operation_name,
            references,
            flags: proto.flags,
            start_time: timestamp_from_proto("startTime", proto.start_time)?,
            duration: duration_from_proto(proto.duration)?,
            tags: key_values_from_proto(proto.tags)?,
            logs,
            process,
            process_id: proto.process_id,
            warnings: proto.warnings,
        })
    }
}
