//! Span payload codec.
//!
//! The span table's `model` column holds spans in one of two encodings left
//! side by side by a storage-format migration: JSON (textual) and protobuf
//! (binary). Rows carry no version flag, so the format is sniffed from the
//! first byte: `{` means JSON, anything else is decoded as protobuf.
//!
//! The textual rows use their own layout ([`json`]) rather than the serde
//! form of [`Span`], which is the API response shape.
//!
//! The sniff relies on the binary encoding never starting with `{`, which
//! holds for [`proto::SpanProto`] (it has no field 15). It is a coupling
//! between these two encodings, not a general format detector.

pub mod json;
pub mod proto;

use crate::models::Span;
use thiserror::Error;

/// First byte of every JSON-encoded span.
pub const JSON_MARKER: u8 = b'{';

/// Encodings a stored span payload may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PayloadEncoding {
    /// Self-describing JSON.
    Json,
    /// Compact protobuf.
    #[default]
    Protobuf,
}

impl PayloadEncoding {
    /// Detects the encoding of a payload from its first byte.
    ///
    /// Returns `None` for an empty payload.
    #[must_use]
    pub fn detect(payload: &[u8]) -> Option<Self> {
        match payload.first()? {
            &JSON_MARKER => Some(Self::Json),
            _ => Some(Self::Protobuf),
        }
    }
}

impl std::fmt::Display for PayloadEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Protobuf => write!(f, "protobuf"),
        }
    }
}

/// Errors that can occur while decoding a stored span payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload has no bytes to inspect.
    #[error("Span payload is empty")]
    Empty,

    /// The payload looked like JSON but did not parse as a span.
    #[error("Invalid JSON span payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload did not parse as a protobuf span.
    #[error("Invalid protobuf span payload: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// A field decoded but holds a value the span model cannot represent.
    #[error("Invalid span field {field}: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Decodes a stored span payload, detecting its encoding.
///
/// # Errors
///
/// Returns an error if the payload is empty or does not decode in the
/// detected encoding.
///
/// # Example
///
/// ```
/// use shared::codec::{decode, encode, PayloadEncoding};
/// use shared::models::{Span, SpanId, TraceId};
///
/// let span = Span::new(TraceId::new(0, 1), SpanId(2), "GET /", "api");
///
/// for encoding in [PayloadEncoding::Json, PayloadEncoding::Protobuf] {
///     let payload = encode(&span, encoding).unwrap();
///     assert_eq!(decode(&payload).unwrap(), span);
/// }
/// ```
pub fn decode(payload: &[u8]) -> Result<Span, DecodeError> {
    match PayloadEncoding::detect(payload).ok_or(DecodeError::Empty)? {
        PayloadEncoding::Json => json::decode(payload),
        PayloadEncoding::Protobuf => proto::decode(payload),
    }
}

/// Encodes a span in the given encoding.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn encode(span: &Span, encoding: PayloadEncoding) -> Result<Vec<u8>, serde_json::Error> {
    match encoding {
        PayloadEncoding::Json => json::encode(span),
        PayloadEncoding::Protobuf => Ok(proto::encode(span)),
    }
}
