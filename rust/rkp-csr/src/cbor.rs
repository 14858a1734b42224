//! CBOR value model and codec for RKP structures (RFC 8949).
//!
//! Supports:
//! - Unsigned and negative integers
//! - Byte strings and text strings
//! - Arrays and maps (entry order preserved, optional canonical sort)
//! - Tags
//! - Booleans and null
//!
//! Encoding always uses the shortest head for integers and lengths, so two
//! encodes of equal values are byte-identical. Decoding goes through
//! `ciborium`; indefinite-length items are accepted and come back out with
//! definite lengths. Floating-point values and integers outside the `u64` /
//! `i64` range are rejected.

use std::cmp::Ordering;
use std::io::{self, Write};

use ciborium::Value;
use thiserror::Error;

// CBOR Major Types
const MT_UNSIGNED: u8 = 0;
const MT_NEGATIVE: u8 = 1;
const MT_BYTE_STRING: u8 = 2;
const MT_TEXT_STRING: u8 = 3;
const MT_ARRAY: u8 = 4;
const MT_MAP: u8 = 5;
const MT_TAG: u8 = 6;
const MT_SIMPLE: u8 = 7;

// Additional information values with special meaning.
const AI_ONE_BYTE: u8 = 24;
const AI_TWO_BYTES: u8 = 25;
const AI_FOUR_BYTES: u8 = 26;
const AI_EIGHT_BYTES: u8 = 27;

const SIMPLE_FALSE: u8 = 20;
const SIMPLE_TRUE: u8 = 21;
const SIMPLE_NULL: u8 = 22;

/// Deepest array/map/tag nesting the decoder will follow.
pub const MAX_NESTING_DEPTH: usize = 128;

/// A decoded or to-be-encoded CBOR value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CborValue {
    /// Unsigned integer (major type 0).
    UnsignedInt(u64),
    /// Negative integer (major type 1). Stores the actual value, which must
    /// be below zero; use [`CborValue::from_int`] for a value of unknown sign.
    NegativeInt(i64),
    /// Byte string (major type 2).
    ByteString(Vec<u8>),
    /// Text string (major type 3).
    TextString(String),
    /// Array of CBOR values (major type 4).
    Array(Vec<CborValue>),
    /// Map of CBOR key-value pairs (major type 5), in encoding order.
    Map(Vec<(CborValue, CborValue)>),
    /// CBOR tag (major type 6).
    Tag(u64, Box<CborValue>),
    /// Boolean value.
    Bool(bool),
    /// Null value.
    Null,
}

impl CborValue {
    /// Create from a signed integer, choosing unsigned or negative encoding.
    pub fn from_int(value: i64) -> Self {
        if value >= 0 {
            CborValue::UnsignedInt(value as u64)
        } else {
            CborValue::NegativeInt(value)
        }
    }

    /// An empty map, `{}`.
    pub fn empty_map() -> Self {
        CborValue::Map(Vec::new())
    }

    pub fn as_array(&self) -> Option<&[CborValue]> {
        match self {
            CborValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(CborValue, CborValue)]> {
        match self {
            CborValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CborValue::ByteString(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Sort every map in this value by canonical key order (RFC 8949 Section 4.2.1).
    ///
    /// Only used for values this crate authors. Values decoded from a
    /// producer are re-emitted in their original order.
    pub fn canonicalize(&mut self) {
        match self {
            CborValue::Array(items) => items.iter_mut().for_each(CborValue::canonicalize),
            CborValue::Map(entries) => {
                for (key, val) in entries.iter_mut() {
                    key.canonicalize();
                    val.canonicalize();
                }
                entries.sort_by(|a, b| canonical_key_cmp(&a.0, &b.0));
            }
            CborValue::Tag(_, inner) => inner.canonicalize(),
            _ => {}
        }
    }
}

/// Errors produced while decoding CBOR.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CborError {
    #[error("unexpected end of input at offset {offset}")]
    Truncated { offset: usize },
    #[error("malformed CBOR at offset {offset}")]
    Syntax { offset: usize },
    #[error("invalid CBOR item at offset {offset}: {reason}")]
    Semantic { offset: usize, reason: String },
    #[error("nesting too deep at offset {offset}")]
    NestingTooDeep { offset: usize },
    #[error("integer does not fit in 64 bits")]
    IntegerOutOfRange,
    #[error("floating-point values are not supported")]
    UnsupportedFloat,
    #[error("{remaining} trailing bytes after the top-level item")]
    TrailingBytes { remaining: usize },
}

impl TryFrom<Value> for CborValue {
    type Error = CborError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Integer(int) => {
                let int = i128::from(int);
                if int >= 0 {
                    u64::try_from(int)
                        .map(CborValue::UnsignedInt)
                        .map_err(|_| CborError::IntegerOutOfRange)?
                } else {
                    i64::try_from(int)
                        .map(CborValue::NegativeInt)
                        .map_err(|_| CborError::IntegerOutOfRange)?
                }
            }
            Value::Bytes(bytes) => CborValue::ByteString(bytes),
            Value::Text(text) => CborValue::TextString(text),
            Value::Array(items) => CborValue::Array(
                items
                    .into_iter()
                    .map(CborValue::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => CborValue::Map(
                entries
                    .into_iter()
                    .map(|(key, val)| Ok((CborValue::try_from(key)?, CborValue::try_from(val)?)))
                    .collect::<Result<_, CborError>>()?,
            ),
            Value::Tag(tag, inner) => CborValue::Tag(tag, Box::new(CborValue::try_from(*inner)?)),
            Value::Bool(b) => CborValue::Bool(b),
            Value::Null => CborValue::Null,
            Value::Float(_) => return Err(CborError::UnsupportedFloat),
            other => {
                return Err(CborError::Semantic {
                    offset: 0,
                    reason: format!("unsupported value {other:?}"),
                })
            }
        })
    }
}

/// Encode a CBOR value to bytes.
pub fn encode(value: &CborValue) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    encode_item(&mut buf, value).expect("writing to Vec should not fail");
    buf
}

/// Encode a CBOR value to a writer.
pub fn encode_item<W: Write>(w: &mut W, value: &CborValue) -> io::Result<()> {
    match value {
        CborValue::UnsignedInt(v) => encode_type_and_length(w, MT_UNSIGNED, *v),
        CborValue::NegativeInt(v) => {
            debug_assert!(*v < 0, "NegativeInt holds a non-negative value");
            let encoded = (-1 - *v) as u64;
            encode_type_and_length(w, MT_NEGATIVE, encoded)
        }
        CborValue::ByteString(bytes) => {
            encode_type_and_length(w, MT_BYTE_STRING, bytes.len() as u64)?;
            w.write_all(bytes)
        }
        CborValue::TextString(s) => {
            let bytes = s.as_bytes();
            encode_type_and_length(w, MT_TEXT_STRING, bytes.len() as u64)?;
            w.write_all(bytes)
        }
        CborValue::Array(items) => {
            encode_type_and_length(w, MT_ARRAY, items.len() as u64)?;
            for item in items {
                encode_item(w, item)?;
            }
            Ok(())
        }
        CborValue::Map(entries) => {
            encode_type_and_length(w, MT_MAP, entries.len() as u64)?;
            for (key, val) in entries {
                encode_item(w, key)?;
                encode_item(w, val)?;
            }
            Ok(())
        }
        CborValue::Tag(tag, inner) => {
            encode_type_and_length(w, MT_TAG, *tag)?;
            encode_item(w, inner)
        }
        CborValue::Bool(b) => encode_type_and_length(
            w,
            MT_SIMPLE,
            u64::from(if *b { SIMPLE_TRUE } else { SIMPLE_FALSE }),
        ),
        CborValue::Null => encode_type_and_length(w, MT_SIMPLE, u64::from(SIMPLE_NULL)),
    }
}

/// Encode CBOR type and length directly to the writer.
///
/// Writes bytes directly using bit-shifting to avoid temporary allocations.
fn encode_type_and_length<W: Write>(w: &mut W, major_type: u8, value: u64) -> io::Result<()> {
    let mt = major_type << 5;
    if value < 24 {
        w.write_all(&[mt | value as u8])
    } else if value <= 0xFF {
        w.write_all(&[mt | AI_ONE_BYTE, value as u8])
    } else if value <= 0xFFFF {
        w.write_all(&[mt | AI_TWO_BYTES, (value >> 8) as u8, value as u8])
    } else if value <= 0xFFFF_FFFF {
        w.write_all(&[
            mt | AI_FOUR_BYTES,
            (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ])
    } else {
        w.write_all(&[
            mt | AI_EIGHT_BYTES,
            (value >> 56) as u8,
            (value >> 48) as u8,
            (value >> 40) as u8,
            (value >> 32) as u8,
            (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ])
    }
}

/// Decode the first CBOR item in `data`.
///
/// Returns the value and the number of bytes left unread after it. Whether
/// leftover bytes are acceptable is the caller's decision.
pub fn decode(data: &[u8]) -> Result<(CborValue, usize), CborError> {
    let mut reader = data;
    let value: Value = ciborium::de::from_reader_with_recursion_limit(&mut reader, MAX_NESTING_DEPTH)
        .map_err(|err| decode_error(err, data.len() - reader.len()))?;
    Ok((CborValue::try_from(value)?, reader.len()))
}

/// Decode exactly one CBOR item, rejecting any trailing bytes.
pub fn decode_exact(data: &[u8]) -> Result<CborValue, CborError> {
    match decode(data)? {
        (value, 0) => Ok(value),
        (_, remaining) => Err(CborError::TrailingBytes { remaining }),
    }
}

/// Map a `ciborium` failure after `consumed` input bytes onto [`CborError`].
fn decode_error(err: ciborium::de::Error<io::Error>, consumed: usize) -> CborError {
    use ciborium::de::Error;

    match err {
        // Reading from a slice only fails when it runs out.
        Error::Io(_) => CborError::Truncated { offset: consumed },
        Error::Syntax(offset) => CborError::Syntax { offset },
        Error::Semantic(offset, reason) => CborError::Semantic {
            offset: offset.unwrap_or(consumed),
            reason,
        },
        Error::RecursionLimitExceeded => CborError::NestingTooDeep { offset: consumed },
    }
}

/// Compare CBOR map keys in canonical order (RFC 8949 Section 4.2.1).
///
/// - Integer keys: Major type 0 (positive) < Major type 1 (negative).
///   Within same type, smaller absolute values first.
/// - String keys: Shorter strings first, then lexicographic byte comparison.
/// - Mixed: Integer keys come before string keys (lower major type first).
fn canonical_key_cmp(a: &CborValue, b: &CborValue) -> Ordering {
    match (a, b) {
        (CborValue::UnsignedInt(a_val), CborValue::UnsignedInt(b_val)) => a_val.cmp(b_val),
        (CborValue::NegativeInt(a_val), CborValue::NegativeInt(b_val)) => {
            // -1 (encoded as 0) < -2 (encoded as 1)
            b_val.cmp(a_val)
        }
        (CborValue::UnsignedInt(_), CborValue::NegativeInt(_)) => Ordering::Less,
        (CborValue::NegativeInt(_), CborValue::UnsignedInt(_)) => Ordering::Greater,

        (CborValue::TextString(a_str), CborValue::TextString(b_str)) => {
            let a_bytes = a_str.as_bytes();
            let b_bytes = b_str.as_bytes();
            match a_bytes.len().cmp(&b_bytes.len()) {
                Ordering::Equal => a_bytes.cmp(b_bytes),
                other => other,
            }
        }

        (CborValue::UnsignedInt(_) | CborValue::NegativeInt(_), CborValue::TextString(_)) => {
            Ordering::Less
        }
        (CborValue::TextString(_), CborValue::UnsignedInt(_) | CborValue::NegativeInt(_)) => {
            Ordering::Greater
        }

        // Fallback: compare by encoded bytes
        _ => {
            let a_enc = encode(a);
            let b_enc = encode(b);
            a_enc.cmp(&b_enc)
        }
    }
}
