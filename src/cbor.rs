//! Thin wrapper around [ciborium] providing the deterministic encoding used
//! throughout this crate.
//!
//! Encoding is always definite-length with canonical integer widths; when
//! canonical map ordering is enabled (the default) map entries are sorted
//! bytewise by their encoded key, per the RFC 8949 core deterministic
//! encoding rules. Decoding is lenient: indefinite-length items and
//! non-canonical orderings are accepted, and values that must keep their
//! original bytes (tag 24 data items) do so via
//! [crate::definitions::helpers::Tag24].

use std::io::Cursor;
use std::sync::OnceLock;

use serde::{de, Serialize};

pub use ciborium::Value;

/// Process-wide codec settings.
///
/// Set once before the first encode/decode; later calls to
/// [set_cbor_options] fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CborOptions {
    /// Sort map entries bytewise by encoded key on encode.
    pub canonical_map_ordering: bool,
    /// Reject NaN and infinities on encode.
    pub reject_non_finite_floats: bool,
}

impl Default for CborOptions {
    fn default() -> Self {
        Self {
            canonical_map_ordering: true,
            reject_non_finite_floats: true,
        }
    }
}

static OPTIONS: OnceLock<CborOptions> = OnceLock::new();

pub fn get_cbor_options() -> CborOptions {
    *OPTIONS.get_or_init(CborOptions::default)
}

pub fn set_cbor_options(options: CborOptions) -> Result<(), CborError> {
    OPTIONS.set(options).map_err(|_| CborError::OptionsFrozen)
}

type Result<T, E = CborError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum CborError {
    /// CBOR decoding failure, with the input offset where known.
    #[error("CBOR decoding failure at offset {offset}: {reason}")]
    DecodeFailed { reason: String, offset: usize },
    /// CBOR encoding failure.
    #[error("CBOR encoding failure: {0}")]
    EncodeFailed(String),
    /// NaN or an infinity in a payload that must encode deterministically.
    #[error("non-finite float is not permitted in a deterministic encoding")]
    NonFiniteFloat,
    /// Negative zero never appears in a deterministic encoding.
    #[error("negative zero float is not permitted in a deterministic encoding")]
    NegativeZeroFloat,
    /// The codec options were already set.
    #[error("CBOR codec options are frozen after first use")]
    OptionsFrozen,
}

impl CborError {
    fn decode<T: std::fmt::Debug>(e: ciborium::de::Error<T>) -> CborError {
        let offset = match &e {
            ciborium::de::Error::Syntax(offset) => *offset,
            ciborium::de::Error::Semantic(offset, _) => offset.unwrap_or(0),
            _ => 0,
        };
        CborError::DecodeFailed {
            reason: format!("{e:?}"),
            offset,
        }
    }
}

/// Encode a value deterministically.
pub fn to_vec<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize,
{
    let value = into_value(value)?;
    let value = canonicalize(value, &get_cbor_options())?;
    let mut buf = Vec::new();
    ciborium::into_writer(&value, &mut buf)
        .map_err(|e| CborError::EncodeFailed(e.to_string()))?;
    Ok(buf)
}

pub fn from_slice<T>(slice: &[u8]) -> Result<T>
where
    T: de::DeserializeOwned,
{
    ciborium::from_reader(Cursor::new(slice)).map_err(CborError::decode)
}

/// Convert a serializable value into a [ciborium::Value] tree.
pub fn into_value<T>(value: &T) -> Result<Value>
where
    T: Serialize,
{
    Value::serialized(value).map_err(|e| CborError::EncodeFailed(e.to_string()))
}

/// Convert a [ciborium::Value] tree into a concrete type.
pub fn from_value<T>(value: Value) -> Result<T>
where
    T: de::DeserializeOwned,
{
    value.deserialized().map_err(|e| CborError::DecodeFailed {
        reason: e.to_string(),
        offset: 0,
    })
}

/// Recursively apply the deterministic-encoding rules to a value tree.
fn canonicalize(value: Value, options: &CborOptions) -> Result<Value> {
    match value {
        Value::Float(f) => {
            if options.reject_non_finite_floats && !f.is_finite() {
                return Err(CborError::NonFiniteFloat);
            }
            if f == 0.0 && f.is_sign_negative() {
                return Err(CborError::NegativeZeroFloat);
            }
            Ok(Value::Float(f))
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .map(|v| canonicalize(v, options))
                .collect::<Result<_>>()?,
        )),
        Value::Tag(tag, inner) => Ok(Value::Tag(tag, Box::new(canonicalize(*inner, options)?))),
        Value::Map(entries) => {
            let mut entries = entries
                .into_iter()
                .map(|(k, v)| {
                    let k = canonicalize(k, options)?;
                    let v = canonicalize(v, options)?;
                    Ok((k, v))
                })
                .collect::<Result<Vec<_>>>()?;
            if options.canonical_map_ordering {
                // Bytewise comparison of the encoded key yields the RFC 8949
                // core deterministic order (the length is part of the head).
                let mut keyed = entries
                    .into_iter()
                    .map(|(k, v)| {
                        let mut encoded = Vec::new();
                        ciborium::into_writer(&k, &mut encoded)
                            .map_err(|e| CborError::EncodeFailed(e.to_string()))?;
                        Ok((encoded, k, v))
                    })
                    .collect::<Result<Vec<_>>>()?;
                keyed.sort_by(|(a, _, _), (b, _, _)| a.cmp(b));
                entries = keyed.into_iter().map(|(_, k, v)| (k, v)).collect();
            }
            Ok(Value::Map(entries))
        }
        other => Ok(other),
    }
}

/// Render a CBOR value as JSON, for diagnostics and holder-facing display.
///
/// Byte strings are hex-encoded, tags are unwrapped to their inner value.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => {
            let i = i128::from(*i);
            match i64::try_from(i) {
                Ok(n) => serde_json::Value::Number(n.into()),
                Err(_) => serde_json::Value::String(i.to_string()),
            }
        }
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(t) => serde_json::Value::String(t.clone()),
        Value::Bytes(b) => {
            serde_json::Value::String(b.iter().map(|byte| format!("{byte:02x}")).collect())
        }
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        Value::Text(t) => t.clone(),
                        other => format!("{other:?}"),
                    };
                    (key, to_json(v))
                })
                .collect(),
        ),
        Value::Tag(_, inner) => to_json(inner),
        _ => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keys_sorted_by_encoded_bytes() {
        let value = Value::Map(vec![
            (Value::Text("elementIdentifier".into()), Value::Null),
            (Value::Text("digestID".into()), Value::Null),
            (Value::Text("random".into()), Value::Null),
        ]);
        let bytes = to_vec(&value).unwrap();
        let decoded: Value = from_slice(&bytes).unwrap();
        let keys: Vec<String> = decoded
            .into_map()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k.into_text().unwrap())
            .collect();
        // Shorter text keys carry a smaller head byte, so they sort first.
        assert_eq!(keys, vec!["random", "digestID", "elementIdentifier"]);
    }

    #[test]
    fn integer_keys_supported() {
        let value = Value::Map(vec![
            (Value::Integer(33.into()), Value::Bytes(vec![1, 2])),
            (Value::Integer(1.into()), Value::Integer((-7).into())),
        ]);
        let bytes = to_vec(&value).unwrap();
        let decoded: Value = from_slice(&bytes).unwrap();
        let first_key = &decoded.as_map().unwrap()[0].0;
        assert_eq!(first_key, &Value::Integer(1.into()));
    }

    #[test]
    fn non_finite_floats_rejected() {
        assert!(matches!(to_vec(&f64::NAN), Err(CborError::NonFiniteFloat)));
        assert!(matches!(
            to_vec(&-0.0f64),
            Err(CborError::NegativeZeroFloat)
        ));
    }

    #[test]
    fn roundtrip_preserves_value() {
        let value = Value::Array(vec![
            Value::Text("a".into()),
            Value::Bytes(vec![0xde, 0xad]),
            Value::Tag(0, Box::new(Value::Text("2024-01-01T00:00:00Z".into()))),
        ]);
        let bytes = to_vec(&value).unwrap();
        let decoded: Value = from_slice(&bytes).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn decode_error_is_reported() {
        let err = from_slice::<Value>(&[0xa1]).unwrap_err();
        assert!(matches!(err, CborError::DecodeFailed { .. }));
    }
}
