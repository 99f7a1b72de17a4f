//! Canonical CBOR encoding through serde.
//!
//! The encoder always produces definite-length items and shortest-form
//! integers. Struct fields are written in declaration order, so a type
//! without unordered collections has exactly one encoding. Decoding with
//! [`from_canonical_cbor`] rejects any other byte string for the same value,
//! including trailing data.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes `value` to canonical CBOR bytes.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_canonical_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes a value from CBOR bytes without checking canonical form.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR for `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

/// Decodes a value and verifies that `bytes` is its canonical encoding.
///
/// # Errors
///
/// Returns [`CodecError::NonCanonical`] if re-encoding the decoded value
/// does not reproduce `bytes` exactly.
pub fn from_canonical_cbor<T: DeserializeOwned + Serialize>(bytes: &[u8]) -> CodecResult<T> {
    let value: T = from_cbor(bytes)?;
    if to_canonical_cbor(&value)? != bytes {
        return Err(CodecError::NonCanonical);
    }
    Ok(value)
}
