//! # Folio Codec
//!
//! Canonical CBOR encoding for Folio.
//!
//! Everything Folio stores is content-addressed: an object's identity is the
//! hash of its encoded bytes. This crate guarantees that:
//! - Identical values produce identical bytes
//! - Decoding rejects any non-canonical encoding of a value
//!
//! ## Canonical CBOR Rules
//!
//! - Integers use shortest encoding
//! - No indefinite-length items
//! - Struct fields in declaration order
//! - Byte buffers as byte strings (see [`bytes`])
//! - No trailing data
//!
//! ## Usage
//!
//! ```
//! use folio_codec::{from_canonical_cbor, to_canonical_cbor};
//!
//! let bytes = to_canonical_cbor(&(7u64, "page")).unwrap();
//! let decoded: (u64, String) = from_canonical_cbor(&bytes).unwrap();
//! assert_eq!(decoded, (7, "page".to_string()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bytes;
mod canonical;
mod error;

pub use canonical::{from_canonical_cbor, from_cbor, to_canonical_cbor};
pub use error::{CodecError, CodecResult};

/// Trait for types that can be encoded to canonical CBOR.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from CBOR.
///
/// Implementations verify canonical form and the type's structural
/// invariants, so a decoded value is always one that could have been encoded.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}
