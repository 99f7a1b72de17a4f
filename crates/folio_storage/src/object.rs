//! Content addresses.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Size of an object identifier in bytes.
pub const OBJECT_ID_SIZE: usize = 32;

/// Identity of a stored object: the SHA-256 digest of its bytes.
///
/// Ordering is bytewise, which gives a stable tie-breaker wherever ids are
/// sorted.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(#[serde(with = "folio_codec::bytes::array")] [u8; OBJECT_ID_SIZE]);

impl ObjectId {
    /// Computes the identity of `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Creates an object ID from raw digest bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; OBJECT_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; OBJECT_ID_SIZE] {
        &self.0
    }

    /// Returns true if `bytes` hash to this id.
    #[must_use]
    pub fn matches(&self, bytes: &[u8]) -> bool {
        Self::of(bytes) == *self
    }

    /// Lowercase hex of the first four bytes, for logs.
    #[must_use]
    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; OBJECT_ID_SIZE]> for ObjectId {
    fn from(bytes: [u8; OBJECT_ID_SIZE]) -> Self {
        Self::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        // SHA-256 of the empty string.
        assert_eq!(
            ObjectId::of(b"").to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn identical_bytes_share_an_id() {
        assert_eq!(ObjectId::of(b"value"), ObjectId::of(b"value"));
        assert_ne!(ObjectId::of(b"value"), ObjectId::of(b"other"));
        assert!(ObjectId::of(b"value").matches(b"value"));
    }

    #[test]
    fn short_and_debug() {
        let id = ObjectId::of(b"");
        assert_eq!(id.short(), "e3b0c442");
        assert_eq!(format!("{id:?}"), "ObjectId(e3b0c442)");
    }

    #[test]
    fn encodes_as_byte_string() {
        let id = ObjectId::of(b"abc");
        let bytes = folio_codec::to_canonical_cbor(&id).unwrap();
        // bytes(32) header followed by the digest.
        assert_eq!(bytes.len(), 2 + OBJECT_ID_SIZE);
        assert_eq!(bytes[0], 0x58);
        let decoded: ObjectId = folio_codec::from_canonical_cbor(&bytes).unwrap();
        assert_eq!(decoded, id);
    }
}
