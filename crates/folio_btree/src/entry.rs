//! Tree entries and the changes applied to them.

use folio_storage::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority class of a value, carried alongside its id.
///
/// Eager values are expected to be available locally whenever the tree is;
/// lazy values may be fetched on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Fetched together with the tree.
    Eager,
    /// Fetched on first access.
    Lazy,
}

/// One key of a content tree.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    /// Raw key bytes. Entries are ordered bytewise by key.
    #[serde(with = "folio_codec::bytes")]
    pub key: Vec<u8>,
    /// Id of the value object.
    pub value: ObjectId,
    /// Priority class of the value.
    pub priority: Priority,
}

impl Entry {
    /// Creates an entry.
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>, value: ObjectId, priority: Priority) -> Self {
        Self {
            key: key.into(),
            value,
            priority,
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entry({} -> {}, {:?})",
            String::from_utf8_lossy(&self.key),
            self.value.short(),
            self.priority
        )
    }
}

/// A single key mutation.
///
/// Used both as input to [`crate::apply_changes`] and as output of
/// [`crate::for_each_diff`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryChange {
    /// Insert the entry, or replace the entry with the same key.
    Put(Entry),
    /// Remove the key if present.
    Delete {
        /// The removed key.
        key: Vec<u8>,
    },
}

impl EntryChange {
    /// Creates a put.
    #[must_use]
    pub fn put(key: impl Into<Vec<u8>>, value: ObjectId, priority: Priority) -> Self {
        Self::Put(Entry::new(key, value, priority))
    }

    /// Creates a deletion.
    #[must_use]
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// Returns the key this change applies to.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put(entry) => &entry.key,
            Self::Delete { key } => key,
        }
    }

    /// Returns true for deletions.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }

    /// Returns the new entry of a put.
    #[must_use]
    pub fn entry(&self) -> Option<&Entry> {
        match self {
            Self::Put(entry) => Some(entry),
            Self::Delete { .. } => None,
        }
    }
}

/// A key whose entry differs between a base tree and at least one of two
/// derived trees. `None` means the key is absent from that tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreeWayChange {
    /// The entry in the base tree.
    pub base: Option<Entry>,
    /// The entry in the left tree.
    pub left: Option<Entry>,
    /// The entry in the right tree.
    pub right: Option<Entry>,
}

impl ThreeWayChange {
    /// Returns the key of the change.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        self.base
            .as_ref()
            .or(self.left.as_ref())
            .or(self.right.as_ref())
            .map_or(&[][..], |entry| entry.key.as_slice())
    }

    /// Returns true if both sides changed the key in different ways.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.left != self.base && self.right != self.base && self.left != self.right
    }
}

/// How a walk over tree entries or differences ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Every item was visited.
    Completed,
    /// The visitor asked to stop early.
    Stopped,
}
