//! Commits: the immutable nodes of a page's history.

use crate::error::{CoreError, CoreResult};
use folio_codec::{from_canonical_cbor, to_canonical_cbor};
use folio_storage::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a commit: the SHA-256 of its storage bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(ObjectId);

impl CommitId {
    /// Returns the underlying content address.
    #[must_use]
    pub const fn as_object_id(&self) -> ObjectId {
        self.0
    }

    /// Short hex form, for logs.
    #[must_use]
    pub fn short(&self) -> String {
        self.0.short()
    }
}

impl From<ObjectId> for CommitId {
    fn from(id: ObjectId) -> Self {
        Self(id)
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.0.short())
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The hashed part of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CommitData {
    timestamp: u64,
    generation: u64,
    parents: Vec<CommitId>,
    root: ObjectId,
}

/// An immutable commit.
///
/// The generation is 0 for the initial commit and one more than the
/// highest parent generation otherwise. A commit has no parent (initial
/// commit), one parent, or two (merge commit).
#[derive(Clone, PartialEq, Eq)]
pub struct Commit {
    id: CommitId,
    data: CommitData,
    bytes: Vec<u8>,
}

impl Commit {
    /// Creates the initial commit of a page over the given (empty) tree.
    ///
    /// Every device creates the same initial commit, so all histories of a
    /// page share it as their common root.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the commit cannot be encoded.
    pub fn initial(root: ObjectId) -> CoreResult<Self> {
        Self::from_data(CommitData {
            timestamp: 0,
            generation: 0,
            parents: Vec::new(),
            root,
        })
    }

    /// Creates a commit on top of `parent`.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the commit cannot be encoded.
    pub fn new(parent: &Commit, root: ObjectId, timestamp: u64) -> CoreResult<Self> {
        Self::from_data(CommitData {
            timestamp,
            generation: parent.generation() + 1,
            parents: vec![parent.id],
            root,
        })
    }

    /// Creates a merge commit of `left` and `right`.
    ///
    /// The timestamp is the later of the parents' timestamps, so devices
    /// computing the same merge produce the same commit.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if both parents are the same
    /// commit.
    pub fn merge(left: &Commit, right: &Commit, root: ObjectId) -> CoreResult<Self> {
        if left.id == right.id {
            return Err(CoreError::invalid_argument(format!(
                "cannot merge commit {} with itself",
                left.id.short()
            )));
        }
        Self::from_data(CommitData {
            timestamp: left.timestamp().max(right.timestamp()),
            generation: left.generation().max(right.generation()) + 1,
            parents: vec![left.id, right.id],
            root,
        })
    }

    /// Rebuilds a commit received from another device.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCommit`] if the bytes do not hash to `id`,
    /// do not decode canonically, or describe an impossible commit.
    pub fn from_storage_bytes(id: CommitId, bytes: Vec<u8>) -> CoreResult<Self> {
        if !id.0.matches(&bytes) {
            return Err(CoreError::invalid_commit(format!(
                "bytes of commit {} do not match its id",
                id.short()
            )));
        }
        let data: CommitData = from_canonical_cbor(&bytes)
            .map_err(|e| CoreError::invalid_commit(format!("commit {}: {e}", id.short())))?;
        validate(&data).map_err(|message| {
            CoreError::invalid_commit(format!("commit {}: {message}", id.short()))
        })?;
        Ok(Self { id, data, bytes })
    }

    fn from_data(data: CommitData) -> CoreResult<Self> {
        let bytes = to_canonical_cbor(&data)?;
        let id = CommitId(ObjectId::of(&bytes));
        Ok(Self { id, data, bytes })
    }

    /// Returns the commit id.
    #[must_use]
    pub fn id(&self) -> CommitId {
        self.id
    }

    /// Returns the creation time in milliseconds.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.data.timestamp
    }

    /// Returns the generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.data.generation
    }

    /// Returns the parent ids. Merge commits list the left parent first.
    #[must_use]
    pub fn parent_ids(&self) -> &[CommitId] {
        &self.data.parents
    }

    /// Returns the root of the commit's content tree.
    #[must_use]
    pub fn root_id(&self) -> ObjectId {
        self.data.root
    }

    /// Returns true for merge commits.
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.data.parents.len() == 2
    }

    /// Returns the bytes the id is computed from.
    #[must_use]
    pub fn storage_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Sort key for heads: oldest first, ties broken by id.
    #[must_use]
    pub fn head_order(&self) -> (u64, CommitId) {
        (self.data.timestamp, self.id)
    }
}

impl fmt::Debug for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commit")
            .field("id", &self.id)
            .field("generation", &self.data.generation)
            .field("timestamp", &self.data.timestamp)
            .field("parents", &self.data.parents)
            .field("root", &self.data.root)
            .finish()
    }
}

fn validate(data: &CommitData) -> Result<(), &'static str> {
    match data.parents.as_slice() {
        [] if data.generation != 0 => Err("parentless commit with non-zero generation"),
        [_, ..] if data.generation == 0 => Err("commit with parents at generation zero"),
        [_, _, _, ..] => Err("more than two parents"),
        [left, right] if left == right => Err("duplicate parent"),
        _ => Ok(()),
    }
}
