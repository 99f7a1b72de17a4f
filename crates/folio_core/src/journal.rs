//! Journals: pending changes on top of one or two commits.

use crate::commit::Commit;
use folio_btree::Priority;
use folio_storage::ObjectId;
use std::collections::BTreeMap;

/// A value written through a journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalValue {
    /// New bytes, stored when the journal is committed.
    Bytes(Vec<u8>),
    /// An object already in storage, typically taken from another commit.
    Object(ObjectId),
}

/// What a journal commits on top of.
#[derive(Debug, Clone)]
pub(crate) enum JournalBase {
    Commit(Commit),
    Merge { left: Commit, right: Commit },
}

/// Changes to a page, committed as one new commit.
///
/// A plain journal starts from its parent's content. A merge journal starts
/// from the left parent's content and produces a two-parent commit. Later
/// writes to a key replace earlier ones.
#[derive(Debug, Clone)]
pub struct Journal {
    base: JournalBase,
    changes: BTreeMap<Vec<u8>, Option<(JournalValue, Priority)>>,
    cleared: bool,
}

impl Journal {
    /// Starts a journal on top of `parent`.
    #[must_use]
    pub fn new(parent: Commit) -> Self {
        Self::with_base(JournalBase::Commit(parent))
    }

    /// Starts a merge journal of `left` and `right`, initialized with the
    /// content of `left`.
    #[must_use]
    pub fn merge(left: Commit, right: Commit) -> Self {
        Self::with_base(JournalBase::Merge { left, right })
    }

    fn with_base(base: JournalBase) -> Self {
        Self {
            base,
            changes: BTreeMap::new(),
            cleared: false,
        }
    }

    /// Sets `key` to new bytes.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, priority: Priority) {
        self.changes.insert(
            key.into(),
            Some((JournalValue::Bytes(value.into()), priority)),
        );
    }

    /// Sets `key` to an object already in storage.
    pub fn put_reference(&mut self, key: impl Into<Vec<u8>>, value: ObjectId, priority: Priority) {
        self.changes
            .insert(key.into(), Some((JournalValue::Object(value), priority)));
    }

    /// Removes `key`.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.changes.insert(key.into(), None);
    }

    /// Removes every key, including keys written earlier in this journal.
    pub fn clear(&mut self) {
        self.changes.clear();
        self.cleared = true;
    }

    /// Returns true for merge journals.
    #[must_use]
    pub fn is_merge(&self) -> bool {
        matches!(self.base, JournalBase::Merge { .. })
    }

    /// Returns the root of the content the journal starts from.
    #[must_use]
    pub fn base_root(&self) -> ObjectId {
        match &self.base {
            JournalBase::Commit(parent) => parent.root_id(),
            JournalBase::Merge { left, .. } => left.root_id(),
        }
    }

    /// Returns the parents of the commit this journal will produce.
    #[must_use]
    pub fn parents(&self) -> Vec<&Commit> {
        match &self.base {
            JournalBase::Commit(parent) => vec![parent],
            JournalBase::Merge { left, right } => vec![left, right],
        }
    }

    /// Returns the number of keys written or deleted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if nothing was written, deleted or cleared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && !self.cleared
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        JournalBase,
        BTreeMap<Vec<u8>, Option<(JournalValue, Priority)>>,
        bool,
    ) {
        (self.base, self.changes, self.cleared)
    }
}
