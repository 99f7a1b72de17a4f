//! Coroutine adapter over a [`CommitGraphStore`].

use crate::commit::{Commit, CommitId};
use crate::error::{CoreError, CoreResult};
use crate::journal::{Journal, JournalBase, JournalValue};
use crate::store::CommitGraphStore;
use folio_btree::{apply_changes, for_each_entry, EntryChange, LevelCalculator, SynchronousStorage};
use folio_coroutine::{sync_call, CoroutineHandler, Waiter};
use folio_storage::{sync, ObjectId, ObjectSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Commit graph operations that suspend the calling coroutine instead of
/// taking callbacks.
///
/// Every method is a suspension point and reports interruption as an error
/// for which [`CoreError::is_interrupted`] holds.
pub struct SynchronousCommitGraph<'a> {
    handler: &'a CoroutineHandler,
    store: &'a dyn CommitGraphStore,
    objects: Arc<dyn ObjectSource>,
    levels: Arc<dyn LevelCalculator>,
}

impl<'a> SynchronousCommitGraph<'a> {
    /// Binds `store` to the coroutine owning `handler`.
    #[must_use]
    pub fn new(handler: &'a CoroutineHandler, store: &'a dyn CommitGraphStore) -> Self {
        Self {
            handler,
            store,
            objects: store.object_source(),
            levels: store.level_calculator(),
        }
    }

    /// Returns the bound coroutine handler.
    #[must_use]
    pub fn handler(&self) -> &'a CoroutineHandler {
        self.handler
    }

    /// Returns tree storage over the page's objects.
    #[must_use]
    pub fn storage(&self) -> SynchronousStorage<'_> {
        SynchronousStorage::new(self.handler, self.objects.as_ref())
    }

    /// Returns the level calculator of the page's trees.
    #[must_use]
    pub fn levels(&self) -> &dyn LevelCalculator {
        self.levels.as_ref()
    }

    /// Reads one commit.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CommitNotFound`] or an interruption.
    pub fn get_commit(&self, id: CommitId) -> CoreResult<Commit> {
        sync_call(self.handler, |done| {
            self.store
                .get_commit(id, Box::new(move |result| done.complete(result)));
        })?
    }

    /// Reads several commits with one batched request. Results are in
    /// `ids` order.
    ///
    /// # Errors
    ///
    /// Returns the first error in `ids` order, or an interruption if any
    /// request was abandoned.
    pub fn get_commits(&self, ids: &[CommitId]) -> CoreResult<Vec<Commit>> {
        let results = sync_call(self.handler, |done| {
            let waiter = Waiter::new(ids.len(), move |results| done.complete(results));
            for (index, id) in ids.iter().enumerate() {
                self.store.get_commit(*id, Box::new(waiter.callback(index)));
            }
        })?;
        results.into_iter().collect()
    }

    /// Lists the current head ids.
    ///
    /// # Errors
    ///
    /// Returns the store's error or an interruption.
    pub fn get_head_commit_ids(&self) -> CoreResult<Vec<CommitId>> {
        sync_call(self.handler, |done| {
            self.store
                .get_head_commit_ids(Box::new(move |result| done.complete(result)));
        })?
    }

    /// Reads the current heads, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the store's error or an interruption.
    pub fn get_head_commits(&self) -> CoreResult<Vec<Commit>> {
        let ids = self.get_head_commit_ids()?;
        let mut heads = self.get_commits(&ids)?;
        heads.sort_by_key(Commit::head_order);
        Ok(heads)
    }

    /// Adds a locally created commit.
    ///
    /// # Errors
    ///
    /// Returns the store's error or an interruption.
    pub fn add_commit_from_local(
        &self,
        commit: Commit,
        new_objects: Vec<ObjectId>,
    ) -> CoreResult<()> {
        sync_call(self.handler, |done| {
            self.store.add_commit_from_local(
                commit,
                new_objects,
                Box::new(move |result| done.complete(result)),
            );
        })?
    }

    /// Adds commits received from another device.
    ///
    /// # Errors
    ///
    /// Returns the store's error or an interruption.
    pub fn add_commits_from_sync(&self, commits: Vec<Commit>) -> CoreResult<()> {
        sync_call(self.handler, |done| {
            self.store
                .add_commits_from_sync(commits, Box::new(move |result| done.complete(result)));
        })?
    }

    /// Starts a journal on top of `parent`.
    #[must_use]
    pub fn start_commit(&self, parent: Commit) -> Journal {
        Journal::new(parent)
    }

    /// Starts a merge journal of `left` and `right`.
    #[must_use]
    pub fn start_merge_commit(&self, left: Commit, right: Commit) -> Journal {
        Journal::merge(left, right)
    }

    /// Writes the journal's values, builds the new tree and adds the
    /// resulting commit.
    ///
    /// A plain journal that leaves the content unchanged adds nothing and
    /// returns its parent. A merge journal always produces a merge commit.
    ///
    /// # Errors
    ///
    /// Returns the first storage or store error, or an interruption.
    pub fn commit_journal(&self, journal: Journal) -> CoreResult<Commit> {
        let base_root = journal.base_root();
        let (base, changes, cleared) = journal.into_parts();
        let storage = self.storage();

        let blobs: Vec<Vec<u8>> = changes
            .values()
            .filter_map(|change| match change {
                Some((JournalValue::Bytes(bytes), _)) => Some(bytes.clone()),
                _ => None,
            })
            .collect();
        let value_ids = sync::put_objects(self.handler, self.objects.as_ref(), blobs)?;
        let mut new_objects = value_ids.clone();
        let mut value_ids = value_ids.into_iter();

        let mut entry_changes: BTreeMap<Vec<u8>, EntryChange> = BTreeMap::new();
        for (key, change) in changes {
            let change = match change {
                Some((JournalValue::Bytes(_), priority)) => {
                    let value = value_ids.next().ok_or_else(|| {
                        CoreError::invalid_argument("value count mismatch")
                    })?;
                    EntryChange::put(key.clone(), value, priority)
                }
                Some((JournalValue::Object(value), priority)) => {
                    EntryChange::put(key.clone(), value, priority)
                }
                None => EntryChange::delete(key.clone()),
            };
            entry_changes.insert(key, change);
        }
        if cleared {
            let mut stale = Vec::new();
            for_each_entry(&storage, base_root, b"", |entry| {
                if !entry_changes.contains_key(&entry.key) {
                    stale.push(entry.key);
                }
                true
            })?;
            for key in stale {
                entry_changes.insert(key.clone(), EntryChange::delete(key));
            }
        }

        let changes: Vec<EntryChange> = entry_changes.into_values().collect();
        let outcome = apply_changes(&storage, self.levels(), base_root, &changes)?;
        new_objects.extend(outcome.new_node_ids);

        let commit = match base {
            JournalBase::Commit(parent) => {
                if outcome.root == parent.root_id() {
                    debug!(parent = %parent.id().short(), "empty journal, no commit");
                    return Ok(parent);
                }
                let timestamp = self.store.now_millis().max(parent.timestamp());
                Commit::new(&parent, outcome.root, timestamp)?
            }
            JournalBase::Merge { left, right } => Commit::merge(&left, &right, outcome.root)?,
        };

        debug!(
            commit = %commit.id().short(),
            generation = commit.generation(),
            changes = changes.len(),
            merge = commit.is_merge(),
            "journal committed"
        );
        self.add_commit_from_local(commit.clone(), new_objects)?;
        Ok(commit)
    }
}
