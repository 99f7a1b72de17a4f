//! The commit graph store contract.

use crate::commit::{Commit, CommitId};
use crate::error::CoreResult;
use crate::watch::CommitWatcher;
use folio_btree::LevelCalculator;
use folio_storage::{ObjectId, ObjectSource};
use std::sync::{Arc, Weak};

/// Completion of [`CommitGraphStore::get_commit`].
pub type CommitCallback = Box<dyn FnOnce(CoreResult<Commit>) + Send + 'static>;

/// Completion of [`CommitGraphStore::get_head_commit_ids`].
pub type HeadsCallback = Box<dyn FnOnce(CoreResult<Vec<CommitId>>) + Send + 'static>;

/// Completion of the commit-adding operations.
pub type AddCallback = Box<dyn FnOnce(CoreResult<()>) + Send + 'static>;

/// Persistent commit graph of one page.
///
/// The store is the single source of truth for commits and heads. Like
/// [`ObjectSource`], every operation completes through a callback invoked
/// exactly once, possibly on another thread; a dropped callback means the
/// operation was abandoned.
pub trait CommitGraphStore: Send + Sync {
    /// Reads a commit. Fails with `CommitNotFound` for unknown ids.
    fn get_commit(&self, id: CommitId, callback: CommitCallback);

    /// Lists the current heads. Never empty once the page exists.
    fn get_head_commit_ids(&self, callback: HeadsCallback);

    /// Adds a commit created on this device, together with the objects it
    /// introduced. Updates the heads and notifies watchers with
    /// [`ChangeSource::Local`](crate::ChangeSource::Local).
    fn add_commit_from_local(
        &self,
        commit: Commit,
        new_objects: Vec<ObjectId>,
        callback: AddCallback,
    );

    /// Adds commits received from another device, parents before children.
    /// Commits already present are skipped. Notifies watchers with
    /// [`ChangeSource::Sync`](crate::ChangeSource::Sync).
    fn add_commits_from_sync(&self, commits: Vec<Commit>, callback: AddCallback);

    /// Registers a watcher. Watchers are held weakly.
    fn watch(&self, watcher: Weak<dyn CommitWatcher>);

    /// Returns the object source holding the page's values and tree nodes.
    fn object_source(&self) -> Arc<dyn ObjectSource>;

    /// Returns the level calculator of the page's content trees.
    fn level_calculator(&self) -> Arc<dyn LevelCalculator>;

    /// Returns the current time for new commit timestamps.
    fn now_millis(&self) -> u64;
}
