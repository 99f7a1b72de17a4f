//! In-memory commit graph store.

use crate::clock::{Clock, SystemClock};
use crate::commit::{Commit, CommitId};
use crate::error::{CoreError, CoreResult};
use crate::store::{AddCallback, CommitCallback, CommitGraphStore, HeadsCallback};
use crate::watch::{ChangeSource, CommitWatcher, WatcherSet};
use folio_btree::{DefaultLevelCalculator, LevelCalculator, TreeNode};
use folio_codec::Encode;
use folio_coroutine::{Dispatcher, Task};
use folio_storage::{DispatchedObjectSource, ObjectId, ObjectSource, ObjectStore, StorageError};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

#[derive(Default)]
struct GraphState {
    commits: HashMap<CommitId, Commit>,
    /// Commit ids in insertion order, parents before children.
    order: Vec<CommitId>,
    heads: BTreeSet<CommitId>,
    unsynced_objects: BTreeSet<ObjectId>,
}

/// Builder for [`InMemoryPageStore`].
#[must_use]
pub struct PageStoreBuilder {
    objects: Option<Arc<ObjectStore>>,
    levels: Arc<dyn LevelCalculator>,
    clock: Arc<dyn Clock>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl Default for PageStoreBuilder {
    fn default() -> Self {
        Self {
            objects: None,
            levels: Arc::new(DefaultLevelCalculator::default()),
            clock: Arc::new(SystemClock),
            dispatcher: None,
        }
    }
}

impl PageStoreBuilder {
    /// Uses an existing object store instead of a fresh one.
    pub fn objects(mut self, objects: Arc<ObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    /// Sets the level calculator of the page's trees.
    pub fn levels(mut self, levels: Arc<dyn LevelCalculator>) -> Self {
        self.levels = levels;
        self
    }

    /// Sets the clock used for commit timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Completes every callback, object reads included, on `dispatcher`
    /// instead of inline.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Creates the store holding only the initial commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the empty tree cannot be stored.
    pub fn build(self) -> CoreResult<InMemoryPageStore> {
        let objects = self
            .objects
            .unwrap_or_else(|| Arc::new(ObjectStore::in_memory()));
        let empty_root = objects.put(&TreeNode::empty().encode()?)?;
        let initial = Commit::initial(empty_root)?;

        let source: Arc<dyn ObjectSource> = match &self.dispatcher {
            Some(dispatcher) => Arc::new(DispatchedObjectSource::new(
                Arc::clone(&objects),
                Arc::clone(dispatcher),
            )),
            None => Arc::clone(&objects) as Arc<dyn ObjectSource>,
        };

        let mut state = GraphState::default();
        state.heads.insert(initial.id());
        state.order.push(initial.id());
        state.commits.insert(initial.id(), initial);

        Ok(InMemoryPageStore {
            objects,
            source,
            levels: self.levels,
            clock: self.clock,
            dispatcher: self.dispatcher,
            state: Mutex::new(state),
            watchers: Arc::new(WatcherSet::new()),
        })
    }
}

/// A [`CommitGraphStore`] keeping the graph in memory and content in an
/// [`ObjectStore`].
///
/// Additions are validated and applied atomically: either every new commit
/// of a call is added or none is. Watchers are notified after the graph is
/// updated, before the caller's callback runs.
pub struct InMemoryPageStore {
    objects: Arc<ObjectStore>,
    source: Arc<dyn ObjectSource>,
    levels: Arc<dyn LevelCalculator>,
    clock: Arc<dyn Clock>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    state: Mutex<GraphState>,
    watchers: Arc<WatcherSet>,
}

impl InMemoryPageStore {
    /// Returns a builder.
    pub fn builder() -> PageStoreBuilder {
        PageStoreBuilder::default()
    }

    /// Creates a store with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the empty tree cannot be stored.
    pub fn new() -> CoreResult<Self> {
        Self::builder().build()
    }

    /// Returns the object store holding the page's content.
    #[must_use]
    pub fn objects(&self) -> &Arc<ObjectStore> {
        &self.objects
    }

    /// Returns the current heads, sorted by id.
    #[must_use]
    pub fn heads(&self) -> Vec<CommitId> {
        self.state.lock().heads.iter().copied().collect()
    }

    /// Returns a commit if present.
    #[must_use]
    pub fn commit(&self, id: &CommitId) -> Option<Commit> {
        self.state.lock().commits.get(id).cloned()
    }

    /// Returns true if the commit is present.
    #[must_use]
    pub fn contains_commit(&self, id: &CommitId) -> bool {
        self.state.lock().commits.contains_key(id)
    }

    /// Returns every commit, parents before children.
    #[must_use]
    pub fn commits(&self) -> Vec<Commit> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.commits.get(id).cloned())
            .collect()
    }

    /// Returns the number of commits, the initial one included.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.state.lock().order.len()
    }

    /// Returns the objects introduced by local commits.
    #[must_use]
    pub fn unsynced_objects(&self) -> Vec<ObjectId> {
        self.state.lock().unsynced_objects.iter().copied().collect()
    }

    /// Returns the number of live watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    fn complete(&self, task: Task) {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.post(task),
            None => task(),
        }
    }

    /// Validates and inserts `commits`, returning the ones that were new.
    fn insert(&self, commits: Vec<Commit>, new_objects: &[ObjectId]) -> CoreResult<Vec<Commit>> {
        let mut state = self.state.lock();
        let mut staged: Vec<Commit> = Vec::new();
        let mut staged_ids: HashSet<CommitId> = HashSet::new();

        for commit in commits {
            if state.commits.contains_key(&commit.id()) || staged_ids.contains(&commit.id()) {
                trace!(commit = %commit.id().short(), "commit already present");
                continue;
            }
            let mut max_generation = None;
            for parent in commit.parent_ids() {
                let generation = match state.commits.get(parent) {
                    Some(known) => known.generation(),
                    None => staged
                        .iter()
                        .find(|c| c.id() == *parent)
                        .map(Commit::generation)
                        .ok_or(CoreError::MissingParent {
                            commit: commit.id(),
                            parent: *parent,
                        })?,
                };
                max_generation = max_generation.max(Some(generation));
            }
            match max_generation {
                Some(generation) if commit.generation() != generation + 1 => {
                    return Err(CoreError::invalid_commit(format!(
                        "commit {} has generation {} over parents at {generation}",
                        commit.id().short(),
                        commit.generation()
                    )));
                }
                None => {
                    return Err(CoreError::invalid_commit(format!(
                        "second initial commit {}",
                        commit.id().short()
                    )));
                }
                _ => {}
            }
            if !self.objects.contains(&commit.root_id()) {
                return Err(StorageError::NotFound(commit.root_id()).into());
            }
            staged_ids.insert(commit.id());
            staged.push(commit);
        }

        for commit in &staged {
            for parent in commit.parent_ids() {
                state.heads.remove(parent);
            }
            state.heads.insert(commit.id());
            state.order.push(commit.id());
            state.commits.insert(commit.id(), commit.clone());
        }
        state.unsynced_objects.extend(new_objects.iter().copied());
        if !staged.is_empty() {
            debug!(
                added = staged.len(),
                heads = state.heads.len(),
                "commits added"
            );
        }
        Ok(staged)
    }

    fn add(
        &self,
        commits: Vec<Commit>,
        new_objects: &[ObjectId],
        source: ChangeSource,
        callback: AddCallback,
    ) {
        match self.insert(commits, new_objects) {
            Ok(added) => {
                let watchers = Arc::clone(&self.watchers);
                self.complete(Box::new(move || {
                    watchers.notify(&added, source);
                    callback(Ok(()));
                }));
            }
            Err(e) => {
                debug!(error = %e, ?source, "commit rejected");
                self.complete(Box::new(move || callback(Err(e))));
            }
        }
    }
}

impl CommitGraphStore for InMemoryPageStore {
    fn get_commit(&self, id: CommitId, callback: CommitCallback) {
        let result = self.commit(&id).ok_or(CoreError::CommitNotFound(id));
        self.complete(Box::new(move || callback(result)));
    }

    fn get_head_commit_ids(&self, callback: HeadsCallback) {
        let heads = self.heads();
        self.complete(Box::new(move || callback(Ok(heads))));
    }

    fn add_commit_from_local(
        &self,
        commit: Commit,
        new_objects: Vec<ObjectId>,
        callback: AddCallback,
    ) {
        self.add(vec![commit], &new_objects, ChangeSource::Local, callback);
    }

    fn add_commits_from_sync(&self, commits: Vec<Commit>, callback: AddCallback) {
        self.add(commits, &[], ChangeSource::Sync, callback);
    }

    fn watch(&self, watcher: Weak<dyn CommitWatcher>) {
        self.watchers.add(watcher);
    }

    fn object_source(&self) -> Arc<dyn ObjectSource> {
        Arc::clone(&self.source)
    }

    fn level_calculator(&self) -> Arc<dyn LevelCalculator> {
        Arc::clone(&self.levels)
    }

    fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }
}
