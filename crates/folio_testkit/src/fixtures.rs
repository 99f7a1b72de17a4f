//! Test fixtures and page helpers.
//!
//! Provides a self-contained page for tests that need commits, merges and
//! a running merge resolver without any threads of their own.

use folio_btree::{
    apply_changes, empty_tree, for_each_entry, EntryChange, LevelCalculator, Priority,
    SynchronousStorage,
};
use folio_core::{Commit, InMemoryPageStore, LogicalClock, SynchronousCommitGraph};
use folio_coroutine::{CoroutineService, ManualDispatcher};
use folio_merge::{
    BackoffConfig, LastOneWinsMergeStrategy, MergeResolver, MergeStrategy, ResolverConfig,
};
use folio_storage::{ObjectId, ObjectStore, StorageResult};
use std::collections::BTreeMap;
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// First backoff delay of a [`TestPage`] resolver.
pub const TEST_INITIAL_DELAY: Duration = Duration::from_millis(10);

/// Longest backoff delay of a [`TestPage`] resolver.
pub const TEST_MAX_DELAY: Duration = Duration::from_millis(80);

/// Passes of [`TestPage::settle`] before it gives up.
const SETTLE_ROUNDS: usize = 1_000;

/// Runs `f` inside a coroutine with tree storage over `store`.
///
/// # Panics
///
/// Panics if the coroutine cannot be started or does not finish.
pub fn with_storage<R, F>(store: &Arc<ObjectStore>, f: F) -> R
where
    R: Send + 'static,
    F: FnOnce(&SynchronousStorage<'_>) -> R + Send + 'static,
{
    let service = CoroutineService::new();
    let (tx, rx) = mpsc::channel();
    let store = Arc::clone(store);
    service
        .start_coroutine(move |handler| {
            let storage = SynchronousStorage::new(handler, store.as_ref());
            let _ = tx.send(f(&storage));
        })
        .expect("Failed to start coroutine");
    rx.recv().expect("Coroutine did not produce a result")
}

/// Stores `contents` as values and builds a tree holding them, starting
/// from the empty tree.
///
/// # Errors
///
/// Returns the first storage error.
pub fn write_tree(
    storage: &SynchronousStorage<'_>,
    levels: &dyn LevelCalculator,
    contents: &BTreeMap<Vec<u8>, Vec<u8>>,
) -> StorageResult<ObjectId> {
    let mut changes = Vec::with_capacity(contents.len());
    for (key, value) in contents {
        let id = storage.put_value(value.clone())?;
        changes.push(EntryChange::put(key.clone(), id, Priority::Eager));
    }
    let empty = empty_tree(storage)?;
    Ok(apply_changes(storage, levels, empty, &changes)?.root)
}

/// Reads every key and value of the tree at `root` as strings.
///
/// # Errors
///
/// Returns the first storage error.
pub fn read_tree(
    storage: &SynchronousStorage<'_>,
    root: ObjectId,
) -> StorageResult<BTreeMap<String, String>> {
    let mut entries = Vec::new();
    for_each_entry(storage, root, b"", |entry| {
        entries.push(entry);
        true
    })?;
    let mut contents = BTreeMap::new();
    for entry in entries {
        let value = storage.value(entry.value)?;
        contents.insert(
            String::from_utf8_lossy(&entry.key).into_owned(),
            String::from_utf8_lossy(&value).into_owned(),
        );
    }
    Ok(contents)
}

/// One device's copy of a page, with a merge resolver attached.
///
/// Commit timestamps come from a [`LogicalClock`] and every resolver check
/// and timer runs on a [`ManualDispatcher`], so nothing happens in the
/// background: call [`settle`](Self::settle) to let the resolver work.
pub struct TestPage {
    /// The page's commits and objects.
    pub store: Arc<InMemoryPageStore>,
    /// Service running the page's coroutines.
    pub service: Arc<CoroutineService>,
    /// Dispatcher the resolver posts its work to.
    pub dispatcher: Arc<ManualDispatcher>,
    /// The page's merge resolver. Has no strategy until one is set.
    pub resolver: MergeResolver,
}

impl TestPage {
    /// Creates a page whose resolver backs off without jitter, from
    /// [`TEST_INITIAL_DELAY`] up to [`TEST_MAX_DELAY`].
    pub fn new() -> Self {
        Self::with_config(
            ResolverConfig::new().with_backoff(
                BackoffConfig::new()
                    .with_initial_delay(TEST_INITIAL_DELAY)
                    .with_max_delay(TEST_MAX_DELAY)
                    .with_jitter(false),
            ),
        )
    }

    /// Creates a page with a custom resolver configuration.
    pub fn with_config(config: ResolverConfig) -> Self {
        let store = Arc::new(
            InMemoryPageStore::builder()
                .clock(Arc::new(LogicalClock::default()))
                .build()
                .expect("Failed to create page store"),
        );
        let service = Arc::new(CoroutineService::new());
        let dispatcher = Arc::new(ManualDispatcher::new());
        let resolver = MergeResolver::new(
            store.clone(),
            Arc::clone(&service),
            dispatcher.clone(),
            config,
        );
        Self {
            store,
            service,
            dispatcher,
            resolver,
        }
    }

    /// Installs `strategy` on the resolver.
    pub fn set_strategy(&self, strategy: Arc<dyn MergeStrategy>) {
        self.resolver.set_strategy(Some(strategy));
    }

    /// Installs the last-one-wins strategy on the resolver.
    pub fn use_last_one_wins(&self) {
        self.set_strategy(Arc::new(LastOneWinsMergeStrategy::new()));
    }

    /// Runs `f` in a coroutine over this page's commit graph.
    ///
    /// # Panics
    ///
    /// Panics if the coroutine cannot be started or does not finish.
    pub fn run<R, F>(&self, f: F) -> R
    where
        R: Send + 'static,
        F: FnOnce(&SynchronousCommitGraph<'_>) -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let store = Arc::clone(&self.store);
        self.service
            .start_coroutine(move |handler| {
                let graph = SynchronousCommitGraph::new(handler, store.as_ref());
                let _ = tx.send(f(&graph));
            })
            .expect("Failed to start coroutine");
        rx.recv().expect("Coroutine did not produce a result")
    }

    /// Returns the page's initial commit.
    pub fn initial(&self) -> Commit {
        self.store
            .commits()
            .into_iter()
            .next()
            .expect("Page has no initial commit")
    }

    /// Commits `puts` and `deletes` on top of `parent`.
    pub fn commit(&self, parent: &Commit, puts: &[(&str, &str)], deletes: &[&str]) -> Commit {
        let parent = parent.clone();
        let puts = owned_pairs(puts);
        let deletes: Vec<String> = deletes.iter().map(|k| (*k).to_string()).collect();
        self.run(move |graph| {
            let mut journal = graph.start_commit(parent);
            for (key, value) in puts {
                journal.put(key, value, Priority::Eager);
            }
            for key in deletes {
                journal.delete(key);
            }
            graph.commit_journal(journal).expect("Failed to commit")
        })
    }

    /// Commits a merge of `left` and `right` holding the left content plus
    /// `puts`.
    pub fn merge(&self, left: &Commit, right: &Commit, puts: &[(&str, &str)]) -> Commit {
        let (left, right) = (left.clone(), right.clone());
        let puts = owned_pairs(puts);
        self.run(move |graph| {
            let mut journal = graph.start_merge_commit(left, right);
            for (key, value) in puts {
                journal.put(key, value, Priority::Eager);
            }
            graph.commit_journal(journal).expect("Failed to commit merge")
        })
    }

    /// Returns the current heads, oldest first.
    pub fn heads(&self) -> Vec<Commit> {
        self.run(|graph| graph.get_head_commits().expect("Failed to list heads"))
    }

    /// Returns the single head of a settled page.
    ///
    /// # Panics
    ///
    /// Panics if the page has several heads.
    pub fn head(&self) -> Commit {
        let mut heads = self.heads();
        assert_eq!(heads.len(), 1, "Page has {} heads", heads.len());
        heads.remove(0)
    }

    /// Returns the content of `commit` as strings.
    pub fn contents(&self, commit: &Commit) -> BTreeMap<String, String> {
        let root = commit.root_id();
        self.run(move |graph| read_tree(&graph.storage(), root).expect("Failed to read tree"))
    }

    /// Drives the dispatcher until the resolver has no unfinished merges,
    /// moving virtual time forward through backoff delays.
    ///
    /// # Panics
    ///
    /// Panics if the resolver keeps finding work.
    pub fn settle(&self) {
        for _ in 0..SETTLE_ROUNDS {
            self.dispatcher.run_until_idle();
            if !self.resolver.has_unfinished_merges() {
                return;
            }
            self.dispatcher.advance(TEST_MAX_DELAY);
        }
        panic!(
            "Page did not settle: resolver is {:?} with {} queued tasks",
            self.resolver.state(),
            self.dispatcher.pending()
        );
    }
}

impl Default for TestPage {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds an owned map from string pairs.
pub fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn owned_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}
