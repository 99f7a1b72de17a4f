//! Shared helpers for the merge integration tests.

#![allow(dead_code)]

use folio_btree::{for_each_entry, Priority};
use folio_core::{Commit, InMemoryPageStore, LogicalClock, SynchronousCommitGraph};
use folio_coroutine::{CoroutineService, ManualDispatcher};
use std::collections::BTreeMap;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

/// One device's copy of a page.
pub struct Device {
    pub store: Arc<InMemoryPageStore>,
    pub service: Arc<CoroutineService>,
    pub dispatcher: Arc<ManualDispatcher>,
}

impl Device {
    pub fn new() -> Self {
        Self {
            store: Arc::new(
                InMemoryPageStore::builder()
                    .clock(Arc::new(LogicalClock::default()))
                    .build()
                    .unwrap(),
            ),
            service: Arc::new(CoroutineService::new()),
            dispatcher: Arc::new(ManualDispatcher::new()),
        }
    }

    /// Runs `f` in a coroutine over this device's store.
    pub fn with<R, F>(&self, f: F) -> R
    where
        R: Send + 'static,
        F: FnOnce(&SynchronousCommitGraph<'_>) -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let store = Arc::clone(&self.store);
        self.service
            .start_coroutine(move |handler| {
                let graph = SynchronousCommitGraph::new(handler, store.as_ref());
                tx.send(f(&graph)).unwrap();
            })
            .unwrap();
        rx.recv().unwrap()
    }

    pub fn initial(&self) -> Commit {
        self.store.commits().remove(0)
    }

    /// Commits `puts` and `deletes` on top of `parent`.
    pub fn commit(&self, parent: &Commit, puts: &[(&str, &str)], deletes: &[&str]) -> Commit {
        let parent = parent.clone();
        let puts: Vec<(String, String)> = puts
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let deletes: Vec<String> = deletes.iter().map(|k| k.to_string()).collect();
        self.with(move |graph| {
            let mut journal = graph.start_commit(parent);
            for (key, value) in puts {
                journal.put(key, value, Priority::Eager);
            }
            for key in deletes {
                journal.delete(key);
            }
            graph.commit_journal(journal).unwrap()
        })
    }

    /// Commits a merge of `left` and `right` holding the left content plus
    /// `puts`.
    pub fn merge(&self, left: &Commit, right: &Commit, puts: &[(&str, &str)]) -> Commit {
        let (left, right) = (left.clone(), right.clone());
        let puts: Vec<(String, String)> = puts
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.with(move |graph| {
            let mut journal = graph.start_merge_commit(left, right);
            for (key, value) in puts {
                journal.put(key, value, Priority::Eager);
            }
            graph.commit_journal(journal).unwrap()
        })
    }

    pub fn heads(&self) -> Vec<Commit> {
        self.with(|graph| graph.get_head_commits().unwrap())
    }

    pub fn contents(&self, commit: &Commit) -> BTreeMap<String, String> {
        let root = commit.root_id();
        self.with(move |graph| {
            let storage = graph.storage();
            let mut entries = Vec::new();
            for_each_entry(&storage, root, b"", |entry| {
                entries.push(entry);
                true
            })
            .unwrap();
            entries
                .into_iter()
                .map(|entry| {
                    let value = storage.value(entry.value).unwrap();
                    (
                        String::from_utf8(entry.key).unwrap(),
                        String::from_utf8(value).unwrap(),
                    )
                })
                .collect()
        })
    }
}

/// Copies every object and commit of `from` into `to` as a sync would.
pub fn sync(from: &Device, to: &Device) {
    for id in from.store.objects().object_ids() {
        let bytes = from.store.objects().get(&id).unwrap();
        to.store.objects().put(&bytes).unwrap();
    }
    let commits = from.store.commits();
    to.with(move |graph| graph.add_commits_from_sync(commits).unwrap());
}

pub fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Polls `condition` until it holds or a second has passed.
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
