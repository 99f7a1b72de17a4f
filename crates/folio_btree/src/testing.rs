//! Helpers shared by the unit tests.

use crate::apply::{apply_changes, empty_tree};
use crate::entry::{EntryChange, Priority, WalkOutcome};
use crate::level::LevelCalculator;
use crate::read::for_each_entry;
use crate::storage::SynchronousStorage;
use folio_coroutine::CoroutineService;
use folio_storage::{ObjectId, ObjectStore, StorageResult};
use std::collections::HashMap;
use std::sync::{mpsc, Arc};

/// Runs `f` inside a coroutine with storage over `store`.
pub(crate) fn with_storage<R, F>(store: &Arc<ObjectStore>, f: F) -> R
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
            tx.send(f(&storage)).unwrap();
        })
        .unwrap();
    rx.recv().unwrap()
}

/// Levels given per key; unlisted keys are leaves.
#[derive(Default)]
pub(crate) struct FixedLevels(pub(crate) HashMap<Vec<u8>, u8>);

impl FixedLevels {
    pub(crate) fn new(levels: &[(&str, u8)]) -> Self {
        Self(
            levels
                .iter()
                .map(|(key, level)| (key.as_bytes().to_vec(), *level))
                .collect(),
        )
    }
}

impl LevelCalculator for FixedLevels {
    fn level(&self, key: &[u8]) -> u8 {
        self.0.get(key).copied().unwrap_or(0)
    }
}

pub(crate) fn value(label: &str) -> ObjectId {
    ObjectId::of(label.as_bytes())
}

pub(crate) fn put(key: &str, label: &str) -> EntryChange {
    EntryChange::put(key, value(label), Priority::Eager)
}

/// Builds a tree holding `pairs` in one application.
pub(crate) fn build(
    storage: &SynchronousStorage<'_>,
    levels: &dyn LevelCalculator,
    pairs: &[(&str, &str)],
) -> StorageResult<ObjectId> {
    let mut changes: Vec<EntryChange> = pairs.iter().map(|(k, v)| put(k, v)).collect();
    changes.sort_by(|a, b| a.key().cmp(b.key()));
    let empty = empty_tree(storage)?;
    Ok(apply_changes(storage, levels, empty, &changes)?.root)
}

/// Returns every (key, value) of a tree in order.
pub(crate) fn contents(
    storage: &SynchronousStorage<'_>,
    root: ObjectId,
) -> StorageResult<Vec<(Vec<u8>, ObjectId)>> {
    let mut out = Vec::new();
    let outcome = for_each_entry(storage, root, b"", |entry| {
        out.push((entry.key, entry.value));
        true
    })?;
    assert_eq!(outcome, WalkOutcome::Completed);
    Ok(out)
}
