//! Property tests for applying and diffing content trees.

use folio_btree::{
    apply_changes, empty_tree, for_each_diff, for_each_entry, get_entry, DefaultLevelCalculator,
    EntryChange, Priority, SynchronousStorage, WalkOutcome,
};
use folio_coroutine::CoroutineService;
use folio_storage::{ObjectId, ObjectStore, StorageResult};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::{mpsc, Arc};

type Contents = BTreeMap<Vec<u8>, u8>;

fn run<R, F>(f: F) -> R
where
    R: Send + 'static,
    F: FnOnce(&SynchronousStorage<'_>) -> R + Send + 'static,
{
    let store = Arc::new(ObjectStore::in_memory());
    let service = CoroutineService::new();
    let (tx, rx) = mpsc::channel();
    service
        .start_coroutine(move |handler| {
            let storage = SynchronousStorage::new(handler, store.as_ref());
            tx.send(f(&storage)).unwrap();
        })
        .unwrap();
    rx.recv().unwrap()
}

fn levels() -> DefaultLevelCalculator {
    // Small nodes so that even small key sets span several levels.
    DefaultLevelCalculator::new().fanout_bits(1)
}

fn value(v: u8) -> ObjectId {
    ObjectId::of(&[v])
}

fn to_changes(changes: &BTreeMap<Vec<u8>, Option<u8>>) -> Vec<EntryChange> {
    changes
        .iter()
        .map(|(key, v)| match v {
            Some(v) => EntryChange::put(key.clone(), value(*v), Priority::Eager),
            None => EntryChange::delete(key.clone()),
        })
        .collect()
}

fn build(storage: &SynchronousStorage<'_>, contents: &Contents) -> StorageResult<ObjectId> {
    let changes: BTreeMap<Vec<u8>, Option<u8>> =
        contents.iter().map(|(k, v)| (k.clone(), Some(*v))).collect();
    let empty = empty_tree(storage)?;
    Ok(apply_changes(storage, &levels(), empty, &to_changes(&changes))?.root)
}

fn read_all(storage: &SynchronousStorage<'_>, root: ObjectId) -> Vec<(Vec<u8>, ObjectId)> {
    let mut entries = Vec::new();
    let outcome = for_each_entry(storage, root, b"", |entry| {
        entries.push((entry.key, entry.value));
        true
    })
    .unwrap();
    assert_eq!(outcome, WalkOutcome::Completed);
    entries
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(b'a'..=b'f', 1..4)
}

fn contents_strategy() -> impl Strategy<Value = Contents> {
    prop::collection::btree_map(key_strategy(), 0u8..4, 0..60)
}

fn changes_strategy() -> impl Strategy<Value = BTreeMap<Vec<u8>, Option<u8>>> {
    prop::collection::btree_map(key_strategy(), prop::option::of(0u8..4), 0..30)
}

fn expected_after(base: &Contents, changes: &BTreeMap<Vec<u8>, Option<u8>>) -> Contents {
    let mut expected = base.clone();
    for (key, v) in changes {
        match v {
            Some(v) => expected.insert(key.clone(), *v),
            None => expected.remove(key),
        };
    }
    expected
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn apply_then_read(base in contents_strategy(), changes in changes_strategy()) {
        let expected = expected_after(&base, &changes);
        let probe: Vec<Vec<u8>> = base.keys().chain(changes.keys()).cloned().collect();

        let (entries, lookups) = run(move |storage| {
            let root = build(storage, &base).unwrap();
            let root = apply_changes(storage, &levels(), root, &to_changes(&changes)).unwrap().root;
            let lookups: Vec<(Vec<u8>, Option<ObjectId>)> = probe
                .into_iter()
                .map(|key| {
                    let found = get_entry(storage, root, &key).unwrap().map(|e| e.value);
                    (key, found)
                })
                .collect();
            (read_all(storage, root), lookups)
        });

        let wanted: Vec<(Vec<u8>, ObjectId)> =
            expected.iter().map(|(k, v)| (k.clone(), value(*v))).collect();
        prop_assert_eq!(entries, wanted);
        for (key, found) in lookups {
            prop_assert_eq!(found, expected.get(&key).map(|v| value(*v)));
        }
    }

    #[test]
    fn shape_depends_only_on_contents(base in contents_strategy(), changes in changes_strategy()) {
        let expected = expected_after(&base, &changes);
        let (incremental, direct, twice) = run(move |storage| {
            let changes = to_changes(&changes);
            let root = build(storage, &base).unwrap();
            let once = apply_changes(storage, &levels(), root, &changes).unwrap().root;
            let twice = apply_changes(storage, &levels(), once, &changes).unwrap();
            (once, build(storage, &expected).unwrap(), twice)
        });

        prop_assert_eq!(incremental, direct);
        prop_assert_eq!(twice.root, incremental);
        prop_assert!(twice.new_node_ids.is_empty());
    }

    #[test]
    fn diff_yields_effective_changes(base in contents_strategy(), changes in changes_strategy()) {
        let effective: Vec<EntryChange> = to_changes(&changes)
            .into_iter()
            .filter(|change| match change {
                EntryChange::Put(entry) => base.get(&entry.key).map(|v| value(*v)) != Some(entry.value),
                EntryChange::Delete { key } => base.contains_key(key),
            })
            .collect();

        let diff = run(move |storage| {
            let root = build(storage, &base).unwrap();
            let applied = apply_changes(storage, &levels(), root, &to_changes(&changes)).unwrap().root;
            let mut diff = Vec::new();
            for_each_diff(storage, root, applied, b"", |change| {
                diff.push(change);
                true
            })
            .unwrap();
            diff
        });

        prop_assert_eq!(diff, effective);
    }
}

#[test]
fn documented_example() {
    let (entries, diff) = run(|storage| {
        let a = storage.put_value(b"1".to_vec()).unwrap();
        let b = storage.put_value(b"2".to_vec()).unwrap();
        let c = storage.put_value(b"3".to_vec()).unwrap();
        let levels = levels();

        let empty = empty_tree(storage).unwrap();
        let old = apply_changes(
            storage,
            &levels,
            empty,
            &[
                EntryChange::put("a", a, Priority::Eager),
                EntryChange::put("b", b, Priority::Eager),
            ],
        )
        .unwrap()
        .root;
        let new = apply_changes(
            storage,
            &levels,
            old,
            &[
                EntryChange::delete("a"),
                EntryChange::put("c", c, Priority::Eager),
            ],
        )
        .unwrap()
        .root;

        let mut diff = Vec::new();
        for_each_diff(storage, old, new, b"", |change| {
            diff.push(change);
            true
        })
        .unwrap();
        let entries: Vec<(Vec<u8>, Vec<u8>)> = read_all(storage, new)
            .into_iter()
            .map(|(key, id)| (key, storage.value(id).unwrap()))
            .collect();
        (entries, diff)
    });

    assert_eq!(
        entries,
        vec![(b"b".to_vec(), b"2".to_vec()), (b"c".to_vec(), b"3".to_vec())]
    );
    assert_eq!(diff.len(), 2);
    assert_eq!(diff[0], EntryChange::delete("a"));
    assert_eq!(diff[1].key(), b"c");
    assert!(!diff[1].is_deletion());
}

#[test]
fn interrupted_walk_reports_interruption() {
    // A coroutine parked on a read that never completes is interrupted when
    // the service goes away.
    use folio_storage::{GetCallback, ObjectSource, PutCallback};

    struct Stalled(mpsc::Sender<GetCallback>);
    impl ObjectSource for Stalled {
        fn get_object(&self, _id: ObjectId, callback: GetCallback) {
            self.0.send(callback).unwrap();
        }
        fn put_object(&self, _bytes: Vec<u8>, callback: PutCallback) {
            drop(callback);
        }
    }

    let (pending_tx, pending_rx) = mpsc::channel();
    let (result_tx, result_rx) = mpsc::channel();
    let service = CoroutineService::new();
    service
        .start_coroutine(move |handler| {
            let source = Stalled(pending_tx);
            let storage = SynchronousStorage::new(handler, &source);
            let result = get_entry(&storage, ObjectId::of(b"root"), b"k");
            result_tx.send(result.map_err(|e| e.is_interrupted())).unwrap();
        })
        .unwrap();

    let _held = pending_rx.recv().unwrap();
    drop(service);
    assert_eq!(result_rx.recv().unwrap(), Err(true));
}
