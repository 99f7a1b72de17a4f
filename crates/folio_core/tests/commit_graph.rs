//! Journals and the coroutine adapter over the in-memory store.

use folio_btree::{for_each_entry, get_entry, Priority};
use folio_core::{
    ChangeSource, Commit, CommitWatcher, CoreResult, InMemoryPageStore, LogicalClock,
    SynchronousCommitGraph,
};
use folio_coroutine::{CoroutineService, ThreadDispatcher};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::{mpsc, Arc, Weak};

fn run<R, F>(store: &Arc<InMemoryPageStore>, f: F) -> R
where
    R: Send + 'static,
    F: FnOnce(&SynchronousCommitGraph<'_>) -> R + Send + 'static,
{
    let service = CoroutineService::new();
    let (tx, rx) = mpsc::channel();
    let store = Arc::clone(store);
    service
        .start_coroutine(move |handler| {
            let graph = SynchronousCommitGraph::new(handler, store.as_ref());
            tx.send(f(&graph)).unwrap();
        })
        .unwrap();
    rx.recv().unwrap()
}

fn page() -> Arc<InMemoryPageStore> {
    Arc::new(
        InMemoryPageStore::builder()
            .clock(Arc::new(LogicalClock::default()))
            .build()
            .unwrap(),
    )
}

fn read(graph: &SynchronousCommitGraph<'_>, commit: &Commit, key: &str) -> Option<Vec<u8>> {
    let storage = graph.storage();
    get_entry(&storage, commit.root_id(), key.as_bytes())
        .unwrap()
        .map(|entry| storage.value(entry.value).unwrap())
}

#[test]
fn commit_and_read_back() {
    let store = page();
    let (commit, value, missing) = run(&store, |graph| {
        let head = graph.get_head_commits().unwrap().remove(0);
        let mut journal = graph.start_commit(head);
        journal.put("name", "folio", Priority::Eager);
        let commit = graph.commit_journal(journal).unwrap();
        let value = read(graph, &commit, "name");
        let missing = read(graph, &commit, "other");
        (commit, value, missing)
    });

    assert_eq!(value, Some(b"folio".to_vec()));
    assert_eq!(missing, None);
    assert_eq!(store.heads(), vec![commit.id()]);
    assert_eq!(commit.generation(), 1);
    assert!(store.unsynced_objects().contains(&commit.root_id()));
}

#[test]
fn empty_journal_adds_nothing() {
    let store = page();
    let (head, result) = run(&store, |graph| {
        let head = graph.get_head_commits().unwrap().remove(0);
        let journal = graph.start_commit(head.clone());
        (head, graph.commit_journal(journal).unwrap())
    });
    assert_eq!(result.id(), head.id());
    assert_eq!(store.commit_count(), 1);
}

#[test]
fn clear_removes_every_key() {
    let store = page();
    let values = run(&store, |graph| {
        let head = graph.get_head_commits().unwrap().remove(0);
        let mut journal = graph.start_commit(head);
        for key in ["a", "b", "c"] {
            journal.put(key, key, Priority::Eager);
        }
        let first = graph.commit_journal(journal).unwrap();

        let mut journal = graph.start_commit(first);
        journal.clear();
        journal.put("d", "d", Priority::Lazy);
        let second = graph.commit_journal(journal).unwrap();
        ["a", "b", "c", "d"]
            .iter()
            .map(|key| read(graph, &second, key))
            .collect::<Vec<_>>()
    });
    assert_eq!(values, vec![None, None, None, Some(b"d".to_vec())]);
}

#[test]
fn merge_journal_produces_two_parent_commit() {
    let store = page();
    let (merge, left, right, content) = run(&store, |graph| {
        let initial = graph.get_head_commits().unwrap().remove(0);
        let mut journal = graph.start_commit(initial.clone());
        journal.put("left", "l", Priority::Eager);
        let left = graph.commit_journal(journal).unwrap();

        let mut journal = graph.start_commit(initial);
        journal.put("right", "r", Priority::Eager);
        let right = graph.commit_journal(journal).unwrap();
        assert_eq!(graph.get_head_commit_ids().unwrap().len(), 2);

        let mut journal = graph.start_merge_commit(left.clone(), right.clone());
        journal.put("right", "r", Priority::Eager);
        let merge = graph.commit_journal(journal).unwrap();
        let content = (read(graph, &merge, "left"), read(graph, &merge, "right"));
        (merge, left, right, content)
    });

    assert_eq!(merge.parent_ids(), &[left.id(), right.id()]);
    assert_eq!(merge.timestamp(), left.timestamp().max(right.timestamp()));
    assert_eq!(store.heads(), vec![merge.id()]);
    assert_eq!(content, (Some(b"l".to_vec()), Some(b"r".to_vec())));
}

#[test]
fn local_commits_notify_watchers_as_local() {
    #[derive(Default)]
    struct Sources(Mutex<Vec<ChangeSource>>);
    impl CommitWatcher for Sources {
        fn on_new_commits(&self, _commits: &[Commit], source: ChangeSource) {
            self.0.lock().push(source);
        }
    }

    let store = page();
    let sources = Arc::new(Sources::default());
    let weak: Weak<dyn CommitWatcher> = Arc::downgrade(&sources) as Weak<dyn CommitWatcher>;
    folio_core::CommitGraphStore::watch(store.as_ref(), weak);

    run(&store, |graph| {
        let head = graph.get_head_commits().unwrap().remove(0);
        let mut journal = graph.start_commit(head);
        journal.put("k", "v", Priority::Eager);
        graph.commit_journal(journal).unwrap();
    });

    let replica = page();
    let commits: Vec<Commit> = store.commits().into_iter().skip(1).collect();
    for id in store.objects().object_ids() {
        replica.objects().put(&store.objects().get(&id).unwrap()).unwrap();
    }
    let weak: Weak<dyn CommitWatcher> = Arc::downgrade(&sources) as Weak<dyn CommitWatcher>;
    folio_core::CommitGraphStore::watch(replica.as_ref(), weak);
    let added: CoreResult<()> = run(&replica, move |graph| graph.add_commits_from_sync(commits));
    added.unwrap();

    assert_eq!(
        *sources.0.lock(),
        vec![ChangeSource::Local, ChangeSource::Sync]
    );
    assert_eq!(replica.heads(), store.heads());
}

#[test]
fn works_with_cross_thread_completions() {
    let dispatcher = Arc::new(ThreadDispatcher::new("page-io").unwrap());
    let store = Arc::new(
        InMemoryPageStore::builder()
            .dispatcher(dispatcher)
            .build()
            .unwrap(),
    );

    let value = run(&store, |graph| {
        let head = graph.get_head_commits().unwrap().remove(0);
        let mut journal = graph.start_commit(head);
        for i in 0..50 {
            journal.put(format!("key{i:02}"), format!("value{i}"), Priority::Eager);
        }
        let commit = graph.commit_journal(journal).unwrap();
        read(graph, &commit, "key42")
    });
    assert_eq!(value, Some(b"value42".to_vec()));
}

#[test]
fn missing_commit_is_not_found() {
    let store = page();
    let status = run(&store, |graph| {
        let id = folio_core::CommitId::from(folio_storage::ObjectId::of(b"nothing"));
        graph.get_commit(id).map_err(|e| e.status())
    });
    assert_eq!(status.err(), Some(folio_storage::Status::NotFound));
}

/// One journal: `Some` puts, `None` deletes, and a flag clearing the page first.
type Edit = (bool, BTreeMap<String, Option<String>>);

fn edit_strategy() -> impl Strategy<Value = Edit> {
    (
        prop::bool::weighted(0.1),
        prop::collection::btree_map(
            "[a-e]{1,2}",
            prop::option::weighted(0.7, "[a-z]{0,4}"),
            0..6,
        ),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn successive_journals_match_a_map_model(edits in prop::collection::vec(edit_strategy(), 1..6)) {
        let mut model: BTreeMap<String, String> = BTreeMap::new();
        for (clear, changes) in &edits {
            if *clear {
                model.clear();
            }
            for (key, value) in changes {
                match value {
                    Some(value) => model.insert(key.clone(), value.clone()),
                    None => model.remove(key),
                };
            }
        }

        let store = page();
        let contents = run(&store, move |graph| {
            let mut head = graph.get_head_commits().unwrap().remove(0);
            for (clear, changes) in edits {
                let mut journal = graph.start_commit(head);
                if clear {
                    journal.clear();
                }
                for (key, value) in changes {
                    match value {
                        Some(value) => journal.put(key, value, Priority::Eager),
                        None => journal.delete(key),
                    }
                }
                head = graph.commit_journal(journal).unwrap();
            }

            let storage = graph.storage();
            let mut entries = Vec::new();
            for_each_entry(&storage, head.root_id(), b"", |entry| {
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
                .collect::<BTreeMap<_, _>>()
        });

        prop_assert_eq!(contents, model);
        prop_assert_eq!(store.heads().len(), 1);
    }
}
