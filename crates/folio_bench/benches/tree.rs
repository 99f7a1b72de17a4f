//! Content tree benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use folio_bench::{generate_contents, key, random_data};
use folio_btree::{
    apply_changes, empty_tree, for_each_diff, for_each_three_way_diff, get_entry,
    DefaultLevelCalculator, EntryChange, Priority,
};
use folio_storage::{ObjectId, ObjectStore};
use folio_testkit::{with_storage, write_tree};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Builds a tree of `count` keys and returns it with its store.
fn populated_tree(count: usize) -> (Arc<ObjectStore>, ObjectId) {
    let store = Arc::new(ObjectStore::in_memory());
    let contents = generate_contents(count, 32);
    let root = with_storage(&store, move |storage| {
        write_tree(storage, &DefaultLevelCalculator::new(), &contents).unwrap()
    });
    (store, root)
}

/// Rewrites every `stride`-th key of the tree at `root`.
fn modified_tree(
    store: &Arc<ObjectStore>,
    root: ObjectId,
    count: usize,
    stride: usize,
) -> ObjectId {
    with_storage(store, move |storage| {
        let value = storage.put_value(random_data(32)).unwrap();
        let changes: Vec<EntryChange> = (0..count)
            .step_by(stride)
            .map(|i| EntryChange::put(key(i), value, Priority::Eager))
            .collect();
        apply_changes(storage, &DefaultLevelCalculator::new(), root, &changes)
            .unwrap()
            .root
    })
}

/// Benchmark building a tree from scratch in one application.
fn bench_apply_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_batch");

    for count in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let store = Arc::new(ObjectStore::in_memory());
            let contents = generate_contents(count, 32);

            b.iter_custom(|iters| {
                let contents = contents.clone();
                with_storage(&store, move |storage| {
                    let levels = DefaultLevelCalculator::new();
                    let start = Instant::now();
                    for _ in 0..iters {
                        let root = write_tree(storage, &levels, &contents).unwrap();
                        black_box(root);
                    }
                    start.elapsed()
                })
            });
        });
    }
    group.finish();
}

/// Benchmark a single put into a populated tree.
fn bench_apply_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_single");

    for count in [1_000usize, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (store, root) = populated_tree(count);

            b.iter_custom(|iters| {
                with_storage(&store, move |storage| {
                    let levels = DefaultLevelCalculator::new();
                    let mut elapsed = Duration::ZERO;
                    for i in 0..iters {
                        let value = storage.put_value(i.to_le_bytes().to_vec()).unwrap();
                        let change = [EntryChange::put(key(count / 2), value, Priority::Eager)];
                        let start = Instant::now();
                        let outcome = apply_changes(storage, &levels, root, &change).unwrap();
                        elapsed += start.elapsed();
                        black_box(outcome);
                    }
                    elapsed
                })
            });
        });
    }
    group.finish();
}

/// Benchmark point lookups.
fn bench_get_entry(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_entry");

    for count in [1_000usize, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (store, root) = populated_tree(count);

            b.iter_custom(|iters| {
                with_storage(&store, move |storage| {
                    let start = Instant::now();
                    for i in 0..iters {
                        let index = usize::try_from(i).unwrap_or(0) % count;
                        let entry = get_entry(storage, root, &key(index)).unwrap();
                        black_box(entry);
                    }
                    start.elapsed()
                })
            });
        });
    }
    group.finish();
}

/// Benchmark diffs of a 10k-key tree against copies differing in a growing
/// number of keys. Shared subtrees are skipped, so cost follows the change.
fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    let count = 10_000;
    let (store, base) = populated_tree(count);

    for changed in [1usize, 10, 100, 1000].iter() {
        let other = modified_tree(&store, base, count, count / changed);
        group.throughput(Throughput::Elements(*changed as u64));
        group.bench_with_input(BenchmarkId::from_parameter(changed), changed, |b, _| {
            b.iter_custom(|iters| {
                with_storage(&store, move |storage| {
                    let start = Instant::now();
                    for _ in 0..iters {
                        let mut seen = 0usize;
                        for_each_diff(storage, base, other, b"", |change| {
                            seen += black_box(change).key().len();
                            true
                        })
                        .unwrap();
                        black_box(seen);
                    }
                    start.elapsed()
                })
            });
        });
    }
    group.finish();
}

/// Benchmark three-way diffs where both sides changed disjoint keys.
fn bench_three_way_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("three_way_diff");
    let count = 10_000;
    let (store, base) = populated_tree(count);

    for changed in [10usize, 100].iter() {
        let left = modified_tree(&store, base, count, count / changed);
        let right = with_storage(&store, {
            let changed = *changed;
            move |storage| {
                let value = storage.put_value(random_data(32)).unwrap();
                let changes: Vec<EntryChange> = (1..count)
                    .step_by(count / changed)
                    .map(|i| EntryChange::put(key(i), value, Priority::Eager))
                    .collect();
                apply_changes(storage, &DefaultLevelCalculator::new(), base, &changes)
                    .unwrap()
                    .root
            }
        });
        group.bench_with_input(BenchmarkId::from_parameter(changed), changed, |b, _| {
            b.iter_custom(|iters| {
                with_storage(&store, move |storage| {
                    let start = Instant::now();
                    for _ in 0..iters {
                        let mut conflicts = 0usize;
                        for_each_three_way_diff(storage, base, left, right, b"", |change| {
                            conflicts += usize::from(change.is_conflict());
                            true
                        })
                        .unwrap();
                        black_box(conflicts);
                    }
                    start.elapsed()
                })
            });
        });
    }
    group.finish();
}

/// Benchmark storing the empty tree, the fixed cost of every new page.
fn bench_empty_tree(c: &mut Criterion) {
    let store = Arc::new(ObjectStore::in_memory());
    c.bench_function("empty_tree", |b| {
        b.iter_custom(|iters| {
            with_storage(&store, move |storage| {
                let start = Instant::now();
                for _ in 0..iters {
                    black_box(empty_tree(storage).unwrap());
                }
                start.elapsed()
            })
        });
    });
}

criterion_group!(
    benches,
    bench_apply_batch,
    bench_apply_single,
    bench_get_entry,
    bench_diff,
    bench_three_way_diff,
    bench_empty_tree,
);

criterion_main!(benches);
