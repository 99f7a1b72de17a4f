//! Structural comparison of trees.
//!
//! Both trees are walked in key order side by side. Subtrees with the same
//! id hold the same entries and are skipped without being read, so the
//! cost of a diff grows with the size of the difference rather than the
//! size of the trees.

use crate::cursor::{Cursor, Head};
use crate::entry::{Entry, EntryChange, ThreeWayChange, WalkOutcome};
use crate::storage::SynchronousStorage;
use folio_storage::{ObjectId, StorageResult};
use std::cmp::Ordering;
use tracing::trace;

/// A key present with different entries in two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntryDiff {
    pub(crate) base: Option<Entry>,
    pub(crate) other: Option<Entry>,
}

impl EntryDiff {
    fn key(&self) -> &[u8] {
        self.base
            .as_ref()
            .or(self.other.as_ref())
            .map_or(&[][..], |entry| entry.key.as_slice())
    }

    /// The change turning the base entry into the other one.
    fn into_change(self) -> EntryChange {
        match (self.other, self.base) {
            (Some(entry), _) => EntryChange::Put(entry),
            (None, Some(entry)) => EntryChange::Delete { key: entry.key },
            (None, None) => EntryChange::Delete { key: Vec::new() },
        }
    }
}

/// Pull-based walk over the differences of two trees.
pub(crate) struct DiffWalker<'s, 'a> {
    base: Cursor<'s, 'a>,
    other: Cursor<'s, 'a>,
}

impl<'s, 'a> DiffWalker<'s, 'a> {
    pub(crate) fn new(
        storage: &'s SynchronousStorage<'a>,
        base: ObjectId,
        other: ObjectId,
        min_key: &[u8],
    ) -> StorageResult<Self> {
        Ok(Self {
            base: Cursor::new(storage, base, min_key)?,
            other: Cursor::new(storage, other, min_key)?,
        })
    }

    /// Returns the next differing key, in key order.
    pub(crate) fn next_diff(&mut self) -> StorageResult<Option<EntryDiff>> {
        loop {
            match (self.base.head(), self.other.head()) {
                (None, None) => return Ok(None),
                (
                    Some(Head::Child {
                        id: base_id,
                        parent_level: base_level,
                    }),
                    Some(Head::Child {
                        id: other_id,
                        parent_level: other_level,
                    }),
                ) => {
                    if base_id == other_id {
                        trace!(node = %base_id.short(), "shared subtree skipped");
                        self.base.advance();
                        self.other.advance();
                        continue;
                    }
                    // Open the taller side first; equal heights open both.
                    match base_level.cmp(&other_level) {
                        Ordering::Greater => self.base.expand()?,
                        Ordering::Less => self.other.expand()?,
                        Ordering::Equal => {
                            self.base.expand()?;
                            self.other.expand()?;
                        }
                    }
                }
                (Some(Head::Child { .. }), _) => self.base.expand()?,
                (_, Some(Head::Child { .. })) => self.other.expand()?,
                (Some(Head::Entry(base)), None) => {
                    self.base.advance();
                    return Ok(Some(EntryDiff {
                        base: Some(base),
                        other: None,
                    }));
                }
                (None, Some(Head::Entry(other))) => {
                    self.other.advance();
                    return Ok(Some(EntryDiff {
                        base: None,
                        other: Some(other),
                    }));
                }
                (Some(Head::Entry(base)), Some(Head::Entry(other))) => {
                    match base.key.cmp(&other.key) {
                        Ordering::Less => {
                            self.base.advance();
                            return Ok(Some(EntryDiff {
                                base: Some(base),
                                other: None,
                            }));
                        }
                        Ordering::Greater => {
                            self.other.advance();
                            return Ok(Some(EntryDiff {
                                base: None,
                                other: Some(other),
                            }));
                        }
                        Ordering::Equal => {
                            self.base.advance();
                            self.other.advance();
                            if base != other {
                                return Ok(Some(EntryDiff {
                                    base: Some(base),
                                    other: Some(other),
                                }));
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Calls `on_next` with the change turning `base` into `other` for every
/// differing key at or after `min_key`, in key order.
///
/// A key differs when it is present in only one tree, or when its value id
/// or priority differs. Returning `false` from `on_next` stops the walk.
///
/// # Errors
///
/// Returns the first storage error, including
/// [`StorageError::Interrupted`](folio_storage::StorageError::Interrupted).
///
/// # Example
///
/// With `base = {a: 1, b: 2}` and `other = {b: 2, c: 3}` the changes are
/// `Delete(a)` then `Put(c: 3)`.
pub fn for_each_diff<F>(
    storage: &SynchronousStorage<'_>,
    base: ObjectId,
    other: ObjectId,
    min_key: &[u8],
    mut on_next: F,
) -> StorageResult<WalkOutcome>
where
    F: FnMut(EntryChange) -> bool,
{
    if base == other {
        return Ok(WalkOutcome::Completed);
    }
    let mut walker = DiffWalker::new(storage, base, other, min_key)?;
    while let Some(diff) = walker.next_diff()? {
        if !on_next(diff.into_change()) {
            return Ok(WalkOutcome::Stopped);
        }
    }
    Ok(WalkOutcome::Completed)
}

/// Calls `on_next` for every key at or after `min_key` whose entry differs
/// between `base` and `left` or between `base` and `right`, in key order.
///
/// Returning `false` from `on_next` stops the walk.
///
/// # Errors
///
/// Returns the first storage error, including interruption.
pub fn for_each_three_way_diff<F>(
    storage: &SynchronousStorage<'_>,
    base: ObjectId,
    left: ObjectId,
    right: ObjectId,
    min_key: &[u8],
    mut on_next: F,
) -> StorageResult<WalkOutcome>
where
    F: FnMut(ThreeWayChange) -> bool,
{
    let mut left_walker = DiffWalker::new(storage, base, left, min_key)?;
    let mut right_walker = DiffWalker::new(storage, base, right, min_key)?;
    let mut left_next = left_walker.next_diff()?;
    let mut right_next = right_walker.next_diff()?;

    loop {
        let change = match (left_next.take(), right_next.take()) {
            (None, None) => return Ok(WalkOutcome::Completed),
            (Some(l), None) => {
                left_next = left_walker.next_diff()?;
                left_only(l)
            }
            (None, Some(r)) => {
                right_next = right_walker.next_diff()?;
                right_only(r)
            }
            (Some(l), Some(r)) => match l.key().cmp(r.key()) {
                Ordering::Less => {
                    right_next = Some(r);
                    left_next = left_walker.next_diff()?;
                    left_only(l)
                }
                Ordering::Greater => {
                    left_next = Some(l);
                    right_next = right_walker.next_diff()?;
                    right_only(r)
                }
                Ordering::Equal => {
                    left_next = left_walker.next_diff()?;
                    right_next = right_walker.next_diff()?;
                    ThreeWayChange {
                        base: l.base,
                        left: l.other,
                        right: r.other,
                    }
                }
            },
        };
        if !on_next(change) {
            return Ok(WalkOutcome::Stopped);
        }
    }
}

fn left_only(diff: EntryDiff) -> ThreeWayChange {
    ThreeWayChange {
        right: diff.base.clone(),
        base: diff.base,
        left: diff.other,
    }
}

fn right_only(diff: EntryDiff) -> ThreeWayChange {
    ThreeWayChange {
        left: diff.base.clone(),
        base: diff.base,
        right: diff.other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_changes;
    use crate::entry::Priority;
    use crate::level::DefaultLevelCalculator;
    use crate::testing::{build, put, value, with_storage, FixedLevels};
    use folio_storage::ObjectStore;
    use std::sync::Arc;

    #[test]
    fn diff_reports_delete_then_put() {
        let store = Arc::new(ObjectStore::in_memory());
        let changes = with_storage(&store, |storage| {
            let levels = FixedLevels::default();
            let old = build(storage, &levels, &[("a", "1"), ("b", "2")]).unwrap();
            let new = apply_changes(
                storage,
                &levels,
                old,
                &[EntryChange::delete("a"), put("c", "3")],
            )
            .unwrap()
            .root;

            let mut changes = Vec::new();
            let outcome = for_each_diff(storage, old, new, b"", |change| {
                changes.push(change);
                true
            })
            .unwrap();
            assert_eq!(outcome, WalkOutcome::Completed);
            changes
        });

        assert_eq!(changes, vec![EntryChange::delete("a"), put("c", "3")]);
    }

    #[test]
    fn priority_change_is_a_difference() {
        let store = Arc::new(ObjectStore::in_memory());
        let changes = with_storage(&store, |storage| {
            let levels = FixedLevels::default();
            let old = build(storage, &levels, &[("a", "1")]).unwrap();
            let lazy = EntryChange::put("a", value("1"), Priority::Lazy);
            let new = apply_changes(storage, &levels, old, &[lazy]).unwrap().root;

            let mut changes = Vec::new();
            for_each_diff(storage, old, new, b"", |change| {
                changes.push(change);
                true
            })
            .unwrap();
            changes
        });

        assert_eq!(
            changes,
            vec![EntryChange::put("a", value("1"), Priority::Lazy)]
        );
    }

    #[test]
    fn early_stop_reports_stopped() {
        let store = Arc::new(ObjectStore::in_memory());
        let (outcome, seen) = with_storage(&store, |storage| {
            let levels = DefaultLevelCalculator::new().fanout_bits(1);
            let old = build(storage, &levels, &[]).unwrap();
            let new = build(storage, &levels, &[("a", "1"), ("b", "2"), ("c", "3")]).unwrap();

            let mut seen = 0;
            let outcome = for_each_diff(storage, old, new, b"", |_| {
                seen += 1;
                false
            })
            .unwrap();
            (outcome, seen)
        });

        assert_eq!(outcome, WalkOutcome::Stopped);
        assert_eq!(seen, 1);
    }

    #[test]
    fn min_key_bounds_the_walk() {
        let store = Arc::new(ObjectStore::in_memory());
        let keys = with_storage(&store, |storage| {
            let levels = DefaultLevelCalculator::new().fanout_bits(1);
            let old = build(storage, &levels, &[("a", "1"), ("c", "1"), ("e", "1")]).unwrap();
            let new = build(storage, &levels, &[("a", "2"), ("c", "2"), ("e", "2")]).unwrap();

            let mut keys = Vec::new();
            for_each_diff(storage, old, new, b"b", |change| {
                keys.push(change.key().to_vec());
                true
            })
            .unwrap();
            keys
        });

        assert_eq!(keys, vec![b"c".to_vec(), b"e".to_vec()]);
    }

    #[test]
    fn single_change_in_large_tree() {
        let store = Arc::new(ObjectStore::in_memory());
        let changes = with_storage(&store, |storage| {
            let levels = DefaultLevelCalculator::new().fanout_bits(2);
            let pairs: Vec<(String, String)> =
                (0..400).map(|i| (format!("key{i:04}"), i.to_string())).collect();
            let refs: Vec<(&str, &str)> =
                pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            let old = build(storage, &levels, &refs).unwrap();
            let new = apply_changes(storage, &levels, old, &[put("key0123", "x")])
                .unwrap()
                .root;

            let mut changes = Vec::new();
            for_each_diff(storage, old, new, b"", |change| {
                changes.push(change);
                true
            })
            .unwrap();
            changes
        });

        assert_eq!(changes, vec![put("key0123", "x")]);
    }

    #[test]
    fn three_way_diff_merges_both_sides() {
        let store = Arc::new(ObjectStore::in_memory());
        let changes = with_storage(&store, |storage| {
            let levels = DefaultLevelCalculator::new().fanout_bits(1);
            let base = build(storage, &levels, &[("a", "0"), ("b", "0"), ("c", "0")]).unwrap();
            let left = apply_changes(
                storage,
                &levels,
                base,
                &[put("a", "L"), put("c", "L")],
            )
            .unwrap()
            .root;
            let right = apply_changes(
                storage,
                &levels,
                base,
                &[EntryChange::delete("b"), put("c", "R"), put("d", "R")],
            )
            .unwrap()
            .root;

            let mut changes = Vec::new();
            for_each_three_way_diff(storage, base, left, right, b"", |change| {
                changes.push(change);
                true
            })
            .unwrap();
            changes
        });

        let entry = |key: &str, label: &str| Some(Entry::new(key, value(label), Priority::Eager));
        assert_eq!(
            changes,
            vec![
                ThreeWayChange {
                    base: entry("a", "0"),
                    left: entry("a", "L"),
                    right: entry("a", "0"),
                },
                ThreeWayChange {
                    base: entry("b", "0"),
                    left: entry("b", "0"),
                    right: None,
                },
                ThreeWayChange {
                    base: entry("c", "0"),
                    left: entry("c", "L"),
                    right: entry("c", "R"),
                },
                ThreeWayChange {
                    base: None,
                    left: None,
                    right: entry("d", "R"),
                },
            ]
        );
        assert_eq!(
            changes.iter().filter(|change| change.is_conflict()).count(),
            1
        );
    }
}
