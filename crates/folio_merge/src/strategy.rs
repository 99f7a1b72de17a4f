//! Merge strategies: how two divergent heads become one merge journal.

use crate::error::{MergeError, MergeResult};
use folio_btree::{for_each_three_way_diff, get_entry, Entry, Priority, ThreeWayChange};
use folio_core::{Commit, Journal, SynchronousCommitGraph};
use folio_coroutine::sync_call;
use std::sync::Arc;
use tracing::debug;

/// Produces the content of a merge commit.
///
/// Implementations run inside the resolver's coroutine and may suspend on
/// `graph`. The returned journal must come from
/// [`SynchronousCommitGraph::start_merge_commit`] with `left` and `right`;
/// the resolver commits it.
pub trait MergeStrategy: Send + Sync {
    /// Builds the merge journal of `left` and `right`, whose lowest common
    /// ancestor is `ancestor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge cannot be computed. Interruptions must
    /// be propagated unchanged.
    fn merge(
        &self,
        graph: &SynchronousCommitGraph<'_>,
        left: &Commit,
        right: &Commit,
        ancestor: &Commit,
    ) -> MergeResult<Journal>;
}

/// Writes `entry` (or its absence) for `key` into the journal.
fn set_entry(journal: &mut Journal, key: Vec<u8>, entry: Option<Entry>) {
    match entry {
        Some(entry) => journal.put_reference(key, entry.value, entry.priority),
        None => journal.delete(key),
    }
}

/// Collects the three-way diff of the two heads against their ancestor.
fn three_way_changes(
    graph: &SynchronousCommitGraph<'_>,
    left: &Commit,
    right: &Commit,
    ancestor: &Commit,
) -> MergeResult<Vec<ThreeWayChange>> {
    let storage = graph.storage();
    let mut changes = Vec::new();
    for_each_three_way_diff(
        &storage,
        ancestor.root_id(),
        left.root_id(),
        right.root_id(),
        b"",
        |change| {
            changes.push(change);
            true
        },
    )?;
    Ok(changes)
}

/// Merges key by key: a key changed on one side only takes that side's
/// value; a key changed on both sides takes the value of the newer head.
///
/// Heads are ordered by timestamp, then id, so every device picks the same
/// winner.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastOneWinsMergeStrategy;

impl LastOneWinsMergeStrategy {
    /// Creates the strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MergeStrategy for LastOneWinsMergeStrategy {
    fn merge(
        &self,
        graph: &SynchronousCommitGraph<'_>,
        left: &Commit,
        right: &Commit,
        ancestor: &Commit,
    ) -> MergeResult<Journal> {
        let right_wins = right.head_order() > left.head_order();
        let mut journal = graph.start_merge_commit(left.clone(), right.clone());
        let mut taken = 0usize;

        for change in three_way_changes(graph, left, right, ancestor)? {
            let right_changed = change.right != change.base;
            let left_changed = change.left != change.base;
            if right_changed && (!left_changed || right_wins) {
                let key = change.key().to_vec();
                set_entry(&mut journal, key, change.right);
                taken += 1;
            }
        }

        debug!(taken, right_wins, "last-one-wins merge computed");
        Ok(journal)
    }
}

/// Which keys a [`ConflictResolverMergeStrategy`] hands to its resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Every key that differs between the heads goes to the resolver.
    Custom,
    /// Keys changed on one side only are merged automatically; only keys
    /// changed differently on both sides go to the resolver.
    #[default]
    AutomaticWithFallback,
}

/// Where the merged value of a key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// The left head's value (or its absence).
    Left,
    /// The right head's value (or its absence).
    Right,
    /// Remove the key.
    Delete,
    /// New bytes.
    New(Vec<u8>),
}

/// A resolver's answer for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedValue {
    /// The key.
    pub key: Vec<u8>,
    /// Its merged value.
    pub source: ValueSource,
}

impl MergedValue {
    /// Keeps the left head's value.
    #[must_use]
    pub fn left(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            source: ValueSource::Left,
        }
    }

    /// Takes the right head's value.
    #[must_use]
    pub fn right(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            source: ValueSource::Right,
        }
    }

    /// Removes the key.
    #[must_use]
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            source: ValueSource::Delete,
        }
    }

    /// Writes new bytes.
    #[must_use]
    pub fn new_value(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            source: ValueSource::New(value.into()),
        }
    }
}

/// The keys a [`ConflictResolver`] is asked to decide.
#[derive(Debug, Clone)]
pub struct ConflictRequest {
    /// The older head.
    pub left: Commit,
    /// The newer head.
    pub right: Commit,
    /// Their lowest common ancestor.
    pub ancestor: Commit,
    /// The differing keys, in key order.
    pub changes: Vec<ThreeWayChange>,
}

/// Completion of [`ConflictResolver::resolve`].
pub type ResolveCallback = Box<dyn FnOnce(Vec<MergedValue>) + Send + 'static>;

/// Client-side conflict resolution.
///
/// The callback may be invoked from any thread. Dropping it unanswered
/// abandons the merge.
pub trait ConflictResolver: Send + Sync {
    /// Decides the merged values of `request.changes`. Keys left
    /// unanswered keep the left head's value; later answers for the same
    /// key replace earlier ones.
    fn resolve(&self, request: ConflictRequest, callback: ResolveCallback);
}

/// Merges through a client [`ConflictResolver`].
pub struct ConflictResolverMergeStrategy {
    resolver: Arc<dyn ConflictResolver>,
    policy: MergePolicy,
}

impl ConflictResolverMergeStrategy {
    /// Creates a strategy asking `resolver` under `policy`.
    #[must_use]
    pub fn new(resolver: Arc<dyn ConflictResolver>, policy: MergePolicy) -> Self {
        Self { resolver, policy }
    }

    /// Returns the merge policy.
    #[must_use]
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }
}

impl MergeStrategy for ConflictResolverMergeStrategy {
    fn merge(
        &self,
        graph: &SynchronousCommitGraph<'_>,
        left: &Commit,
        right: &Commit,
        ancestor: &Commit,
    ) -> MergeResult<Journal> {
        let mut journal = graph.start_merge_commit(left.clone(), right.clone());
        let changes = three_way_changes(graph, left, right, ancestor)?;

        let to_resolver = match self.policy {
            MergePolicy::Custom => changes,
            MergePolicy::AutomaticWithFallback => {
                let (conflicts, clean): (Vec<_>, Vec<_>) =
                    changes.into_iter().partition(ThreeWayChange::is_conflict);
                for change in clean {
                    if change.right != change.base {
                        let key = change.key().to_vec();
                        set_entry(&mut journal, key, change.right);
                    }
                }
                conflicts
            }
        };
        if to_resolver.is_empty() {
            return Ok(journal);
        }

        debug!(keys = to_resolver.len(), policy = ?self.policy, "asking conflict resolver");
        let request = ConflictRequest {
            left: left.clone(),
            right: right.clone(),
            ancestor: ancestor.clone(),
            changes: to_resolver,
        };
        let resolver = Arc::clone(&self.resolver);
        let answers = sync_call(graph.handler(), move |done| {
            resolver.resolve(request, Box::new(move |values| done.complete(values)));
        })?;

        let storage = graph.storage();
        for answer in answers {
            if answer.key.is_empty() {
                return Err(MergeError::strategy("resolver answered an empty key"));
            }
            match answer.source {
                ValueSource::Left => {
                    let entry = get_entry(&storage, left.root_id(), &answer.key)?;
                    set_entry(&mut journal, answer.key, entry);
                }
                ValueSource::Right => {
                    let entry = get_entry(&storage, right.root_id(), &answer.key)?;
                    set_entry(&mut journal, answer.key, entry);
                }
                ValueSource::Delete => journal.delete(answer.key),
                ValueSource::New(bytes) => journal.put(answer.key, bytes, Priority::Eager),
            }
        }
        Ok(journal)
    }
}
