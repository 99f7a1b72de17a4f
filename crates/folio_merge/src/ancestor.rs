//! Lowest common ancestor search over the commit graph.

use folio_core::{Commit, CommitId, CoreError, CoreResult, SynchronousCommitGraph};
use std::collections::BTreeMap;
use tracing::trace;

const FROM_LEFT: u8 = 0b01;
const FROM_RIGHT: u8 = 0b10;
const FROM_BOTH: u8 = FROM_LEFT | FROM_RIGHT;

/// Finds the lowest common ancestor of `left` and `right`.
///
/// Walks down from both commits one generation level at a time, keeping
/// the active commits ordered by `(generation, id)`. Every commit at the
/// highest active generation is removed; the first one reached from both
/// inputs is the result. Otherwise the parents of the whole level are
/// fetched with one batched request and the walk continues. The number of
/// round trips is bounded by the depth of the graph, not its breadth.
///
/// A commit is only removed once all its children have been, so the result
/// has the highest generation among the common ancestors. Ties go to the
/// highest id. When one input is an ancestor of the other, it is the
/// result; `left == right` returns that commit.
///
/// # Errors
///
/// Returns the store's error, [`CoreError::InvalidCommit`] if the commits
/// share no ancestor, or an interruption. Nothing is returned on partial
/// progress.
pub fn find_common_ancestor(
    graph: &SynchronousCommitGraph<'_>,
    left: &Commit,
    right: &Commit,
) -> CoreResult<Commit> {
    let mut active: BTreeMap<(u64, CommitId), (Commit, u8)> = BTreeMap::new();
    reach(&mut active, left.clone(), FROM_LEFT);
    reach(&mut active, right.clone(), FROM_RIGHT);

    let mut rounds = 0usize;
    while let Some(&(generation, _)) = active.keys().next_back() {
        let mut parents: BTreeMap<CommitId, u8> = BTreeMap::new();
        while let Some(entry) = active.last_entry() {
            if entry.key().0 != generation {
                break;
            }
            let (commit, sides) = entry.remove();
            if sides == FROM_BOTH {
                trace!(
                    left = %left.id().short(),
                    right = %right.id().short(),
                    ancestor = %commit.id().short(),
                    rounds,
                    "common ancestor found"
                );
                return Ok(commit);
            }
            for parent in commit.parent_ids() {
                *parents.entry(*parent).or_default() |= sides;
            }
        }

        let ids: Vec<CommitId> = parents.keys().copied().collect();
        for parent in graph.get_commits(&ids)? {
            let sides = parents.get(&parent.id()).copied().unwrap_or_default();
            reach(&mut active, parent, sides);
        }
        rounds += 1;
    }

    Err(CoreError::invalid_commit(format!(
        "commits {} and {} share no ancestor",
        left.id(),
        right.id()
    )))
}

/// Records that `commit` is reachable from `sides`.
fn reach(active: &mut BTreeMap<(u64, CommitId), (Commit, u8)>, commit: Commit, sides: u8) {
    active
        .entry((commit.generation(), commit.id()))
        .or_insert_with(|| (commit, 0))
        .1 |= sides;
}
