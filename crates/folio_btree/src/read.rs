//! Point lookups and scans.

use crate::cursor::Cursor;
use crate::entry::{Entry, WalkOutcome};
use crate::storage::SynchronousStorage;
use folio_storage::{ObjectId, StorageError, StorageResult};
use std::collections::BTreeSet;

/// Looks up the entry for `key`.
///
/// Reads one node per level on the path to the key.
///
/// # Errors
///
/// Returns the first storage error, including interruption.
pub fn get_entry(
    storage: &SynchronousStorage<'_>,
    root: ObjectId,
    key: &[u8],
) -> StorageResult<Option<Entry>> {
    let mut node = storage.node_from_id(root)?;
    loop {
        let index = match node
            .entries()
            .binary_search_by(|entry| entry.key.as_slice().cmp(key))
        {
            Ok(index) => return Ok(Some(node.entries()[index].clone())),
            Err(index) => index,
        };
        let Some(child) = node.children().get(index).copied().flatten() else {
            return Ok(None);
        };
        let parent_level = node.level();
        node = storage.node_from_id(child)?;
        if node.level() >= parent_level {
            return Err(StorageError::corrupted(format!(
                "node {child} at level {} under a level {parent_level} parent",
                node.level()
            )));
        }
    }
}

/// Calls `on_entry` for every entry with a key at or after `min_key`, in
/// key order, until it returns `false`.
///
/// # Errors
///
/// Returns the first storage error, including interruption.
pub fn for_each_entry<F>(
    storage: &SynchronousStorage<'_>,
    root: ObjectId,
    min_key: &[u8],
    mut on_entry: F,
) -> StorageResult<WalkOutcome>
where
    F: FnMut(Entry) -> bool,
{
    let mut cursor = Cursor::new(storage, root, min_key)?;
    while let Some(entry) = cursor.next_entry()? {
        if !on_entry(entry) {
            return Ok(WalkOutcome::Stopped);
        }
    }
    Ok(WalkOutcome::Completed)
}

/// Collects every object reachable from `root`: the tree's nodes and the
/// values its entries point to.
///
/// Nodes are fetched one level at a time with a single batched read per
/// level.
///
/// # Errors
///
/// Returns the first storage error, including interruption.
pub fn get_object_ids(
    storage: &SynchronousStorage<'_>,
    root: ObjectId,
) -> StorageResult<BTreeSet<ObjectId>> {
    let mut reachable = BTreeSet::from([root]);
    let mut frontier = vec![root];

    while !frontier.is_empty() {
        let nodes = storage.nodes_from_ids(&frontier)?;
        frontier.clear();
        for node in &nodes {
            reachable.extend(node.entries().iter().map(|entry| entry.value));
            for child in node.children().iter().flatten() {
                if reachable.insert(*child) {
                    frontier.push(*child);
                }
            }
        }
    }
    Ok(reachable)
}
