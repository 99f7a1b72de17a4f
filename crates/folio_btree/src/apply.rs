//! Building new trees from old ones.
//!
//! A change set is applied to an in-memory overlay of the old tree. Nodes
//! are loaded only along the paths to changed keys; every other subtree is
//! carried over by id. Once all changes are in, the overlay is written
//! bottom-up and nodes identical to the ones they were loaded from are not
//! written again.

use crate::entry::{Entry, EntryChange};
use crate::level::LevelCalculator;
use crate::node::TreeNode;
use crate::storage::SynchronousStorage;
use folio_storage::{ObjectId, StorageError, StorageResult};
use std::cmp::Ordering;
use tracing::debug;

/// Result of [`apply_changes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Root of the new tree.
    pub root: ObjectId,
    /// Nodes written by this application, children before parents.
    pub new_node_ids: Vec<ObjectId>,
}

/// Stores the root of the empty tree and returns its id.
///
/// # Errors
///
/// Returns the store's error, or [`StorageError::Interrupted`].
pub fn empty_tree(storage: &SynchronousStorage<'_>) -> StorageResult<ObjectId> {
    storage.store_node(&TreeNode::empty())
}

/// Applies a change set to the tree at `root`.
///
/// `changes` must be sorted by key without duplicates. Deleting an absent
/// key and putting an identical entry are no-ops. The same contents always
/// yield the same root id, whatever the order of past applications.
///
/// # Errors
///
/// Returns [`StorageError::InvalidArgument`] before touching storage if the
/// changes are unsorted or repeat a key, and otherwise the first storage
/// error, including [`StorageError::Interrupted`].
pub fn apply_changes(
    storage: &SynchronousStorage<'_>,
    levels: &dyn LevelCalculator,
    root: ObjectId,
    changes: &[EntryChange],
) -> StorageResult<ApplyOutcome> {
    if let Some(pair) = changes.windows(2).find(|pair| pair[0].key() >= pair[1].key()) {
        return Err(StorageError::invalid_argument(format!(
            "change set not strictly sorted at key {:?}",
            String::from_utf8_lossy(pair[1].key())
        )));
    }

    let builder = TreeBuilder { storage };
    let root_node = storage.node_from_id(root)?;
    let mut tree = if root_node.is_empty() {
        None
    } else {
        Some(Subtree::from(BuiltNode::loaded(root, root_node)))
    };

    for change in changes {
        let level = levels.level(change.key());
        tree = match change {
            EntryChange::Put(entry) => Some(builder.insert(tree, entry.clone(), level)?),
            EntryChange::Delete { key } => builder.delete(tree, key, level)?,
        };
    }

    let mut new_node_ids = Vec::new();
    let new_root = match tree {
        Some(tree) => builder.persist(tree, &mut new_node_ids)?,
        None => {
            let id = empty_tree(storage)?;
            if id != root {
                new_node_ids.push(id);
            }
            id
        }
    };

    debug!(
        changes = changes.len(),
        new_nodes = new_node_ids.len(),
        root = %new_root.short(),
        "applied change set"
    );
    Ok(ApplyOutcome {
        root: new_root,
        new_node_ids,
    })
}

/// A subtree of the tree being built: untouched in storage, or rebuilt in
/// memory.
enum Subtree {
    Stored {
        id: ObjectId,
        /// Level of the parent it was loaded under; the node must be below.
        below: u8,
    },
    Built(Box<BuiltNode>),
}

impl From<BuiltNode> for Subtree {
    fn from(node: BuiltNode) -> Self {
        Self::Built(Box::new(node))
    }
}

struct BuiltNode {
    level: u8,
    entries: Vec<Entry>,
    children: Vec<Option<Subtree>>,
    /// The stored node this one was loaded from.
    origin: Option<(ObjectId, TreeNode)>,
}

impl BuiltNode {
    fn loaded(id: ObjectId, node: TreeNode) -> Self {
        let level = node.level();
        Self {
            level,
            entries: node.entries().to_vec(),
            children: node
                .children()
                .iter()
                .map(|child| child.map(|id| Subtree::Stored { id, below: level }))
                .collect(),
            origin: Some((id, node)),
        }
    }

    fn single(level: u8, entry: Entry, left: Option<Subtree>, right: Option<Subtree>) -> Self {
        Self {
            level,
            entries: vec![entry],
            children: vec![left, right],
            origin: None,
        }
    }

    fn search(&self, key: &[u8]) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|entry| entry.key.as_slice().cmp(key))
    }

    /// Index of the child whose range holds `key`, which must map below
    /// this node's level.
    fn child_index(&self, key: &[u8]) -> StorageResult<usize> {
        match self.search(key) {
            Ok(_) => Err(StorageError::corrupted(format!(
                "key {:?} found at level {} above its computed level",
                String::from_utf8_lossy(key),
                self.level
            ))),
            Err(index) => Ok(index),
        }
    }

    /// A node left without entries is replaced by its only child.
    fn collapse(mut self) -> Option<Subtree> {
        if self.entries.is_empty() {
            self.children.pop().flatten()
        } else {
            Some(self.into())
        }
    }
}

struct TreeBuilder<'s, 'a> {
    storage: &'s SynchronousStorage<'a>,
}

impl TreeBuilder<'_, '_> {
    fn node(&self, subtree: Subtree) -> StorageResult<BuiltNode> {
        match subtree {
            Subtree::Built(node) => Ok(*node),
            Subtree::Stored { id, below } => {
                let node = self.storage.node_from_id(id)?;
                if node.is_empty() || node.level() >= below {
                    return Err(StorageError::corrupted(format!(
                        "node {id} at level {} under a level {below} parent",
                        node.level()
                    )));
                }
                Ok(BuiltNode::loaded(id, node))
            }
        }
    }

    fn insert(&self, tree: Option<Subtree>, entry: Entry, level: u8) -> StorageResult<Subtree> {
        let Some(tree) = tree else {
            return Ok(BuiltNode::single(level, entry, None, None).into());
        };
        let mut node = self.node(tree)?;

        match node.level.cmp(&level) {
            Ordering::Greater => {
                let index = node.child_index(&entry.key)?;
                let child = node.children[index].take();
                node.children[index] = Some(self.insert(child, entry, level)?);
            }
            Ordering::Equal => match node.search(&entry.key) {
                Ok(index) => node.entries[index] = entry,
                Err(index) => {
                    let (left, right) = self.split(node.children[index].take(), &entry.key)?;
                    node.entries.insert(index, entry);
                    node.children[index] = left;
                    node.children.insert(index + 1, right);
                }
            },
            Ordering::Less => {
                let (left, right) = self.split(Some(node.into()), &entry.key)?;
                return Ok(BuiltNode::single(level, entry, left, right).into());
            }
        }
        Ok(node.into())
    }

    fn delete(
        &self,
        tree: Option<Subtree>,
        key: &[u8],
        level: u8,
    ) -> StorageResult<Option<Subtree>> {
        let Some(tree) = tree else {
            return Ok(None);
        };
        let mut node = self.node(tree)?;

        match node.level.cmp(&level) {
            Ordering::Greater => {
                let index = node.child_index(key)?;
                let child = node.children[index].take();
                node.children[index] = self.delete(child, key, level)?;
                Ok(Some(node.into()))
            }
            Ordering::Equal => {
                if let Ok(index) = node.search(key) {
                    node.entries.remove(index);
                    let left = node.children.remove(index);
                    let right = node.children.remove(index);
                    node.children.insert(index, self.join(left, right)?);
                }
                Ok(node.collapse())
            }
            // A key can only live at its own level.
            Ordering::Less => Ok(Some(node.into())),
        }
    }

    /// Splits `tree` into the keys below and above `key`, which must not be
    /// in it.
    fn split(
        &self,
        tree: Option<Subtree>,
        key: &[u8],
    ) -> StorageResult<(Option<Subtree>, Option<Subtree>)> {
        let Some(tree) = tree else {
            return Ok((None, None));
        };
        let mut left = self.node(tree)?;
        let index = left.child_index(key)?;
        let (inner_left, inner_right) = self.split(left.children[index].take(), key)?;

        let right_entries = left.entries.split_off(index);
        let mut right_children = left.children.split_off(index + 1);
        left.children[index] = inner_left;
        right_children.insert(0, inner_right);

        let right = BuiltNode {
            level: left.level,
            entries: right_entries,
            children: right_children,
            origin: None,
        };
        Ok((left.collapse(), right.collapse()))
    }

    /// Concatenates two trees, all keys of `left` sorting before `right`.
    fn join(
        &self,
        left: Option<Subtree>,
        right: Option<Subtree>,
    ) -> StorageResult<Option<Subtree>> {
        let (mut left, mut right) = match (left, right) {
            (None, right) => return Ok(right),
            (left, None) => return Ok(left),
            (Some(left), Some(right)) => (self.node(left)?, self.node(right)?),
        };

        match left.level.cmp(&right.level) {
            Ordering::Greater => {
                let last = left.children.pop().flatten();
                left.children.push(self.join(last, Some(right.into()))?);
                Ok(Some(left.into()))
            }
            Ordering::Less => {
                let first = right.children[0].take();
                right.children[0] = self.join(Some(left.into()), first)?;
                Ok(Some(right.into()))
            }
            Ordering::Equal => {
                let last = left.children.pop().flatten();
                let mut rest = right.children.into_iter();
                let first = rest.next().flatten();
                left.children.push(self.join(last, first)?);
                left.children.extend(rest);
                left.entries.extend(right.entries);
                Ok(Some(left.into()))
            }
        }
    }

    fn persist(&self, subtree: Subtree, created: &mut Vec<ObjectId>) -> StorageResult<ObjectId> {
        let node = match subtree {
            Subtree::Stored { id, .. } => return Ok(id),
            Subtree::Built(node) => *node,
        };
        let BuiltNode {
            level,
            entries,
            children,
            origin,
        } = node;

        let children = children
            .into_iter()
            .map(|child| child.map(|child| self.persist(child, created)).transpose())
            .collect::<StorageResult<Vec<_>>>()?;
        let rebuilt = TreeNode::new(level, entries, children)?;

        if let Some((id, original)) = origin {
            if original == rebuilt {
                return Ok(id);
            }
        }
        let id = self.storage.store_node(&rebuilt)?;
        created.push(id);
        Ok(id)
    }
}
