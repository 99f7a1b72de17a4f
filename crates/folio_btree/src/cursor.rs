//! Ordered traversal of a stored tree.

use crate::entry::Entry;
use crate::node::TreeNode;
use crate::storage::SynchronousStorage;
use folio_storage::{ObjectId, StorageError, StorageResult};

/// The item under a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Head {
    /// An entry, in key order.
    Entry(Entry),
    /// A whole subtree not yet expanded.
    Child {
        /// Id of the subtree root.
        id: ObjectId,
        /// Level of the node holding the reference.
        parent_level: u8,
    },
}

/// One node on the cursor's path with the position of the next item in
/// the sequence `child 0, entry 0, child 1, ..., entry n-1, child n`.
struct Frame {
    node: TreeNode,
    pos: usize,
}

impl Frame {
    fn is_exhausted(&self) -> bool {
        self.pos > 2 * self.node.entries().len()
    }
}

/// A stack-based cursor over the items of a tree.
///
/// Subtrees are presented as [`Head::Child`] before being loaded, so a
/// caller comparing two trees can skip shared subtrees without reading
/// them. Every item the cursor yields sorts after the items it already
/// yielded.
pub(crate) struct Cursor<'s, 'a> {
    storage: &'s SynchronousStorage<'a>,
    stack: Vec<Frame>,
}

impl<'s, 'a> Cursor<'s, 'a> {
    /// Opens a cursor on `root`, positioned on the first item that may hold
    /// keys at or after `min_key`.
    pub(crate) fn new(
        storage: &'s SynchronousStorage<'a>,
        root: ObjectId,
        min_key: &[u8],
    ) -> StorageResult<Self> {
        let node = storage.node_from_id(root)?;
        let mut cursor = Self {
            storage,
            stack: Vec::new(),
        };
        if min_key.is_empty() {
            cursor.stack.push(Frame { node, pos: 0 });
        } else {
            cursor.seek(node, min_key)?;
        }
        Ok(cursor)
    }

    /// Descends from `node` toward `min_key`, leaving every frame on the
    /// path positioned just after the subtree that was entered.
    fn seek(&mut self, mut node: TreeNode, min_key: &[u8]) -> StorageResult<()> {
        loop {
            let search = node
                .entries()
                .binary_search_by(|entry| entry.key.as_slice().cmp(min_key));
            match search {
                Ok(index) => {
                    self.stack.push(Frame {
                        node,
                        pos: 2 * index + 1,
                    });
                    return Ok(());
                }
                Err(index) => {
                    let child = node.children().get(index).copied().flatten();
                    let level = node.level();
                    self.stack.push(Frame {
                        node,
                        pos: 2 * index + 1,
                    });
                    match child {
                        Some(id) => node = self.load_child(id, level)?,
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// Returns the current item, or `None` once the tree is exhausted.
    pub(crate) fn head(&mut self) -> Option<Head> {
        loop {
            let frame = self.stack.last_mut()?;
            if frame.is_exhausted() {
                self.stack.pop();
                continue;
            }
            let index = frame.pos / 2;
            if frame.pos % 2 == 1 {
                return Some(Head::Entry(frame.node.entries()[index].clone()));
            }
            let child = frame.node.children()[index];
            match child {
                Some(id) => {
                    return Some(Head::Child {
                        id,
                        parent_level: frame.node.level(),
                    })
                }
                None => frame.pos += 1,
            }
        }
    }

    /// Moves past the current item. A current subtree is skipped whole.
    pub(crate) fn advance(&mut self) {
        if self.head().is_some() {
            if let Some(frame) = self.stack.last_mut() {
                frame.pos += 1;
            }
        }
    }

    /// Replaces the current subtree by its items. No-op on an entry.
    ///
    /// # Errors
    ///
    /// Returns the storage error of loading the subtree root, or
    /// [`StorageError::Corrupted`] if its level is not below its parent's.
    pub(crate) fn expand(&mut self) -> StorageResult<()> {
        let Some(Head::Child { id, parent_level }) = self.head() else {
            return Ok(());
        };
        let node = self.load_child(id, parent_level)?;
        if let Some(frame) = self.stack.last_mut() {
            frame.pos += 1;
        }
        self.stack.push(Frame { node, pos: 0 });
        Ok(())
    }

    /// Returns the next entry, expanding subtrees on the way.
    pub(crate) fn next_entry(&mut self) -> StorageResult<Option<Entry>> {
        loop {
            match self.head() {
                None => return Ok(None),
                Some(Head::Entry(entry)) => {
                    self.advance();
                    return Ok(Some(entry));
                }
                Some(Head::Child { .. }) => self.expand()?,
            }
        }
    }

    fn load_child(&self, id: ObjectId, parent_level: u8) -> StorageResult<TreeNode> {
        let node = self.storage.node_from_id(id)?;
        if node.is_empty() || node.level() >= parent_level {
            return Err(StorageError::corrupted(format!(
                "node {id} at level {} under a level {parent_level} parent",
                node.level()
            )));
        }
        Ok(node)
    }
}
