//! Node access bound to a coroutine.

use crate::entry::Entry;
use crate::node::TreeNode;
use folio_codec::{Decode, Encode};
use folio_coroutine::CoroutineHandler;
use folio_storage::{sync, ObjectId, ObjectSource, StorageError, StorageResult};
use tracing::warn;

/// Tree node reads and writes that suspend the calling coroutine instead
/// of taking callbacks.
///
/// Every method is a suspension point and reports interruption as
/// [`StorageError::Interrupted`].
pub struct SynchronousStorage<'a> {
    handler: &'a CoroutineHandler,
    source: &'a dyn ObjectSource,
}

impl<'a> SynchronousStorage<'a> {
    /// Binds `source` to the coroutine owning `handler`.
    #[must_use]
    pub fn new(handler: &'a CoroutineHandler, source: &'a dyn ObjectSource) -> Self {
        Self { handler, source }
    }

    /// Returns the bound coroutine handler.
    #[must_use]
    pub fn handler(&self) -> &'a CoroutineHandler {
        self.handler
    }

    /// Returns the underlying object source.
    #[must_use]
    pub fn source(&self) -> &'a dyn ObjectSource {
        self.source
    }

    /// Reads and decodes one node.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] for unknown ids, a codec error for
    /// malformed nodes, or [`StorageError::Interrupted`].
    pub fn node_from_id(&self, id: ObjectId) -> StorageResult<TreeNode> {
        let bytes = sync::get_object(self.handler, self.source, id)?;
        decode_node(id, &bytes)
    }

    /// Reads and decodes several nodes with one batched request.
    ///
    /// # Errors
    ///
    /// As [`node_from_id`](Self::node_from_id), for the first failing id.
    pub fn nodes_from_ids(&self, ids: &[ObjectId]) -> StorageResult<Vec<TreeNode>> {
        let objects = sync::get_objects(self.handler, self.source, ids)?;
        ids.iter()
            .zip(objects)
            .map(|(id, bytes)| decode_node(*id, &bytes))
            .collect()
    }

    /// Builds, stores and returns the id of a new node.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the parts violate node invariants, the
    /// store's error, or [`StorageError::Interrupted`].
    pub fn node_from_entries(
        &self,
        level: u8,
        entries: Vec<Entry>,
        children: Vec<Option<ObjectId>>,
    ) -> StorageResult<ObjectId> {
        let node = TreeNode::new(level, entries, children)?;
        self.store_node(&node)
    }

    /// Stores an already built node.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or [`StorageError::Interrupted`].
    pub fn store_node(&self, node: &TreeNode) -> StorageResult<ObjectId> {
        sync::put_object(self.handler, self.source, node.encode()?)
    }

    /// Reads a value object.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or [`StorageError::Interrupted`].
    pub fn value(&self, id: ObjectId) -> StorageResult<Vec<u8>> {
        sync::get_object(self.handler, self.source, id)
    }

    /// Stores a value object and returns its id.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or [`StorageError::Interrupted`].
    pub fn put_value(&self, bytes: Vec<u8>) -> StorageResult<ObjectId> {
        sync::put_object(self.handler, self.source, bytes)
    }
}

fn decode_node(id: ObjectId, bytes: &[u8]) -> StorageResult<TreeNode> {
    TreeNode::decode(bytes).map_err(|e| {
        warn!(node = %id, error = %e, "malformed tree node");
        StorageError::from(e)
    })
}
