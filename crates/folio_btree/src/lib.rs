//! # Folio BTree
//!
//! The content tree engine: an immutable, content-addressed B-tree holding
//! the key/value contents of a page at one commit.
//!
//! ## Shape
//!
//! A [`LevelCalculator`] assigns every key a level. A node at level `L`
//! holds the keys of level `L` in its range and points to subtrees for the
//! lower-level keys between them. The shape, and therefore every node id,
//! depends only on the set of entries, never on the order in which they
//! were written. Equal trees have equal root ids.
//!
//! ## Operations
//!
//! - [`apply_changes`] - rebuild the nodes on the paths to a sorted change set
//! - [`for_each_diff`] / [`for_each_three_way_diff`] - walk differences in key
//!   order, skipping shared subtrees
//! - [`get_entry`], [`for_each_entry`], [`get_object_ids`] - reads
//!
//! All operations run inside a coroutine through [`SynchronousStorage`] and
//! report interruption as
//! [`StorageError::Interrupted`](folio_storage::StorageError::Interrupted).
//!
//! ## Example
//!
//! ```rust
//! use folio_btree::{apply_changes, empty_tree, get_entry, DefaultLevelCalculator, EntryChange, Priority, SynchronousStorage};
//! use folio_coroutine::CoroutineService;
//! use folio_storage::{ObjectId, ObjectStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(ObjectStore::in_memory());
//! let service = CoroutineService::new();
//! service
//!     .start_coroutine(move |handler| {
//!         let storage = SynchronousStorage::new(handler, store.as_ref());
//!         let levels = DefaultLevelCalculator::default();
//!         let value = storage.put_value(b"1".to_vec()).unwrap();
//!
//!         let empty = empty_tree(&storage).unwrap();
//!         let changes = [EntryChange::put("a", value, Priority::Eager)];
//!         let outcome = apply_changes(&storage, &levels, empty, &changes).unwrap();
//!
//!         let entry = get_entry(&storage, outcome.root, b"a").unwrap().unwrap();
//!         assert_eq!(entry.value, value);
//!     })
//!     .unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod apply;
mod cursor;
mod diff;
mod entry;
mod level;
mod node;
mod read;
mod storage;

#[cfg(test)]
mod testing;

pub use apply::{apply_changes, empty_tree, ApplyOutcome};
pub use diff::{for_each_diff, for_each_three_way_diff};
pub use entry::{Entry, EntryChange, Priority, ThreeWayChange, WalkOutcome};
pub use level::{DefaultLevelCalculator, LevelCalculator};
pub use node::TreeNode;
pub use read::{for_each_entry, get_entry, get_object_ids};
pub use storage::SynchronousStorage;
