//! # Folio Storage
//!
//! Content-addressed object storage for Folio.
//!
//! Page values and content-tree nodes are immutable objects identified by
//! the SHA-256 of their bytes ([`ObjectId`]). This crate provides:
//!
//! - [`StorageBackend`] - append-only byte log ([`InMemoryBackend`])
//! - [`ObjectStore`] - deduplicating, verifying object store over a backend
//! - [`ObjectSource`] - callback-based object access, implemented by the store
//!   and by [`DispatchedObjectSource`], which completes on a dispatcher
//! - [`sync`] - coroutine adapters suspending until an object arrives
//! - [`Status`] - the closed status enumeration reported by every core
//!   operation
//!
//! ## Example
//!
//! ```rust
//! use folio_coroutine::CoroutineService;
//! use folio_storage::{sync, ObjectStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(ObjectStore::in_memory());
//! let id = store.put(b"hello").unwrap();
//!
//! let service = CoroutineService::new();
//! service
//!     .start_coroutine(move |handler| {
//!         let bytes = sync::get_object(handler, store.as_ref(), id).unwrap();
//!         assert_eq!(bytes, b"hello");
//!     })
//!     .unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod object;
mod source;
mod status;
mod store;
pub mod sync;

pub use backend::StorageBackend;
pub use error::{status_of, StorageError, StorageResult};
pub use memory::InMemoryBackend;
pub use object::{ObjectId, OBJECT_ID_SIZE};
pub use source::{DispatchedObjectSource, GetCallback, ObjectSource, PutCallback};
pub use status::Status;
pub use store::ObjectStore;
