//! # Folio Core
//!
//! The commit graph of a Folio page.
//!
//! Each page has a DAG of immutable [`Commit`]s, each pointing to the root
//! of a content tree. Commits with no known child are the page's heads;
//! more than one head means the page has diverged and needs a merge.
//!
//! This crate provides:
//! - [`Commit`] and [`CommitId`] - content-addressed commits
//! - [`CommitGraphStore`] - the callback-based store contract, with
//!   [`InMemoryPageStore`] as implementation
//! - [`SynchronousCommitGraph`] - coroutine adapter over a store
//! - [`Journal`] - pending changes committed as one commit
//! - [`CommitWatcher`] - notification of new commits tagged with their
//!   [`ChangeSource`]
//!
//! ## Example
//!
//! ```rust
//! use folio_btree::Priority;
//! use folio_core::{InMemoryPageStore, SynchronousCommitGraph};
//! use folio_coroutine::CoroutineService;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryPageStore::new().unwrap());
//! let service = CoroutineService::new();
//! let page = Arc::clone(&store);
//! service
//!     .start_coroutine(move |handler| {
//!         let graph = SynchronousCommitGraph::new(handler, page.as_ref());
//!         let head = graph.get_head_commits().unwrap().remove(0);
//!         let mut journal = graph.start_commit(head);
//!         journal.put("title", "Hello", Priority::Eager);
//!         graph.commit_journal(journal).unwrap();
//!     })
//!     .unwrap();
//! assert_eq!(store.commit_count(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod commit;
mod error;
mod journal;
mod memory;
mod store;
mod sync;
mod watch;

pub use clock::{Clock, LogicalClock, SystemClock};
pub use commit::{Commit, CommitId};
pub use error::{CoreError, CoreResult};
pub use journal::{Journal, JournalValue};
pub use memory::{InMemoryPageStore, PageStoreBuilder};
pub use store::{AddCallback, CommitCallback, CommitGraphStore, HeadsCallback};
pub use sync::SynchronousCommitGraph;
pub use watch::{ChangeSource, CommitWatcher, WatcherSet};
