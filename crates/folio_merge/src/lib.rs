//! # Folio Merge
//!
//! Automatic reconciliation of divergent page histories.
//!
//! When devices edit a page concurrently, its commit graph grows several
//! heads. This crate brings it back to one:
//!
//! - [`find_common_ancestor`] - lowest common ancestor of two commits,
//!   fetched one generation level at a time
//! - [`MergeStrategy`] - computes a merge journal; [`LastOneWinsMergeStrategy`]
//!   and [`ConflictResolverMergeStrategy`] are provided
//! - [`MergeResolver`] - watches a page, merges heads as they appear and
//!   backs off when devices race to merge the same branches
//!
//! ## Example
//!
//! ```rust
//! use folio_coroutine::{CoroutineService, ManualDispatcher};
//! use folio_core::InMemoryPageStore;
//! use folio_merge::{LastOneWinsMergeStrategy, MergeResolver, ResolverConfig, ResolverState};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryPageStore::new().unwrap());
//! let dispatcher = Arc::new(ManualDispatcher::new());
//! let resolver = MergeResolver::new(
//!     store,
//!     Arc::new(CoroutineService::new()),
//!     dispatcher.clone(),
//!     ResolverConfig::default(),
//! );
//! resolver.set_strategy(Some(Arc::new(LastOneWinsMergeStrategy::new())));
//! dispatcher.run_until_idle();
//! assert_eq!(resolver.state(), ResolverState::Idle);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ancestor;
mod backoff;
mod error;
mod resolver;
mod strategy;

pub use ancestor::find_common_ancestor;
pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use error::{MergeError, MergeResult};
pub use resolver::{
    ConflictResolutionWaitStatus, DelayedStatus, MergeResolver, ResolverConfig, ResolverState,
    ResolverStats, WaitCallback,
};
pub use strategy::{
    ConflictRequest, ConflictResolver, ConflictResolverMergeStrategy, LastOneWinsMergeStrategy,
    MergePolicy, MergeStrategy, MergedValue, ResolveCallback, ValueSource,
};
