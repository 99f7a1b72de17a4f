//! # Folio Testkit
//!
//! Test utilities for Folio.
//!
//! This crate provides:
//! - [`TestPage`], a page with an in-memory store, a manual dispatcher and a
//!   merge resolver, driven deterministically from the test thread
//! - Property-based generators for change sets and commit histories
//! - [`sync_commits`], which plays the part of the sync layer between pages
//! - [`init_test_logging`] for `RUST_LOG`-controlled test output
//!
//! ## Usage
//!
//! ```rust
//! use folio_testkit::prelude::*;
//!
//! let page = TestPage::new();
//! page.use_last_one_wins();
//! let base = page.initial();
//! page.commit(&base, &[("a", "1")], &[]);
//! page.commit(&base, &[("b", "2")], &[]);
//! page.settle();
//!
//! assert_eq!(page.heads().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod sync;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::sync::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use sync::*;
