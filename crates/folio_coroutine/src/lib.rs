//! # Folio Coroutine
//!
//! Coroutine runtime for Folio.
//!
//! This crate lets code written as straight-line logic wait on
//! callback-based asynchronous operations (object reads, commit writes,
//! timers) without manual callback chaining, while keeping shutdown
//! cancellable.
//!
//! ## Building Blocks
//!
//! - [`CoroutineService`] - owns a pool of execution contexts and starts coroutines
//! - [`CoroutineHandler`] - suspend/resume handle of one running coroutine
//! - [`sync_call`] - adapts a callback-based operation into a suspension point
//! - [`CoroutineManager`] - scopes coroutines to an owner, with an optional concurrency cap
//! - [`Waiter`] - joins a fan-out of callbacks into one result vector
//! - [`Dispatcher`] - posts (delayed) tasks; [`ThreadDispatcher`] and [`ManualDispatcher`]
//!
//! ## Execution Model
//!
//! A coroutine body runs on a pooled execution context thread, but the
//! thread that started or resumed it blocks until the body suspends again or
//! returns. Exactly one party therefore drives the logical computation at any
//! time, and resumption may happen from any thread.
//!
//! ## Interruption
//!
//! Dropping the service (or a manager) resumes every suspended coroutine with
//! [`ContinuationStatus::Interrupted`] and blocks until all of them have
//! returned. `Interrupted` is a shutdown signal, not a failure: code built on
//! [`sync_call`] must propagate it to the top of its call chain.
//!
//! ## Example
//!
//! ```rust
//! use folio_coroutine::{sync_call, CoroutineService};
//!
//! let service = CoroutineService::new();
//! service
//!     .start_coroutine(|handler| {
//!         let value = sync_call(handler, |done| done.complete(42)).unwrap();
//!         assert_eq!(value, 42);
//!     })
//!     .unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dispatcher;
mod error;
mod handler;
mod manager;
mod service;
mod sync_call;
mod waiter;

pub use config::CoroutineServiceConfig;
pub use dispatcher::{Dispatcher, ManualDispatcher, Task, ThreadDispatcher};
pub use error::{ContinuationStatus, CoroutineError, CoroutineResult};
pub use handler::CoroutineHandler;
pub use manager::CoroutineManager;
pub use service::CoroutineService;
pub use sync_call::{sync_call, Completion};
pub use waiter::Waiter;
