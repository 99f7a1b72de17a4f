//! Coroutine service and its pool of execution contexts.

use crate::config::CoroutineServiceConfig;
use crate::error::{CoroutineError, CoroutineResult};
use crate::handler::CoroutineHandler;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace};

/// A coroutine body.
pub(crate) type Body = Box<dyn FnOnce(&CoroutineHandler) + Send + 'static>;

/// A thread able to run coroutine bodies, one at a time.
struct ExecutionContext {
    jobs: Sender<Job>,
    thread: JoinHandle<()>,
}

/// A body scheduled on a context. The context travels with the job so the
/// thread can return itself to the idle pool afterwards.
struct Job {
    handler: CoroutineHandler,
    body: Body,
    context: ExecutionContext,
}

pub(crate) struct ServiceInner {
    config: CoroutineServiceConfig,
    next_id: AtomicU64,
    spawned: AtomicU64,
    shutting_down: AtomicBool,
    live: Mutex<HashMap<u64, CoroutineHandler>>,
    live_cond: Condvar,
    idle: Mutex<Vec<ExecutionContext>>,
}

/// Owns a pool of execution contexts and the coroutines running on them.
///
/// Dropping the service interrupts every live coroutine and blocks until all
/// of them have returned.
///
/// # Example
///
/// ```rust
/// use folio_coroutine::{ContinuationStatus, CoroutineService};
/// use std::sync::mpsc;
///
/// let service = CoroutineService::new();
/// let (tx, rx) = mpsc::channel();
/// service
///     .start_coroutine(move |handler| {
///         tx.send(handler.suspend()).unwrap();
///     })
///     .unwrap();
///
/// drop(service);
/// assert_eq!(rx.recv().unwrap(), ContinuationStatus::Interrupted);
/// ```
pub struct CoroutineService {
    inner: Arc<ServiceInner>,
}

impl CoroutineService {
    /// Creates a service with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CoroutineServiceConfig::default())
    }

    /// Creates a service with the given configuration.
    #[must_use]
    pub fn with_config(config: CoroutineServiceConfig) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                config,
                next_id: AtomicU64::new(1),
                spawned: AtomicU64::new(0),
                shutting_down: AtomicBool::new(false),
                live: Mutex::new(HashMap::new()),
                live_cond: Condvar::new(),
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Starts `body` as a new coroutine.
    ///
    /// The caller blocks until the body first suspends or returns, so from
    /// the caller's point of view the body runs inline up to its first
    /// suspension point.
    ///
    /// # Errors
    ///
    /// Returns [`CoroutineError::ShutDown`] if the service is shutting down,
    /// or [`CoroutineError::Spawn`] if no execution context could be created.
    /// In both cases `body` is dropped without running.
    pub fn start_coroutine<F>(&self, body: F) -> CoroutineResult<()>
    where
        F: FnOnce(&CoroutineHandler) + Send + 'static,
    {
        self.inner.start(Box::new(body))
    }

    /// Returns the number of coroutines that have not returned yet.
    #[must_use]
    pub fn live_coroutines(&self) -> usize {
        self.inner.live.lock().len()
    }

    /// Returns the number of execution contexts waiting for work.
    #[must_use]
    pub fn idle_contexts(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Returns the number of execution context threads spawned so far.
    #[must_use]
    pub fn spawned_contexts(&self) -> u64 {
        self.inner.spawned.load(Ordering::SeqCst)
    }

    pub(crate) fn inner(&self) -> Arc<ServiceInner> {
        Arc::clone(&self.inner)
    }
}

impl Default for CoroutineService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CoroutineService {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl ServiceInner {
    pub(crate) fn start(self: &Arc<Self>, body: Body) -> CoroutineResult<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            debug!("coroutine rejected: service is shutting down");
            return Err(CoroutineError::ShutDown);
        }

        let handler = CoroutineHandler::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let context = match self.idle.lock().pop() {
            Some(context) => context,
            None => self.spawn_context()?,
        };

        {
            let mut live = self.live.lock();
            live.insert(handler.id(), handler.clone());
            // Shutdown flips the flag under this lock before sweeping, so a
            // coroutine registered after the sweep is interrupted here.
            if self.shutting_down.load(Ordering::SeqCst) {
                handler.interrupt();
            }
        }

        let jobs = context.jobs.clone();
        let job = Job {
            handler: handler.clone(),
            body,
            context,
        };
        if jobs.send(job).is_err() {
            error!(coroutine = handler.id(), "execution context exited unexpectedly");
            self.retire(&handler);
            return Err(CoroutineError::ShutDown);
        }

        trace!(coroutine = handler.id(), "started");
        handler.wait_until_parked();
        Ok(())
    }

    fn spawn_context(self: &Arc<Self>) -> CoroutineResult<ExecutionContext> {
        let (jobs, receiver) = mpsc::channel();
        let index = self.spawned.fetch_add(1, Ordering::SeqCst);

        let mut builder =
            thread::Builder::new().name(format!("{}-{}", self.config.thread_name, index));
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let inner = Arc::clone(self);
        let thread = builder.spawn(move || inner.run_context(receiver))?;
        debug!(context = index, "spawned execution context");

        Ok(ExecutionContext { jobs, thread })
    }

    fn run_context(&self, jobs: Receiver<Job>) {
        while let Ok(job) = jobs.recv() {
            let Job {
                handler,
                body,
                context,
            } = job;

            handler.begin();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&handler)));
            let payload = match outcome {
                Ok(()) => None,
                Err(payload) => {
                    error!(coroutine = handler.id(), "coroutine body panicked");
                    Some(payload)
                }
            };
            // The context goes back to the pool before the starter or resumer
            // is released, so the next start can reuse it.
            let keep = self.recycle(context);
            self.retire(&handler);
            handler.finish(payload);

            if !keep {
                break;
            }
        }
    }

    /// Returns a context to the idle pool. Returns false if the context was
    /// dropped instead and its thread should exit.
    fn recycle(&self, context: ExecutionContext) -> bool {
        if self.shutting_down.load(Ordering::SeqCst) {
            return false;
        }
        let mut idle = self.idle.lock();
        if idle.len() >= self.config.max_idle_contexts {
            return false;
        }
        idle.push(context);
        true
    }

    fn retire(&self, handler: &CoroutineHandler) {
        let mut live = self.live.lock();
        live.remove(&handler.id());
        self.live_cond.notify_all();
        trace!(coroutine = handler.id(), "finished");
    }

    fn shutdown(&self) {
        {
            let mut live = self.live.lock();
            self.shutting_down.store(true, Ordering::SeqCst);
            if !live.is_empty() {
                debug!(live = live.len(), "interrupting coroutines");
            }
            for handler in live.values() {
                handler.interrupt();
            }
            while !live.is_empty() {
                self.live_cond.wait(&mut live);
            }
        }

        let idle: Vec<ExecutionContext> = self.idle.lock().drain(..).collect();
        for ExecutionContext { jobs, thread } in idle {
            drop(jobs);
            if thread.join().is_err() {
                error!("execution context thread panicked");
            }
        }
    }
}
