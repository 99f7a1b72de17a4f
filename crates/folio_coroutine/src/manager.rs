//! Scoped ownership of a group of coroutines.

use crate::error::{CoroutineError, CoroutineResult};
use crate::handler::CoroutineHandler;
use crate::service::{Body, CoroutineService, ServiceInner};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

struct ManagerState {
    handlers: HashMap<u64, CoroutineHandler>,
    queue: VecDeque<Body>,
    /// Admitted coroutines that have not completed, registered or not.
    running: usize,
    shut_down: bool,
}

struct ManagerShared {
    state: Mutex<ManagerState>,
    idle: Condvar,
    max_coroutines: Option<usize>,
}

/// Tracks every coroutine started through it and guarantees none outlives it.
///
/// Each coroutine is registered while it runs and deregistered exactly once
/// when its body returns. [`shutdown`](Self::shutdown) (also run on drop)
/// interrupts every registered coroutine and blocks until all of them have
/// unwound.
///
/// With a `max_coroutines` cap, excess bodies are queued and started in FIFO
/// order as running ones complete.
///
/// Dropping a manager from inside one of its own coroutines deadlocks.
pub struct CoroutineManager {
    service: Arc<CoroutineService>,
    shared: Arc<ManagerShared>,
}

impl CoroutineManager {
    /// Creates a manager without a concurrency cap.
    #[must_use]
    pub fn new(service: Arc<CoroutineService>) -> Self {
        Self::build(service, None)
    }

    /// Creates a manager running at most `max_coroutines` bodies at a time.
    #[must_use]
    pub fn with_limit(service: Arc<CoroutineService>, max_coroutines: usize) -> Self {
        Self::build(service, Some(max_coroutines.max(1)))
    }

    fn build(service: Arc<CoroutineService>, max_coroutines: Option<usize>) -> Self {
        Self {
            service,
            shared: Arc::new(ManagerShared {
                state: Mutex::new(ManagerState {
                    handlers: HashMap::new(),
                    queue: VecDeque::new(),
                    running: 0,
                    shut_down: false,
                }),
                idle: Condvar::new(),
                max_coroutines,
            }),
        }
    }

    /// Starts `body` under this manager, or queues it if the cap is reached.
    ///
    /// # Errors
    ///
    /// Returns [`CoroutineError::ShutDown`] after [`shutdown`](Self::shutdown),
    /// or the service's error if the body could not be started.
    pub fn start_coroutine<F>(&self, body: F) -> CoroutineResult<()>
    where
        F: FnOnce(&CoroutineHandler) + Send + 'static,
    {
        {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                return Err(CoroutineError::ShutDown);
            }
            if self
                .shared
                .max_coroutines
                .is_some_and(|max| state.running >= max)
            {
                state.queue.push_back(Box::new(body));
                debug!(queued = state.queue.len(), "coroutine queued");
                return Ok(());
            }
            state.running += 1;
        }
        launch(&self.service.inner(), &self.shared, Box::new(body))
    }

    /// Returns the number of admitted coroutines that have not completed.
    #[must_use]
    pub fn running(&self) -> usize {
        self.shared.state.lock().running
    }

    /// Returns the number of bodies waiting for a free slot.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Returns true once no coroutine is running or queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.shared.state.lock();
        state.running == 0 && state.queue.is_empty()
    }

    /// Interrupts every registered coroutine, discards queued bodies, and
    /// blocks until every admitted coroutine has returned. Idempotent.
    pub fn shutdown(&self) {
        let discarded: Vec<Body> = {
            let mut state = self.shared.state.lock();
            state.shut_down = true;
            if !state.handlers.is_empty() {
                debug!(coroutines = state.handlers.len(), "interrupting managed coroutines");
            }
            for handler in state.handlers.values() {
                handler.interrupt();
            }
            state.queue.drain(..).collect()
        };
        drop(discarded);

        let mut state = self.shared.state.lock();
        while state.running > 0 {
            self.shared.idle.wait(&mut state);
        }
    }
}

impl Drop for CoroutineManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Starts `body` on the service. The caller has already counted it as running.
fn launch(
    service: &Arc<ServiceInner>,
    shared: &Arc<ManagerShared>,
    body: Body,
) -> CoroutineResult<()> {
    let wrapper_shared = Arc::clone(shared);
    let wrapper_service = Arc::clone(service);
    let wrapped: Body = Box::new(move |handler: &CoroutineHandler| {
        register(&wrapper_shared, handler);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(handler)));
        let next = deregister(&wrapper_shared, handler);
        if let Some(next) = next {
            if let Err(e) = launch(&wrapper_service, &wrapper_shared, next) {
                warn!(error = %e, "failed to start queued coroutine");
            }
        }
        if let Err(payload) = outcome {
            panic::resume_unwind(payload);
        }
    });

    let result = service.start(wrapped);
    if result.is_err() {
        // The wrapper was dropped without running.
        let mut state = shared.state.lock();
        state.running -= 1;
        shared.idle.notify_all();
    }
    result
}

fn register(shared: &ManagerShared, handler: &CoroutineHandler) {
    let mut state = shared.state.lock();
    state.handlers.insert(handler.id(), handler.clone());
    if state.shut_down {
        handler.interrupt();
    }
}

/// Removes `handler` and hands its slot to the next queued body, if any.
fn deregister(shared: &ManagerShared, handler: &CoroutineHandler) -> Option<Body> {
    let mut state = shared.state.lock();
    state.handlers.remove(&handler.id());
    let next = if state.shut_down {
        None
    } else {
        state.queue.pop_front()
    };
    if next.is_none() {
        state.running -= 1;
        shared.idle.notify_all();
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContinuationStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn completed_coroutines_are_deregistered() {
        let service = Arc::new(CoroutineService::new());
        let manager = CoroutineManager::new(Arc::clone(&service));

        for _ in 0..3 {
            manager.start_coroutine(|_| {}).unwrap();
        }
        assert!(manager.is_idle());
    }

    #[test]
    fn shutdown_interrupts_and_waits() {
        let service = Arc::new(CoroutineService::new());
        let manager = CoroutineManager::new(Arc::clone(&service));
        let unwound = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let unwound = Arc::clone(&unwound);
            manager
                .start_coroutine(move |handler| {
                    assert_eq!(handler.suspend(), ContinuationStatus::Interrupted);
                    unwound.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        assert_eq!(manager.running(), 4);

        drop(manager);
        assert_eq!(unwound.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn start_after_shutdown_is_rejected() {
        let service = Arc::new(CoroutineService::new());
        let manager = CoroutineManager::new(service);
        manager.shutdown();

        let result = manager.start_coroutine(|_| {});
        assert!(matches!(result, Err(CoroutineError::ShutDown)));
    }

    #[test]
    fn cap_queues_excess_bodies_in_order() {
        let service = Arc::new(CoroutineService::new());
        let manager = CoroutineManager::with_limit(Arc::clone(&service), 1);
        let (handler_tx, handler_rx) = mpsc::channel();
        let (order_tx, order_rx) = mpsc::channel();

        for i in 0..3 {
            let handler_tx = handler_tx.clone();
            let order_tx = order_tx.clone();
            manager
                .start_coroutine(move |handler| {
                    order_tx.send(i).unwrap();
                    handler_tx.send(handler.clone()).unwrap();
                    handler.suspend();
                })
                .unwrap();
        }
        assert_eq!(manager.running(), 1);
        assert_eq!(manager.queued(), 2);

        // Each resume completes one body, which starts the next queued one
        // before the resume returns.
        for _ in 0..3 {
            handler_rx.recv().unwrap().resume(ContinuationStatus::Ok);
        }

        assert_eq!(order_rx.try_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(manager.is_idle());
    }

    #[test]
    fn shutdown_discards_queued_bodies() {
        let service = Arc::new(CoroutineService::new());
        let manager = CoroutineManager::with_limit(service, 1);
        let started = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let started = Arc::clone(&started);
            manager
                .start_coroutine(move |handler| {
                    started.fetch_add(1, Ordering::SeqCst);
                    handler.suspend();
                })
                .unwrap();
        }

        manager.shutdown();
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(manager.is_idle());
    }

    #[test]
    fn managers_share_a_service() {
        let service = Arc::new(CoroutineService::new());
        let first = CoroutineManager::new(Arc::clone(&service));
        let second = CoroutineManager::new(Arc::clone(&service));

        first.start_coroutine(|handler| {
            handler.suspend();
        })
        .unwrap();
        second.start_coroutine(|handler| {
            handler.suspend();
        })
        .unwrap();
        assert_eq!(service.live_coroutines(), 2);

        drop(first);
        assert_eq!(second.running(), 1);
    }
}
