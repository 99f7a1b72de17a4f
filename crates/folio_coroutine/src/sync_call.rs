//! Adapter turning a callback-based operation into a suspension point.

use crate::error::{ContinuationStatus, CoroutineError, CoroutineResult};
use crate::handler::CoroutineHandler;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Progress of one `sync_call`, shared between the coroutine and the
/// completion callback.
enum CallPhase<T> {
    /// The operation is still being invoked.
    Calling,
    /// The coroutine is suspended waiting for the completion.
    Waiting,
    /// The completion delivered a value.
    Completed(T),
    /// The completion was dropped without being invoked.
    Dropped,
    /// `sync_call` has returned; late completions are discarded.
    Abandoned,
}

/// Completion callback handed to the operation wrapped by [`sync_call`].
///
/// Call [`complete`](Self::complete) exactly once, from any thread. Dropping
/// the completion without calling it resumes the waiting coroutine with
/// [`ContinuationStatus::Interrupted`] instead of leaving it suspended
/// forever. Completing after `sync_call` has already returned is a no-op.
pub struct Completion<T: Send + 'static> {
    phase: Arc<Mutex<CallPhase<T>>>,
    handler: CoroutineHandler,
    fired: bool,
}

impl<T: Send + 'static> Completion<T> {
    /// Delivers the result of the operation.
    pub fn complete(mut self, value: T) {
        self.fired = true;
        self.deliver(Some(value));
    }

    fn deliver(&self, value: Option<T>) {
        let wake = {
            let mut phase = self.phase.lock();
            match std::mem::replace(&mut *phase, CallPhase::Abandoned) {
                CallPhase::Calling => {
                    *phase = value.map_or(CallPhase::Dropped, CallPhase::Completed);
                    None
                }
                CallPhase::Waiting => match value {
                    Some(value) => {
                        *phase = CallPhase::Completed(value);
                        Some(ContinuationStatus::Ok)
                    }
                    None => {
                        *phase = CallPhase::Dropped;
                        Some(ContinuationStatus::Interrupted)
                    }
                },
                CallPhase::Abandoned => {
                    trace!(coroutine = self.handler.id(), "late completion discarded");
                    None
                }
                settled @ (CallPhase::Completed(_) | CallPhase::Dropped) => {
                    *phase = settled;
                    None
                }
            }
        };

        // The phase lock is released before resuming: the coroutine reads
        // the phase as soon as it wakes.
        if let Some(status) = wake {
            self.handler.resume(status);
        }
    }
}

impl<T: Send + 'static> Drop for Completion<T> {
    fn drop(&mut self) {
        if !self.fired {
            self.deliver(None);
        }
    }
}

/// Invokes `operation` with a [`Completion`] and suspends the calling
/// coroutine until the completion fires.
///
/// - If the completion fires before `operation` returns, no suspension
///   happens and the value is returned directly.
/// - Otherwise the coroutine suspends and is resumed by the completion,
///   possibly from another thread.
/// - If the completion is dropped unfired, the call returns
///   [`CoroutineError::Interrupted`].
///
/// Once interrupted (by shutdown or a dropped completion) the call returns
/// `Interrupted` and any later completion is discarded.
///
/// # Errors
///
/// Returns [`CoroutineError::Interrupted`] when the coroutine must unwind.
///
/// # Panics
///
/// Panics if called from outside the coroutine owning `handler`.
///
/// # Example
///
/// ```rust
/// use folio_coroutine::{sync_call, CoroutineService};
/// use std::thread;
///
/// let service = CoroutineService::new();
/// service
///     .start_coroutine(|handler| {
///         let sum = sync_call(handler, |done| {
///             thread::spawn(move || done.complete(2 + 2));
///         })
///         .unwrap();
///         assert_eq!(sum, 4);
///     })
///     .unwrap();
/// ```
pub fn sync_call<T, F>(handler: &CoroutineHandler, operation: F) -> CoroutineResult<T>
where
    T: Send + 'static,
    F: FnOnce(Completion<T>),
{
    let phase = Arc::new(Mutex::new(CallPhase::Calling));
    operation(Completion {
        phase: Arc::clone(&phase),
        handler: handler.clone(),
        fired: false,
    });

    let status = handler.suspend_unless(|| {
        let mut phase = phase.lock();
        if matches!(*phase, CallPhase::Calling) {
            *phase = CallPhase::Waiting;
            false
        } else {
            true
        }
    });

    let settled = std::mem::replace(&mut *phase.lock(), CallPhase::Abandoned);
    if status == Some(ContinuationStatus::Interrupted) {
        return Err(CoroutineError::Interrupted);
    }
    match settled {
        CallPhase::Completed(value) => Ok(value),
        _ => Err(CoroutineError::Interrupted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::CoroutineService;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn synchronous_completion_does_not_suspend() {
        let service = CoroutineService::new();
        let (tx, rx) = mpsc::channel();

        service
            .start_coroutine(move |handler| {
                let result = sync_call(handler, |done| done.complete("ready"));
                tx.send(result.unwrap()).unwrap();
            })
            .unwrap();

        assert_eq!(rx.recv().unwrap(), "ready");
    }

    #[test]
    fn asynchronous_completion_resumes() {
        let service = CoroutineService::new();
        let (tx, rx) = mpsc::channel();
        let (pending_tx, pending_rx) = mpsc::channel::<Completion<u32>>();

        service
            .start_coroutine(move |handler| {
                let result = sync_call(handler, |done| pending_tx.send(done).unwrap());
                tx.send(result.unwrap()).unwrap();
            })
            .unwrap();

        // The body is parked in sync_call at this point.
        let done = pending_rx.recv().unwrap();
        assert!(rx.try_recv().is_err());
        done.complete(7);
        assert_eq!(rx.recv().unwrap(), 7);
    }

    #[test]
    fn completion_from_another_thread() {
        let service = CoroutineService::new();
        let (tx, rx) = mpsc::channel();

        service
            .start_coroutine(move |handler| {
                let result = sync_call(handler, |done| {
                    thread::spawn(move || {
                        thread::sleep(std::time::Duration::from_millis(5));
                        done.complete(String::from("remote"));
                    });
                });
                tx.send(result.unwrap()).unwrap();
            })
            .unwrap();

        assert_eq!(rx.recv().unwrap(), "remote");
    }

    #[test]
    fn dropped_completion_interrupts() {
        let service = CoroutineService::new();
        let (tx, rx) = mpsc::channel();

        service
            .start_coroutine(move |handler| {
                let result: CoroutineResult<u32> = sync_call(handler, drop);
                tx.send(result.is_err()).unwrap();
            })
            .unwrap();

        assert!(rx.recv().unwrap());
    }

    #[test]
    fn completion_dropped_later_interrupts() {
        let service = CoroutineService::new();
        let (tx, rx) = mpsc::channel();
        let (pending_tx, pending_rx) = mpsc::channel::<Completion<u32>>();

        service
            .start_coroutine(move |handler| {
                let result = sync_call(handler, |done| pending_tx.send(done).unwrap());
                tx.send(matches!(result, Err(CoroutineError::Interrupted)))
                    .unwrap();
            })
            .unwrap();

        drop(pending_rx.recv().unwrap());
        assert!(rx.recv().unwrap());
    }

    #[test]
    fn late_completion_after_shutdown_is_discarded() {
        let service = CoroutineService::new();
        let (tx, rx) = mpsc::channel();
        let (pending_tx, pending_rx) = mpsc::channel::<Completion<u32>>();

        service
            .start_coroutine(move |handler| {
                let result = sync_call(handler, |done| pending_tx.send(done).unwrap());
                tx.send(result.is_err()).unwrap();
            })
            .unwrap();

        let done = pending_rx.recv().unwrap();
        drop(service);
        assert!(rx.recv().unwrap());

        // The coroutine is gone; this must neither panic nor resume anything.
        done.complete(1);
    }

    #[test]
    fn sequential_calls_in_one_coroutine() {
        let service = CoroutineService::new();
        let (tx, rx) = mpsc::channel();

        service
            .start_coroutine(move |handler| {
                let mut total = 0;
                for i in 0..5u32 {
                    total += sync_call(handler, |done| {
                        thread::spawn(move || done.complete(i));
                    })
                    .unwrap();
                }
                tx.send(total).unwrap();
            })
            .unwrap();

        assert_eq!(rx.recv().unwrap(), 10);
    }
}
