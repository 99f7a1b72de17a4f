//! Suspend/resume handle of a single coroutine.

use crate::error::ContinuationStatus;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::any::Any;
use std::fmt;
use std::panic;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::trace;

/// Where the coroutine body currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// The body is executing on its execution context.
    Running,
    /// The body is parked in `suspend`.
    Suspended,
    /// A resume was delivered and the body has not woken up yet.
    Resumed(ContinuationStatus),
    /// The body returned.
    Finished,
}

struct HandlerState {
    phase: Phase,
    interrupted: bool,
    thread: Option<ThreadId>,
    panic: Option<Box<dyn Any + Send + 'static>>,
}

struct HandlerInner {
    id: u64,
    state: Mutex<HandlerState>,
    cond: Condvar,
}

/// Handle by which a running coroutine suspends and by which outside code
/// resumes it.
///
/// Handlers are cheap to clone; all clones refer to the same coroutine.
///
/// # Contract
///
/// - [`suspend`](Self::suspend) may only be called from inside the coroutine.
/// - [`resume`](Self::resume) may only be called while the coroutine is
///   suspended, from any thread.
///
/// Violations are caller defects and panic.
#[derive(Clone)]
pub struct CoroutineHandler {
    inner: Arc<HandlerInner>,
}

impl CoroutineHandler {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                id,
                state: Mutex::new(HandlerState {
                    phase: Phase::Running,
                    interrupted: false,
                    thread: None,
                    panic: None,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Returns the identifier of this coroutine, unique within its service.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns true once the coroutine has been told to unwind.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.inner.state.lock().interrupted
    }

    /// Returns true if the coroutine is parked waiting for a resume.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.inner.state.lock().phase == Phase::Suspended
    }

    /// Returns true once the coroutine body has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().phase == Phase::Finished
    }

    /// Suspends the calling coroutine until it is resumed.
    ///
    /// Returns [`ContinuationStatus::Ok`] on a normal resume and
    /// [`ContinuationStatus::Interrupted`] when resumed during shutdown. Once
    /// interrupted, every later call returns `Interrupted` immediately.
    ///
    /// # Panics
    ///
    /// Panics if called from outside this coroutine.
    pub fn suspend(&self) -> ContinuationStatus {
        self.suspend_unless(|| false)
            .unwrap_or(ContinuationStatus::Ok)
    }

    /// Suspends unless `ready` reports that the awaited result is already
    /// available. `ready` runs under the handler lock, so a resume racing
    /// with the decision always observes the coroutine as suspended.
    ///
    /// Returns `None` when no suspension happened.
    pub(crate) fn suspend_unless(
        &self,
        ready: impl FnOnce() -> bool,
    ) -> Option<ContinuationStatus> {
        let mut state = self.inner.state.lock();
        self.assert_on_coroutine(&state);

        if state.interrupted {
            return Some(ContinuationStatus::Interrupted);
        }
        if ready() {
            return None;
        }

        state.phase = Phase::Suspended;
        self.inner.cond.notify_all();
        trace!(coroutine = self.inner.id, "suspended");

        loop {
            if let Phase::Resumed(status) = state.phase {
                state.phase = Phase::Running;
                return Some(status);
            }
            self.inner.cond.wait(&mut state);
        }
    }

    /// Resumes the suspended coroutine with `status`.
    ///
    /// Blocks until the coroutine suspends again or returns.
    ///
    /// Resumes arriving after the coroutine was interrupted are ignored: the
    /// coroutine is already unwinding.
    ///
    /// # Panics
    ///
    /// Panics if the coroutine is not suspended (and was not interrupted).
    pub fn resume(&self, status: ContinuationStatus) {
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Suspended {
            if state.interrupted {
                trace!(coroutine = self.inner.id, "resume after interruption ignored");
                return;
            }
            let phase = state.phase;
            drop(state);
            panic!(
                "resume called on coroutine {} which is not suspended ({phase:?})",
                self.inner.id
            );
        }

        state.phase = Phase::Resumed(status);
        self.inner.cond.notify_all();
        self.park_caller(state);
    }

    /// Marks the coroutine as interrupted, waking it if it is suspended.
    ///
    /// Every later suspension point in the coroutine reports
    /// [`ContinuationStatus::Interrupted`]. Does not wait for the coroutine
    /// to unwind; interrupting a finished coroutine does nothing.
    pub fn interrupt(&self) {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Finished || state.interrupted {
            return;
        }
        state.interrupted = true;
        if state.phase == Phase::Suspended {
            state.phase = Phase::Resumed(ContinuationStatus::Interrupted);
            self.inner.cond.notify_all();
        }
    }

    /// Called on the execution context right before the body runs.
    pub(crate) fn begin(&self) {
        let mut state = self.inner.state.lock();
        state.thread = Some(thread::current().id());
        state.phase = Phase::Running;
    }

    /// Called on the execution context once the body has returned.
    pub(crate) fn finish(&self, panic: Option<Box<dyn Any + Send + 'static>>) {
        let mut state = self.inner.state.lock();
        state.phase = Phase::Finished;
        state.panic = panic;
        self.inner.cond.notify_all();
    }

    /// Blocks the caller until the coroutine suspends or returns.
    ///
    /// A panic raised by the body is re-raised on the caller.
    pub(crate) fn wait_until_parked(&self) {
        let state = self.inner.state.lock();
        self.park_caller(state);
    }

    fn park_caller(&self, mut state: MutexGuard<'_, HandlerState>) {
        while matches!(state.phase, Phase::Running | Phase::Resumed(_)) {
            self.inner.cond.wait(&mut state);
        }
        let payload = state.panic.take();
        drop(state);
        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
    }

    fn assert_on_coroutine(&self, state: &HandlerState) {
        let current = thread::current().id();
        if state.thread != Some(current) || state.phase != Phase::Running {
            panic!(
                "suspend called outside of coroutine {} ({:?})",
                self.inner.id, state.phase
            );
        }
    }
}

impl fmt::Debug for CoroutineHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CoroutineHandler")
            .field("id", &self.inner.id)
            .field("phase", &state.phase)
            .field("interrupted", &state.interrupted)
            .finish()
    }
}
