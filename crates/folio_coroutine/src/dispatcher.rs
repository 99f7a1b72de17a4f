//! Task dispatchers: the event loops that callbacks and delayed work run on.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// A unit of work posted to a dispatcher.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs posted tasks one at a time, in due-time order.
///
/// Tasks that are never run (because the dispatcher stopped) are dropped,
/// which drops any completion they captured.
pub trait Dispatcher: Send + Sync {
    /// Posts a task to run as soon as possible.
    fn post(&self, task: Task);

    /// Posts a task to run after `delay`.
    fn post_delayed(&self, delay: Duration, task: Task);
}

/// A scheduled task. Ordered so that `BinaryHeap` pops the earliest due
/// task first, with posting order breaking ties.
struct Scheduled<K> {
    due: K,
    seq: u64,
    task: Task,
}

impl<K: Ord> PartialEq for Scheduled<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> Eq for Scheduled<K> {}

impl<K: Ord> PartialOrd for Scheduled<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> Ord for Scheduled<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct TaskQueue<K> {
    heap: BinaryHeap<Scheduled<K>>,
    next_seq: u64,
}

impl<K: Ord> TaskQueue<K> {
    fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    fn push(&mut self, due: K, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { due, seq, task });
    }

    /// Pops the earliest task if it is due at or before `now`.
    fn pop_due(&mut self, now: &K) -> Option<Scheduled<K>> {
        if self.heap.peek().is_some_and(|next| next.due <= *now) {
            self.heap.pop()
        } else {
            None
        }
    }
}

struct ThreadShared {
    state: Mutex<ThreadState>,
    cond: Condvar,
}

struct ThreadState {
    queue: TaskQueue<Instant>,
    stopped: bool,
}

/// A dispatcher backed by one dedicated thread.
///
/// Dropping the dispatcher drops every queued task and tells the thread to
/// exit once its running task (if any) returns. The drop does not wait for
/// that task: it may be resuming the very coroutine that drops the
/// dispatcher.
pub struct ThreadDispatcher {
    shared: Arc<ThreadShared>,
}

impl ThreadDispatcher {
    /// Starts a dispatcher thread named `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn new(name: impl Into<String>) -> std::io::Result<Self> {
        let shared = Arc::new(ThreadShared {
            state: Mutex::new(ThreadState {
                queue: TaskQueue::new(),
                stopped: false,
            }),
            cond: Condvar::new(),
        });
        let worker = Arc::clone(&shared);
        thread::Builder::new()
            .name(name.into())
            .spawn(move || run_dispatcher(&worker))?;
        Ok(Self { shared })
    }

    /// Returns the number of tasks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.heap.len()
    }

    fn schedule(&self, due: Instant, task: Task) {
        let mut state = self.shared.state.lock();
        if state.stopped {
            drop(state);
            trace!("task posted to stopped dispatcher dropped");
            drop(task);
            return;
        }
        state.queue.push(due, task);
        self.shared.cond.notify_one();
    }
}

impl Dispatcher for ThreadDispatcher {
    fn post(&self, task: Task) {
        self.schedule(Instant::now(), task);
    }

    fn post_delayed(&self, delay: Duration, task: Task) {
        self.schedule(Instant::now() + delay, task);
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        let abandoned: Vec<Scheduled<Instant>> = {
            let mut state = self.shared.state.lock();
            state.stopped = true;
            self.shared.cond.notify_all();
            state.queue.heap.drain().collect()
        };
        if !abandoned.is_empty() {
            debug!(tasks = abandoned.len(), "dropping unrun dispatcher tasks");
        }
        drop(abandoned);
    }
}

fn run_dispatcher(shared: &ThreadShared) {
    let mut state = shared.state.lock();
    loop {
        if state.stopped {
            break;
        }
        let now = Instant::now();
        if let Some(next) = state.queue.pop_due(&now) {
            drop(state);
            (next.task)();
            state = shared.state.lock();
            continue;
        }
        match state.queue.heap.peek().map(|next| next.due) {
            Some(due) => {
                shared.cond.wait_until(&mut state, due);
            }
            None => shared.cond.wait(&mut state),
        }
    }
}

/// A dispatcher driven by hand, with a virtual clock.
///
/// Nothing runs until [`run_until_idle`](Self::run_until_idle) or
/// [`advance`](Self::advance) is called. Useful for deterministic tests of
/// code that schedules delayed work.
pub struct ManualDispatcher {
    state: Mutex<ManualState>,
}

struct ManualState {
    now: Duration,
    queue: TaskQueue<Duration>,
}

impl ManualDispatcher {
    /// Creates a dispatcher with its clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: Duration::ZERO,
                queue: TaskQueue::new(),
            }),
        }
    }

    /// Returns the virtual time elapsed since creation.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Returns the number of queued tasks, due or not.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().queue.heap.len()
    }

    /// Runs every task that is due now, including tasks posted by the tasks
    /// it runs. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = {
                let mut state = self.state.lock();
                let now = state.now;
                state.queue.pop_due(&now)
            };
            match next {
                Some(next) => {
                    (next.task)();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Moves the clock forward by `delay`, running tasks in due order as the
    /// clock passes them. Returns the number of tasks run.
    pub fn advance(&self, delay: Duration) -> usize {
        let target = self.now() + delay;
        let mut ran = 0;
        loop {
            let next = {
                let mut state = self.state.lock();
                let next = state.queue.pop_due(&target);
                if let Some(next) = &next {
                    state.now = state.now.max(next.due);
                } else {
                    state.now = target;
                }
                next
            };
            match next {
                Some(next) => {
                    (next.task)();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Default for ManualDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for ManualDispatcher {
    fn post(&self, task: Task) {
        let mut state = self.state.lock();
        let now = state.now;
        state.queue.push(now, task);
    }

    fn post_delayed(&self, delay: Duration, task: Task) {
        let mut state = self.state.lock();
        let due = state.now + delay;
        state.queue.push(due, task);
    }
}
