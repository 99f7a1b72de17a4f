//! Fan-in of several callbacks into one ordered completion.

use parking_lot::Mutex;
use std::sync::Arc;

type OnDone<T> = Box<dyn FnOnce(Vec<T>) + Send + 'static>;

struct WaiterState<T> {
    results: Vec<Option<T>>,
    remaining: usize,
    on_done: Option<OnDone<T>>,
}

/// Collects the results of `count` callbacks and delivers them, in callback
/// index order, once all of them have fired.
///
/// If any callback is dropped without being invoked, `on_done` is dropped
/// unfired as well. Combined with [`crate::Completion`] this turns a lost
/// callback into an interruption of the waiting coroutine.
///
/// # Example
///
/// ```rust
/// use folio_coroutine::Waiter;
/// use std::sync::mpsc;
///
/// let (tx, rx) = mpsc::channel();
/// let waiter = Waiter::new(2, move |values: Vec<u32>| tx.send(values).unwrap());
/// let first = waiter.callback(0);
/// let second = waiter.callback(1);
/// second(20);
/// first(10);
/// assert_eq!(rx.recv().unwrap(), vec![10, 20]);
/// ```
pub struct Waiter<T: Send + 'static> {
    state: Arc<Mutex<WaiterState<T>>>,
}

impl<T: Send + 'static> Waiter<T> {
    /// Creates a waiter for `count` results. With a count of zero,
    /// `on_done` fires immediately with an empty vector.
    pub fn new<F>(count: usize, on_done: F) -> Self
    where
        F: FnOnce(Vec<T>) + Send + 'static,
    {
        let state = Arc::new(Mutex::new(WaiterState {
            results: (0..count).map(|_| None).collect(),
            remaining: count,
            on_done: None,
        }));
        if count == 0 {
            on_done(Vec::new());
        } else {
            state.lock().on_done = Some(Box::new(on_done));
        }
        Self { state }
    }

    /// Returns the callback filling slot `index`.
    ///
    /// # Panics
    ///
    /// The returned callback panics if `index` is out of range or the slot
    /// was already filled.
    pub fn callback(&self, index: usize) -> impl FnOnce(T) + Send + 'static {
        let slot = Slot {
            state: Arc::clone(&self.state),
            index,
            filled: false,
        };
        move |value| slot.fill(value)
    }
}

/// One pending result. Dropping it unfilled cancels the whole waiter.
struct Slot<T: Send + 'static> {
    state: Arc<Mutex<WaiterState<T>>>,
    index: usize,
    filled: bool,
}

impl<T: Send + 'static> Slot<T> {
    fn fill(mut self, value: T) {
        self.filled = true;
        let ready = {
            let mut state = self.state.lock();
            let slot = &mut state.results[self.index];
            assert!(slot.is_none(), "waiter slot {} filled twice", self.index);
            *slot = Some(value);
            state.remaining -= 1;
            if state.remaining == 0 {
                state.on_done.take().map(|on_done| {
                    let results = state.results.drain(..).flatten().collect::<Vec<_>>();
                    (on_done, results)
                })
            } else {
                None
            }
        };
        if let Some((on_done, results)) = ready {
            on_done(results);
        }
    }
}

impl<T: Send + 'static> Drop for Slot<T> {
    fn drop(&mut self) {
        if !self.filled {
            let on_done = self.state.lock().on_done.take();
            drop(on_done);
        }
    }
}
