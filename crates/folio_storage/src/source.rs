//! Callback-based access to objects.

use crate::error::StorageResult;
use crate::object::ObjectId;
use crate::store::ObjectStore;
use folio_coroutine::Dispatcher;
use std::sync::Arc;
use std::time::Duration;

/// Completion callback of [`ObjectSource::get_object`].
pub type GetCallback = Box<dyn FnOnce(StorageResult<Vec<u8>>) + Send + 'static>;

/// Completion callback of [`ObjectSource::put_object`].
pub type PutCallback = Box<dyn FnOnce(StorageResult<ObjectId>) + Send + 'static>;

/// Asynchronous object access.
///
/// Implementations invoke each callback exactly once, possibly before the
/// call returns and possibly on another thread. A callback dropped without
/// being invoked means the operation was abandoned (for example because the
/// source shut down).
pub trait ObjectSource: Send + Sync {
    /// Reads an object.
    fn get_object(&self, id: ObjectId, callback: GetCallback);

    /// Writes an object.
    fn put_object(&self, bytes: Vec<u8>, callback: PutCallback);
}

impl ObjectSource for ObjectStore {
    fn get_object(&self, id: ObjectId, callback: GetCallback) {
        callback(self.get(&id));
    }

    fn put_object(&self, bytes: Vec<u8>, callback: PutCallback) {
        callback(self.put(&bytes));
    }
}

impl<S: ObjectSource + ?Sized> ObjectSource for Arc<S> {
    fn get_object(&self, id: ObjectId, callback: GetCallback) {
        (**self).get_object(id, callback);
    }

    fn put_object(&self, bytes: Vec<u8>, callback: PutCallback) {
        (**self).put_object(bytes, callback);
    }
}

/// An [`ObjectSource`] completing every request on a dispatcher.
///
/// Callbacks never fire before the request returns, and run on whatever
/// thread drives the dispatcher. If the dispatcher stops before running a
/// request, its callback is dropped.
pub struct DispatchedObjectSource {
    store: Arc<ObjectStore>,
    dispatcher: Arc<dyn Dispatcher>,
    latency: Duration,
}

impl DispatchedObjectSource {
    /// Serves `store` through `dispatcher`.
    #[must_use]
    pub fn new(store: Arc<ObjectStore>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            latency: Duration::ZERO,
        }
    }

    /// Delays every completion by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    fn schedule(&self, task: folio_coroutine::Task) {
        if self.latency.is_zero() {
            self.dispatcher.post(task);
        } else {
            self.dispatcher.post_delayed(self.latency, task);
        }
    }
}

impl ObjectSource for DispatchedObjectSource {
    fn get_object(&self, id: ObjectId, callback: GetCallback) {
        let store = Arc::clone(&self.store);
        self.schedule(Box::new(move || callback(store.get(&id))));
    }

    fn put_object(&self, bytes: Vec<u8>, callback: PutCallback) {
        let store = Arc::clone(&self.store);
        self.schedule(Box::new(move || callback(store.put(&bytes))));
    }
}
