//! Coroutine adapters over [`ObjectSource`].
//!
//! Each function suspends the calling coroutine until the source answers.
//! Interruption surfaces as [`StorageError::Interrupted`].

use crate::error::{StorageError, StorageResult};
use crate::object::ObjectId;
use crate::source::ObjectSource;
use folio_coroutine::{sync_call, CoroutineHandler, Waiter};

/// Reads one object.
///
/// # Errors
///
/// Returns the source's error, or [`StorageError::Interrupted`].
pub fn get_object(
    handler: &CoroutineHandler,
    source: &dyn ObjectSource,
    id: ObjectId,
) -> StorageResult<Vec<u8>> {
    sync_call(handler, |done| {
        source.get_object(id, Box::new(move |result| done.complete(result)));
    })?
}

/// Reads several objects concurrently. Results are in `ids` order.
///
/// # Errors
///
/// Returns the first error in `ids` order, or [`StorageError::Interrupted`]
/// if any request was abandoned.
pub fn get_objects(
    handler: &CoroutineHandler,
    source: &dyn ObjectSource,
    ids: &[ObjectId],
) -> StorageResult<Vec<Vec<u8>>> {
    let results = sync_call(handler, |done| {
        let waiter = Waiter::new(ids.len(), move |results| done.complete(results));
        for (index, id) in ids.iter().enumerate() {
            source.get_object(*id, Box::new(waiter.callback(index)));
        }
    })?;
    results.into_iter().collect()
}

/// Writes one object and returns its id.
///
/// # Errors
///
/// Returns the source's error, or [`StorageError::Interrupted`].
pub fn put_object(
    handler: &CoroutineHandler,
    source: &dyn ObjectSource,
    bytes: Vec<u8>,
) -> StorageResult<ObjectId> {
    sync_call(handler, |done| {
        source.put_object(bytes, Box::new(move |result| done.complete(result)));
    })?
}

/// Writes several objects concurrently and returns their ids in input order.
///
/// # Errors
///
/// Returns the first error in input order, or [`StorageError::Interrupted`].
pub fn put_objects(
    handler: &CoroutineHandler,
    source: &dyn ObjectSource,
    objects: Vec<Vec<u8>>,
) -> StorageResult<Vec<ObjectId>> {
    let results = sync_call(handler, |done| {
        let waiter = Waiter::new(objects.len(), move |results| done.complete(results));
        for (index, bytes) in objects.into_iter().enumerate() {
            source.put_object(bytes, Box::new(waiter.callback(index)));
        }
    })?;
    results.into_iter().collect::<Result<Vec<_>, StorageError>>()
}
