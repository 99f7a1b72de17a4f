//! Content-addressed object store over an append-only backend.
//!
//! ## Record Format
//!
//! ```text
//! | len (4, LE) | id (32) | payload (len) |
//! ```
//!
//! The index from id to record location lives in memory and is rebuilt by
//! scanning the log on [`ObjectStore::open`].

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::memory::InMemoryBackend;
use crate::object::{ObjectId, OBJECT_ID_SIZE};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::{debug, warn};

const LEN_SIZE: usize = 4;
const HEADER_SIZE: usize = LEN_SIZE + OBJECT_ID_SIZE;

#[derive(Debug, Clone, Copy)]
struct Location {
    offset: u64,
    len: usize,
}

/// Immutable objects keyed by the SHA-256 of their bytes.
///
/// Writing the same bytes twice stores them once. Reads verify the payload
/// against its id, so corruption surfaces as [`StorageError::Corrupted`]
/// rather than as wrong content.
///
/// # Example
///
/// ```rust
/// use folio_storage::ObjectStore;
///
/// let store = ObjectStore::in_memory();
/// let id = store.put(b"value").unwrap();
/// assert_eq!(store.get(&id).unwrap(), b"value");
/// assert_eq!(store.put(b"value").unwrap(), id);
/// assert_eq!(store.len(), 1);
/// ```
pub struct ObjectStore {
    backend: Mutex<Box<dyn StorageBackend>>,
    index: RwLock<HashMap<ObjectId, Location>>,
}

impl ObjectStore {
    /// Creates an empty store over an [`InMemoryBackend`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backend: Mutex::new(Box::new(InMemoryBackend::new())),
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a store over `backend`, indexing every record already in it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if a record is truncated or its
    /// payload does not hash to its recorded id.
    pub fn open(backend: Box<dyn StorageBackend>) -> StorageResult<Self> {
        let size = backend.size()?;
        let mut index = HashMap::new();
        let mut offset = 0u64;

        while offset < size {
            if size - offset < HEADER_SIZE as u64 {
                return Err(StorageError::corrupted(format!(
                    "truncated record header at offset {offset}"
                )));
            }
            let header = backend.read_at(offset, HEADER_SIZE)?;
            let (len_bytes, id_bytes) = header.split_at(LEN_SIZE);
            let len = u32::from_le_bytes(
                len_bytes
                    .try_into()
                    .map_err(|_| StorageError::corrupted("record length"))?,
            ) as usize;
            let id = ObjectId::from_bytes(
                id_bytes
                    .try_into()
                    .map_err(|_| StorageError::corrupted("record id"))?,
            );

            let payload_offset = offset + HEADER_SIZE as u64;
            let payload = backend.read_at(payload_offset, len).map_err(|e| match e {
                StorageError::ReadPastEnd { .. } => StorageError::corrupted(format!(
                    "truncated record payload at offset {offset}"
                )),
                other => other,
            })?;
            if !id.matches(&payload) {
                return Err(StorageError::corrupted(format!(
                    "record at offset {offset} does not match id {id}"
                )));
            }

            index.insert(
                id,
                Location {
                    offset: payload_offset,
                    len,
                },
            );
            offset = payload_offset + len as u64;
        }

        debug!(objects = index.len(), bytes = size, "object store opened");
        Ok(Self {
            backend: Mutex::new(backend),
            index: RwLock::new(index),
        })
    }

    /// Stores `bytes` and returns their id. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails, or
    /// [`StorageError::InvalidArgument`] if the object exceeds 4 GiB.
    pub fn put(&self, bytes: &[u8]) -> StorageResult<ObjectId> {
        let id = ObjectId::of(bytes);
        let len = u32::try_from(bytes.len())
            .map_err(|_| StorageError::invalid_argument("object larger than 4 GiB"))?;

        // Writers serialize on the backend lock, so a concurrent put of the
        // same bytes sees the first one's index entry.
        let mut backend = self.backend.lock();
        if self.index.read().contains_key(&id) {
            return Ok(id);
        }

        let mut record = Vec::with_capacity(HEADER_SIZE + bytes.len());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(id.as_bytes());
        record.extend_from_slice(bytes);
        let offset = backend.append(&record)?;

        self.index.write().insert(
            id,
            Location {
                offset: offset + HEADER_SIZE as u64,
                len: bytes.len(),
            },
        );
        Ok(id)
    }

    /// Reads the object with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] for unknown ids and
    /// [`StorageError::Corrupted`] if the stored bytes do not verify.
    pub fn get(&self, id: &ObjectId) -> StorageResult<Vec<u8>> {
        let location = self
            .index
            .read()
            .get(id)
            .copied()
            .ok_or(StorageError::NotFound(*id))?;
        let bytes = self.backend.lock().read_at(location.offset, location.len)?;
        if !id.matches(&bytes) {
            warn!(object = %id, "stored object failed verification");
            return Err(StorageError::corrupted(format!("object {id} failed verification")));
        }
        Ok(bytes)
    }

    /// Returns true if the object is stored.
    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.read().contains_key(id)
    }

    /// Returns the number of distinct objects stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// Returns true if no object is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Returns the ids of all stored objects, sorted.
    #[must_use]
    pub fn object_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.index.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Flushes the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend flush fails.
    pub fn flush(&self) -> StorageResult<()> {
        self.backend.lock().flush()
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("objects", &self.len())
            .finish_non_exhaustive()
    }
}
