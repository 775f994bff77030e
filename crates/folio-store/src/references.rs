//! The reference contract on top of an [`ObjectStore`] backend.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use folio_types::ObjectId;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectReader, ObjectValue, StoredObject};
use crate::range::slice_range;
use crate::traits::ObjectStore;

/// Objects up to this size are returned inline by [`ReferenceStore::get`].
pub const DEFAULT_INLINE_READ_LIMIT: usize = 64 * 1024;

/// Reference-aware front end of the object store.
///
/// Owns the reference lifecycle: commits retain the objects they point to
/// and release them when they are pruned or their page is deleted. Released
/// objects whose count drops to zero are reclaimed lazily by
/// [`collect_garbage`](Self::collect_garbage). Objects that no commit ever
/// retained are never reclaimed, and neither are objects that a staged,
/// not yet committed mutation has [`pin`](Self::pin)ned.
pub struct ReferenceStore {
    backend: Arc<dyn ObjectStore>,
    inline_read_limit: usize,
    counts: Mutex<RefCounts>,
}

#[derive(Default)]
struct RefCounts {
    live: HashMap<ObjectId, u64>,
    pinned: HashMap<ObjectId, u64>,
    released: HashSet<ObjectId>,
}

impl ReferenceStore {
    pub fn new(backend: Arc<dyn ObjectStore>) -> Self {
        Self {
            backend,
            inline_read_limit: DEFAULT_INLINE_READ_LIMIT,
            counts: Mutex::new(RefCounts::default()),
        }
    }

    /// Override the size above which reads are handed out as streams.
    pub fn with_inline_read_limit(mut self, limit: usize) -> Self {
        self.inline_read_limit = limit;
        self
    }

    pub fn backend(&self) -> &Arc<dyn ObjectStore> {
        &self.backend
    }

    /// Store the content of `reader` and return its reference id.
    ///
    /// A non-negative `expected_size` must match the stream length exactly;
    /// a negative one disables the check.
    pub fn put<R: Read>(&self, expected_size: i64, reader: R) -> StoreResult<ObjectId> {
        let mut data = Vec::new();
        match u64::try_from(expected_size) {
            Ok(expected) => {
                // Read one byte past the expectation so overlong streams are caught.
                reader
                    .take(expected.saturating_add(1))
                    .read_to_end(&mut data)?;
                let actual = data.len() as u64;
                if actual != expected {
                    return Err(StoreError::SizeMismatch { expected, actual });
                }
            }
            Err(_) => {
                let mut reader = reader;
                reader.read_to_end(&mut data)?;
            }
        }
        self.put_bytes(data)
    }

    /// Store in-memory content and return its reference id.
    ///
    /// Writing content that was released earlier takes it off the garbage
    /// list again.
    pub fn put_bytes(&self, data: impl Into<Bytes>) -> StoreResult<ObjectId> {
        self.write_object(StoredObject::new(data), false)
    }

    /// Like [`put_bytes`](Self::put_bytes), and [`pin`](Self::pin) the new
    /// object before it becomes visible to garbage collection.
    pub fn put_pinned(&self, data: impl Into<Bytes>) -> StoreResult<ObjectId> {
        self.write_object(StoredObject::new(data), true)
    }

    fn write_object(&self, object: StoredObject, pin: bool) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        {
            let mut counts = self.counts.lock().expect("ref count lock poisoned");
            counts.released.remove(&id);
            if pin {
                *counts.pinned.entry(id).or_insert(0) += 1;
            }
        }
        if let Err(e) = self.backend.write(&object) {
            if pin {
                self.unpin([id]);
            }
            return Err(e);
        }
        debug!(reference = %id.short_hex(), size = object.size, pinned = pin, "created reference");
        Ok(id)
    }

    /// Read a whole object. Large objects come back as a stream handle.
    pub fn get(&self, id: &ObjectId) -> StoreResult<ObjectValue> {
        let object = self.read_existing(id)?;
        if object.data.len() > self.inline_read_limit {
            Ok(ObjectValue::Stream(ObjectReader::new(object.data)))
        } else {
            Ok(ObjectValue::Bytes(object.data))
        }
    }

    /// Read a byte range of an object (see [`crate::range`]).
    pub fn get_partial(&self, id: &ObjectId, offset: i64, max_size: i64) -> StoreResult<Bytes> {
        let object = self.read_existing(id)?;
        Ok(slice_range(&object.data, offset, max_size))
    }

    /// Returns `true` if the object is present.
    pub fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        self.backend.exists(id)
    }

    fn read_existing(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        self.backend.read(id)?.ok_or(StoreError::NotFound(*id))
    }

    // ---------------------------------------------------------------
    // Reference counting
    // ---------------------------------------------------------------

    /// Record one more live reference for each id.
    pub fn retain(&self, ids: impl IntoIterator<Item = ObjectId>) {
        let mut counts = self.counts.lock().expect("ref count lock poisoned");
        for id in ids {
            *counts.live.entry(id).or_insert(0) += 1;
            counts.released.remove(&id);
        }
    }

    /// Drop one live reference for each id. Objects reaching zero become
    /// eligible for garbage collection.
    pub fn release(&self, ids: impl IntoIterator<Item = ObjectId>) {
        let mut counts = self.counts.lock().expect("ref count lock poisoned");
        for id in ids {
            let reached_zero = match counts.live.get_mut(&id) {
                Some(count) => {
                    *count = count.saturating_sub(1);
                    *count == 0
                }
                None => false,
            };
            if reached_zero {
                counts.live.remove(&id);
                counts.released.insert(id);
            }
        }
    }

    /// Protect each id from garbage collection until it is unpinned.
    ///
    /// Pins are held by mutations that are staged but not committed yet.
    /// They do not count as references: unpinning never marks an object as
    /// garbage.
    pub fn pin(&self, ids: impl IntoIterator<Item = ObjectId>) {
        let mut counts = self.counts.lock().expect("ref count lock poisoned");
        for id in ids {
            *counts.pinned.entry(id).or_insert(0) += 1;
        }
    }

    pub fn unpin(&self, ids: impl IntoIterator<Item = ObjectId>) {
        let mut counts = self.counts.lock().expect("ref count lock poisoned");
        for id in ids {
            if let Some(count) = counts.pinned.get_mut(&id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.pinned.remove(&id);
                }
            }
        }
    }

    /// Pin `id` if the object exists. Returns `false`, holding no pin, when
    /// it does not.
    pub fn pin_existing(&self, id: &ObjectId) -> StoreResult<bool> {
        self.pin([*id]);
        match self.backend.exists(id) {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.unpin([*id]);
                Ok(false)
            }
            Err(e) => {
                self.unpin([*id]);
                Err(e)
            }
        }
    }

    /// Current number of live references to `id`.
    pub fn ref_count(&self, id: &ObjectId) -> u64 {
        let counts = self.counts.lock().expect("ref count lock poisoned");
        counts.live.get(id).copied().unwrap_or(0)
    }

    /// Delete every released object that is neither referenced nor pinned.
    /// Returns the number of objects reclaimed.
    ///
    /// The whole pass runs under the count lock, so no object can be
    /// retained or pinned between its check and its deletion. Pinned objects
    /// stay on the garbage list for a later pass.
    pub fn collect_garbage(&self) -> StoreResult<usize> {
        let mut counts = self.counts.lock().expect("ref count lock poisoned");
        let candidates: Vec<ObjectId> = counts.released.iter().copied().collect();
        let mut reclaimed = 0;
        for id in candidates {
            if counts.live.contains_key(&id) {
                counts.released.remove(&id);
                continue;
            }
            if counts.pinned.contains_key(&id) {
                continue;
            }
            if self.backend.delete(&id)? {
                reclaimed += 1;
            }
            counts.released.remove(&id);
        }
        debug!(reclaimed, pending = counts.released.len(), "object garbage collection complete");
        Ok(reclaimed)
    }
}

impl std::fmt::Debug for ReferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceStore")
            .field("inline_read_limit", &self.inline_read_limit)
            .finish_non_exhaustive()
    }
}
