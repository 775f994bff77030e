use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use folio_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// Object store that keeps every object's content in a map.
///
/// Used for memory-backed ledgers and in tests. Content is kept as `Bytes`,
/// so a read hands out a shared view rather than a copy.
#[derive(Default)]
pub struct InMemoryObjectStore {
    contents: RwLock<HashMap<ObjectId, Bytes>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contents.read().expect("object map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held across all objects.
    pub fn resident_bytes(&self) -> u64 {
        let contents = self.contents.read().expect("object map lock poisoned");
        contents.values().map(|data| data.len() as u64).sum()
    }

    /// Ids of the stored objects, ascending.
    pub fn ids(&self) -> Vec<ObjectId> {
        let contents = self.contents.read().expect("object map lock poisoned");
        let mut ids: Vec<ObjectId> = contents.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let contents = self.contents.read().expect("object map lock poisoned");
        Ok(contents.get(id).cloned().map(StoredObject::new))
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        self.contents
            .write()
            .expect("object map lock poisoned")
            .entry(id)
            .or_insert_with(|| object.data.clone());
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self
            .contents
            .read()
            .expect("object map lock poisoned")
            .contains_key(id))
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let removed = self
            .contents
            .write()
            .expect("object map lock poisoned")
            .remove(id);
        Ok(removed.is_some())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("objects", &self.len())
            .field("bytes", &self.resident_bytes())
            .finish()
    }
}
