use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;
use folio_dag::Commit;
use folio_store::{slice_range, ObjectValue, ReferenceStore};
use folio_types::{CommitId, Entry, EntryMap, Timestamp, Value};

use crate::error::{SnapshotError, SnapshotResult};

/// An immutable view of a page at one commit.
#[derive(Clone)]
pub struct Snapshot {
    commit: Arc<Commit>,
    objects: Arc<ReferenceStore>,
}

impl Snapshot {
    pub fn new(commit: Arc<Commit>, objects: Arc<ReferenceStore>) -> Self {
        Self { commit, objects }
    }

    /// The commit this snapshot reads from.
    pub fn commit(&self) -> &Arc<Commit> {
        &self.commit
    }

    pub fn commit_id(&self) -> CommitId {
        self.commit.id()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.commit.timestamp()
    }

    /// The full state as a sorted map.
    pub fn entries(&self) -> &EntryMap {
        self.commit.entries()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// The entry stored under `key`.
    pub fn get(&self, key: &[u8]) -> SnapshotResult<Entry> {
        self.entries()
            .get_key_value(key)
            .map(|(key, value)| Entry::new(key.clone(), value.clone()))
            .ok_or_else(|| SnapshotError::KeyNotFound(Bytes::copy_from_slice(key)))
    }

    /// All entries whose key starts with `prefix`, ascending by key.
    /// `None` returns every entry.
    pub fn get_all(&self, prefix: Option<&[u8]>) -> Vec<Entry> {
        self.scan(prefix)
            .map(|(key, value)| Entry::new(key.clone(), value.clone()))
            .collect()
    }

    /// Keys of [`get_all`](Self::get_all), in the same order.
    pub fn get_keys(&self, prefix: Option<&[u8]>) -> Vec<Bytes> {
        self.scan(prefix).map(|(key, _)| key.clone()).collect()
    }

    fn scan<'a>(
        &'a self,
        prefix: Option<&'a [u8]>,
    ) -> impl Iterator<Item = (&'a Bytes, &'a Value)> + 'a {
        let prefix = prefix.unwrap_or_default();
        self.entries()
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(key, _)| key.starts_with(prefix))
    }

    /// A byte range of the value under `key`.
    ///
    /// A negative `offset` counts back from the end of the value; a negative
    /// `max_size` reads to the end. Inline values are sliced directly,
    /// references are read through the object store.
    pub fn get_partial(&self, key: &[u8], offset: i64, max_size: i64) -> SnapshotResult<Bytes> {
        match self.value(key)? {
            Value::Inline(data) => Ok(slice_range(data, offset, max_size)),
            Value::Reference { id, .. } => Ok(self.objects.get_partial(id, offset, max_size)?),
        }
    }

    /// The whole value under `key`, resolving references.
    pub fn fetch(&self, key: &[u8]) -> SnapshotResult<ObjectValue> {
        match self.value(key)? {
            Value::Inline(data) => Ok(ObjectValue::Bytes(data.clone())),
            Value::Reference { id, .. } => Ok(self.objects.get(id)?),
        }
    }

    fn value(&self, key: &[u8]) -> SnapshotResult<&Value> {
        self.entries()
            .get(key)
            .ok_or_else(|| SnapshotError::KeyNotFound(Bytes::copy_from_slice(key)))
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("commit", &self.commit.id())
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use folio_dag::CommitStore;
    use folio_store::{InMemoryObjectStore, StoredObject};
    use folio_types::{ObjectId, Priority};
    use proptest::prelude::*;

    use super::*;

    fn objects() -> Arc<ReferenceStore> {
        Arc::new(ReferenceStore::new(Arc::new(InMemoryObjectStore::new())))
    }

    fn snapshot_of(entries: EntryMap, objects: Arc<ReferenceStore>) -> Snapshot {
        let mut store = CommitStore::new().unwrap();
        let root = store.heads()[0].id();
        let commit = store
            .append(vec![root], Timestamp::from_micros(1), Arc::new(entries))
            .unwrap()
            .into_commit();
        Snapshot::new(commit, objects)
    }

    fn inline_state(keys: &[&'static [u8]]) -> EntryMap {
        keys.iter()
            .map(|k| (Bytes::from_static(*k), Value::inline(Bytes::from_static(*k))))
            .collect()
    }

    #[test]
    fn get_existing_and_missing_keys() {
        let snap = snapshot_of(inline_state(&[b"a", b"b"]), objects());
        assert_eq!(snap.get(b"a").unwrap().value, Value::inline(&b"a"[..]));
        assert!(matches!(snap.get(b"zz"), Err(SnapshotError::KeyNotFound(_))));
    }

    #[test]
    fn prefix_scan_filters_and_sorts() {
        let snap = snapshot_of(
            inline_state(&[b"user/2", b"user/1", b"users", b"use", b"group/1"]),
            objects(),
        );
        let keys = snap.get_keys(Some(&b"user/"[..]));
        assert_eq!(keys, vec![Bytes::from_static(b"user/1"), Bytes::from_static(b"user/2")]);
        assert_eq!(snap.get_all(None).len(), 5);
        assert!(snap.get_all(Some(&b"nothing"[..])).is_empty());
    }

    #[test]
    fn empty_prefix_matches_everything() {
        let snap = snapshot_of(inline_state(&[b"a", b"b"]), objects());
        assert_eq!(snap.get_keys(Some(&b""[..])), snap.get_keys(None));
    }

    #[test]
    fn partial_read_of_inline_value() {
        let mut state = EntryMap::new();
        state.insert(Bytes::from_static(b"k"), Value::inline(&b"0123456789"[..]));
        let snap = snapshot_of(state, objects());
        assert_eq!(snap.get_partial(b"k", -3, -1).unwrap(), Bytes::from_static(b"789"));
        assert_eq!(snap.get_partial(b"k", 0, 4).unwrap(), Bytes::from_static(b"0123"));
    }

    #[test]
    fn partial_read_of_reference_value() {
        let objects = objects();
        let id = objects.put_bytes(&b"0123456789"[..]).unwrap();
        let mut state = EntryMap::new();
        state.insert(Bytes::from_static(b"k"), Value::reference(id, Priority::Lazy));
        let snap = snapshot_of(state, objects);
        assert_eq!(snap.get_partial(b"k", -3, -1).unwrap(), Bytes::from_static(b"789"));
        assert_eq!(
            snap.fetch(b"k").unwrap().into_bytes().unwrap(),
            Bytes::from_static(b"0123456789")
        );
    }

    #[test]
    fn dangling_reference_is_reported() {
        let missing: ObjectId = StoredObject::new(&b"never stored"[..]).compute_id();
        let mut state = EntryMap::new();
        state.insert(Bytes::from_static(b"k"), Value::reference(missing, Priority::Eager));
        let snap = snapshot_of(state, objects());
        assert!(matches!(
            snap.fetch(b"k"),
            Err(SnapshotError::ReferenceNotFound(id)) if id == missing
        ));
    }

    proptest! {
        #[test]
        fn get_all_is_sorted_and_prefixed(
            keys in prop::collection::btree_set(prop::collection::vec(0u8..4, 0..5), 0..32),
            prefix in prop::collection::vec(0u8..4, 0..3),
        ) {
            let state: EntryMap = keys
                .iter()
                .map(|k| (Bytes::from(k.clone()), Value::inline(k.clone())))
                .collect();
            let snap = snapshot_of(state, objects());
            let entries = snap.get_all(Some(prefix.as_slice()));

            prop_assert!(entries.windows(2).all(|pair| pair[0].key < pair[1].key));
            prop_assert!(entries.iter().all(|e| e.key.starts_with(&prefix)));
            let expected = keys.iter().filter(|k| k.starts_with(&prefix)).count();
            prop_assert_eq!(entries.len(), expected);
        }
    }
}
