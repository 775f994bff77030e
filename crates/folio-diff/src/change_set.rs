//! Sorted change sets between two entry maps.

use std::cmp::Ordering;

use bytes::Bytes;
use folio_types::{EntryChange, EntryMap, Value};
use serde::{Deserialize, Serialize};

use crate::error::{DiffError, DiffResult};

/// An ordered set of key changes, at most one per key, sorted by raw key
/// bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: Vec<EntryChange>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a change set from changes in any order.
    ///
    /// Fails if two changes target the same key.
    pub fn from_changes(mut changes: Vec<EntryChange>) -> DiffResult<Self> {
        changes.sort_by(|a, b| a.key.cmp(&b.key));
        if let Some(pair) = changes.windows(2).find(|pair| pair[0].key == pair[1].key) {
            return Err(DiffError::DuplicateKey(pair[0].key.clone()));
        }
        Ok(Self { changes })
    }

    /// Returns `true` if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// The changes in key order.
    pub fn changes(&self) -> &[EntryChange] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<EntryChange> {
        self.changes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EntryChange> {
        self.changes.iter()
    }

    /// The change for `key`, if any.
    pub fn get(&self, key: &[u8]) -> Option<&EntryChange> {
        self.changes
            .binary_search_by(|change| change.key.as_ref().cmp(key))
            .ok()
            .map(|idx| &self.changes[idx])
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Changed keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &Bytes> {
        self.changes.iter().map(|change| &change.key)
    }

    /// Number of keys set to a value.
    pub fn puts(&self) -> usize {
        self.changes.iter().filter(|c| !c.is_deletion()).count()
    }

    /// Number of keys removed.
    pub fn deletions(&self) -> usize {
        self.changes.iter().filter(|c| c.is_deletion()).count()
    }
}

impl IntoIterator for ChangeSet {
    type Item = EntryChange;
    type IntoIter = std::vec::IntoIter<EntryChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a EntryChange;
    type IntoIter = std::slice::Iter<'a, EntryChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// Compute the changes that turn `old` into `new`.
///
/// Both maps are walked once in key order, so the result is sorted and the
/// cost is linear in the size of the two maps. Keys only in `new` and keys
/// whose value differs become puts; keys only in `old` become deletions.
pub fn diff_entries(old: &EntryMap, new: &EntryMap) -> ChangeSet {
    let mut changes = Vec::new();
    let mut old_iter = old.iter().peekable();
    let mut new_iter = new.iter().peekable();

    loop {
        let order = match (old_iter.peek(), new_iter.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((old_key, _)), Some((new_key, _))) => old_key.cmp(new_key),
        };
        match order {
            Ordering::Less => {
                if let Some((key, _)) = old_iter.next() {
                    changes.push(EntryChange::delete(key.clone()));
                }
            }
            Ordering::Greater => {
                if let Some((key, value)) = new_iter.next() {
                    changes.push(EntryChange::put(key.clone(), value.clone()));
                }
            }
            Ordering::Equal => {
                if let (Some((_, old_value)), Some((key, new_value))) =
                    (old_iter.next(), new_iter.next())
                {
                    if old_value != new_value {
                        changes.push(EntryChange::put(key.clone(), new_value.clone()));
                    }
                }
            }
        }
    }

    ChangeSet { changes }
}

/// Apply `changes` on top of `base`, returning the resulting state.
pub fn apply_changes<'a>(
    base: &EntryMap,
    changes: impl IntoIterator<Item = &'a EntryChange>,
) -> EntryMap {
    let mut state = base.clone();
    for change in changes {
        match &change.value {
            Some(value) => {
                state.insert(change.key.clone(), value.clone());
            }
            None => {
                state.remove(&change.key);
            }
        }
    }
    state
}
