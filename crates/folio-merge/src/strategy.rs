//! Merge strategies: how two change sets become one.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use folio_dag::Commit;
use folio_diff::ChangeSet;
use folio_snapshot::Snapshot;
use folio_types::{CommitId, EntryChange, Timestamp};

use crate::error::{MergeError, MergeResult};
use crate::resolver::ConflictResolver;

/// `(timestamp, id)` of a commit, as returned by [`Commit::order_key`].
pub type OrderKey = (Timestamp, CommitId);

/// Which commit wrote each value of a head.
///
/// A plain head wrote every value itself. A merge commit built while folding
/// several heads keeps, per key, the writer of the value it took over.
#[derive(Clone, Debug)]
pub struct Origins {
    base: OrderKey,
    keys: HashMap<Bytes, OrderKey>,
}

impl Origins {
    /// Origins of a commit that wrote all of its values.
    pub fn of(commit: &Commit) -> Self {
        Self {
            base: commit.order_key(),
            keys: HashMap::new(),
        }
    }

    /// Order key of the commit that wrote `key`.
    pub fn writer(&self, key: &[u8]) -> OrderKey {
        self.keys.get(key).copied().unwrap_or(self.base)
    }

    pub fn set(&mut self, key: Bytes, writer: OrderKey) {
        self.keys.insert(key, writer);
    }
}

/// One head taking part in a merge, with its changes relative to the
/// common ancestor.
#[derive(Clone, Copy, Debug)]
pub struct MergeSide<'a> {
    pub commit: &'a Commit,
    pub changes: &'a ChangeSet,
    /// Per-key writers; `None` when `commit` wrote every value itself.
    pub origins: Option<&'a Origins>,
}

impl<'a> MergeSide<'a> {
    pub fn new(commit: &'a Commit, changes: &'a ChangeSet) -> Self {
        Self {
            commit,
            changes,
            origins: None,
        }
    }

    pub fn with_origins(mut self, origins: &'a Origins) -> Self {
        self.origins = Some(origins);
        self
    }

    /// Order key of the commit that wrote this side's value of `key`.
    pub fn writer(&self, key: &[u8]) -> OrderKey {
        self.origins
            .map_or_else(|| self.commit.order_key(), |origins| origins.writer(key))
    }
}

/// Turns the changes of two heads into the changes of their merge commit.
///
/// The result must contain an entry for every key changed by either side.
pub trait MergeStrategy: Send + Sync {
    fn merge(
        &self,
        left: MergeSide<'_>,
        right: MergeSide<'_>,
        common_ancestor: Option<&Snapshot>,
    ) -> MergeResult<ChangeSet>;
}

/// Built-in strategy: keep every non-conflicting change; for a conflicting
/// key take the value written by the commit with the larger timestamp,
/// falling back to the larger commit id when the timestamps are equal.
#[derive(Clone, Copy, Debug, Default)]
pub struct LastOneWins;

impl MergeStrategy for LastOneWins {
    fn merge(
        &self,
        left: MergeSide<'_>,
        right: MergeSide<'_>,
        _common_ancestor: Option<&Snapshot>,
    ) -> MergeResult<ChangeSet> {
        let mut merged = Vec::with_capacity(left.changes.len() + right.changes.len());
        let mut lefts = left.changes.iter().peekable();
        let mut rights = right.changes.iter().peekable();

        loop {
            let order = match (lefts.peek(), rights.peek()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(l), Some(r)) => l.key.cmp(&r.key),
            };
            let change: Option<&EntryChange> = match order {
                Ordering::Less => lefts.next(),
                Ordering::Greater => rights.next(),
                Ordering::Equal => lefts.next().zip(rights.next()).map(|(l, r)| {
                    if right.writer(&r.key) > left.writer(&l.key) {
                        r
                    } else {
                        l
                    }
                }),
            };
            if let Some(change) = change {
                merged.push(change.clone());
            }
        }

        Ok(ChangeSet::from_changes(merged)?)
    }
}

/// Adapter that forwards merges to an external [`ConflictResolver`] and
/// checks that its answer covers every changed key.
#[derive(Clone)]
pub struct CustomStrategy {
    resolver: Arc<dyn ConflictResolver>,
}

impl CustomStrategy {
    pub fn new(resolver: Arc<dyn ConflictResolver>) -> Self {
        Self { resolver }
    }
}

impl MergeStrategy for CustomStrategy {
    fn merge(
        &self,
        left: MergeSide<'_>,
        right: MergeSide<'_>,
        common_ancestor: Option<&Snapshot>,
    ) -> MergeResult<ChangeSet> {
        let changes = self
            .resolver
            .resolve(left.changes, right.changes, common_ancestor)?;
        let resolved = ChangeSet::from_changes(changes)?;

        if let Some(missing) = left
            .changes
            .keys()
            .chain(right.changes.keys())
            .find(|key| !resolved.contains_key(key))
        {
            return Err(MergeError::IncompleteResolution {
                missing: missing.clone(),
            });
        }
        Ok(resolved)
    }
}

impl std::fmt::Debug for CustomStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomStrategy").finish_non_exhaustive()
    }
}
