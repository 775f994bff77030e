//! Commit nodes of a page's version history.

use std::sync::Arc;

use folio_crypto::ContentHasher;
use folio_types::{CommitId, EntryMap, ObjectId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::DagResult;

/// An immutable version of a page.
///
/// A commit holds the *full* page state at its version, not a delta. The
/// entry map is shared behind an `Arc`, so every reader of one version
/// aliases the same state. Different versions share nothing: a commit copies
/// its parent's map, and the commit log stores each state whole. Sharing
/// unchanged subtrees between versions is not implemented yet.
///
/// The id is the `folio-commit-v1` hash of `(parents, timestamp, entries)`.
/// The generation is derived data (one more than the highest parent) and is
/// not part of the identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    id: CommitId,
    parents: Vec<CommitId>,
    timestamp: Timestamp,
    generation: u64,
    entries: Arc<EntryMap>,
}

/// The hashed portion of a commit.
#[derive(Serialize)]
struct CommitContent<'a> {
    parents: &'a [CommitId],
    timestamp: Timestamp,
    entries: &'a EntryMap,
}

impl Commit {
    /// Build a commit, computing its content id.
    ///
    /// Parents are sorted and deduplicated first so that the same logical
    /// commit always hashes to the same id regardless of parent order.
    pub(crate) fn build(
        mut parents: Vec<CommitId>,
        timestamp: Timestamp,
        generation: u64,
        entries: Arc<EntryMap>,
    ) -> DagResult<Self> {
        parents.sort();
        parents.dedup();
        let id = Self::compute_id(&parents, timestamp, &entries)?;
        Ok(Self {
            id,
            parents,
            timestamp,
            generation,
            entries,
        })
    }

    /// The deterministic first commit of every page.
    pub fn root() -> DagResult<Self> {
        Self::build(Vec::new(), Timestamp::ZERO, 0, Arc::new(EntryMap::new()))
    }

    /// Content id of a commit with the given (already canonical) content.
    pub fn compute_id(
        parents: &[CommitId],
        timestamp: Timestamp,
        entries: &EntryMap,
    ) -> DagResult<CommitId> {
        let content = CommitContent {
            parents,
            timestamp,
            entries,
        };
        Ok(ContentHasher::COMMIT.hash_encoded(&content)?)
    }

    pub fn id(&self) -> CommitId {
        self.id
    }

    /// Parent ids in ascending order.
    pub fn parents(&self) -> &[CommitId] {
        &self.parents
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Distance from the page root along the longest parent chain.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The full page state at this commit.
    pub fn entries(&self) -> &Arc<EntryMap> {
        &self.entries
    }

    /// Returns `true` for a commit without parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Returns `true` for a commit with two or more parents.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Ids of every object referenced by this commit's entries, one per entry.
    pub fn referenced_objects(&self) -> Vec<ObjectId> {
        self.entries
            .values()
            .filter_map(|value| value.reference_id())
            .collect()
    }

    /// Key used wherever a deterministic total order over commits is needed:
    /// timestamp first, commit id as the tie-break.
    pub fn order_key(&self) -> (Timestamp, CommitId) {
        (self.timestamp, self.id)
    }

    /// Returns a human-readable summary of this commit.
    pub fn summary(&self) -> String {
        format!(
            "{} gen={} parents={} keys={} ts={}",
            self.id.short_hex(),
            self.generation,
            self.parents.len(),
            self.entries.len(),
            self.timestamp,
        )
    }
}

/// Borrowed on-disk form of a commit, written to the commit log.
#[derive(Serialize)]
pub(crate) struct CommitRecordRef<'a> {
    pub parents: &'a [CommitId],
    pub timestamp: Timestamp,
    pub generation: u64,
    pub entries: &'a EntryMap,
}

impl<'a> From<&'a Commit> for CommitRecordRef<'a> {
    fn from(commit: &'a Commit) -> Self {
        Self {
            parents: &commit.parents,
            timestamp: commit.timestamp,
            generation: commit.generation,
            entries: &commit.entries,
        }
    }
}

/// Owned on-disk form of a commit, read back from the commit log.
///
/// Encodes identically to [`CommitRecordRef`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CommitRecord {
    pub parents: Vec<CommitId>,
    pub timestamp: Timestamp,
    pub generation: u64,
    pub entries: EntryMap,
}

impl CommitRecord {
    /// Rebuild the commit, recomputing its id from content.
    pub fn into_commit(self) -> DagResult<Commit> {
        Commit::build(
            self.parents,
            self.timestamp,
            self.generation,
            Arc::new(self.entries),
        )
    }
}
