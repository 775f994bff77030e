//! Contracts for externally supplied conflict resolution.

use std::sync::Arc;

use folio_diff::ChangeSet;
use folio_snapshot::Snapshot;
use folio_types::{EntryChange, PageId};

use crate::policy::MergePolicy;

/// Resolves the conflicts between two divergent heads of one page.
///
/// `change1` and `change2` are the changes each head made relative to the
/// common ancestor, which is `None` when the shared history is no longer
/// available. The returned changes must mention every key present in either
/// change set and may touch any other key.
pub trait ConflictResolver: Send + Sync {
    fn resolve(
        &self,
        change1: &ChangeSet,
        change2: &ChangeSet,
        common_ancestor: Option<&Snapshot>,
    ) -> Result<Vec<EntryChange>, ResolverError>;
}

/// Per-ledger source of merge policies and resolvers.
pub trait ConflictResolverFactory: Send + Sync {
    /// The policy for a page.
    fn get_policy(&self, page: &PageId) -> MergePolicy;

    /// A resolver for a page whose policy is [`MergePolicy::Custom`].
    /// `None` means no resolver is available right now.
    fn new_conflict_resolver(&self, page: &PageId) -> Option<Arc<dyn ConflictResolver>>;
}

/// Failures reported by a resolver.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolverError {
    /// The client behind the resolver is gone.
    #[error("conflict resolver disconnected")]
    Disconnected,

    #[error("conflict resolver rejected the merge: {0}")]
    Rejected(String),
}
