//! Error types for the merge engine.

use bytes::Bytes;
use folio_dag::DagError;
use folio_diff::DiffError;

use crate::resolver::ResolverError;

/// Reasons a merge attempt fails. A failed merge never changes the page:
/// its heads simply stay divergent.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A custom resolution left out a key changed by one of the heads.
    #[error("resolution does not cover changed key {}", hex::encode(.missing))]
    IncompleteResolution { missing: Bytes },

    /// A custom resolution listed the same key twice.
    #[error("invalid resolution: {0}")]
    InvalidResolution(#[from] DiffError),

    /// The external resolver failed or went away.
    #[error("resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Appending the merge commit failed.
    #[error("commit store error: {0}")]
    Dag(#[from] DagError),
}

/// Convenience alias for merge results.
pub type MergeResult<T> = Result<T, MergeError>;
