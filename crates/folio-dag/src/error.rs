//! Error types for the commit DAG.

use folio_crypto::HasherError;
use folio_types::CommitId;

/// Errors that can occur during commit store operations.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// A referenced commit was not found in the store.
    #[error("commit not found: {0:?}")]
    CommitNotFound(CommitId),

    /// A parent reference points to a commit that does not exist.
    #[error("dangling parent reference: commit {commit:?} references missing parent {parent:?}")]
    DanglingParent {
        /// The commit containing the bad reference.
        commit: CommitId,
        /// The missing parent.
        parent: CommitId,
    },

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Commit log I/O error.
    #[error("commit log I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<HasherError> for DagError {
    fn from(err: HasherError) -> Self {
        match err {
            HasherError::Serialization(msg) => Self::Serialization(msg),
        }
    }
}

/// Convenience alias for DAG results.
pub type DagResult<T> = Result<T, DagError>;
