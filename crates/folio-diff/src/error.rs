//! Error types for change sets.

use bytes::Bytes;

/// Errors that can occur while building a change set.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DiffError {
    /// The same key appears more than once in a list of changes.
    #[error("duplicate change for key {}", hex::encode(.0))]
    DuplicateKey(Bytes),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
