use bytes::Bytes;
use folio_store::StoreError;
use folio_types::ObjectId;

/// Errors from snapshot queries.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("key not found: {}", hex::encode(.0))]
    KeyNotFound(Bytes),

    /// The entry points to an object the store does not hold.
    #[error("reference not found: {0}")]
    ReferenceNotFound(ObjectId),

    #[error("object store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for SnapshotError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::ReferenceNotFound(id),
            other => Self::Store(other),
        }
    }
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;
