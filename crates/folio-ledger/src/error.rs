use bytes::Bytes;
use folio_dag::DagError;
use folio_snapshot::SnapshotError;
use folio_store::StoreError;
use folio_types::{ObjectId, PageId, Status};

/// Errors returned by ledger, page and snapshot operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("page not found: {0}")]
    PageNotFound(PageId),

    #[error("key not found: {}", hex::encode(.0))]
    KeyNotFound(Bytes),

    #[error("reference not found: {0}")]
    ReferenceNotFound(ObjectId),

    #[error("a transaction is already in progress")]
    TransactionAlreadyInProgress,

    #[error("no transaction in progress")]
    NoTransactionInProgress,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object store error: {0}")]
    Store(StoreError),

    #[error("commit store error: {0}")]
    Dag(#[from] DagError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LedgerError {
    /// The status reported for this error.
    pub fn status(&self) -> Status {
        match self {
            Self::Authentication(_) => Status::AuthenticationError,
            Self::PageNotFound(_) => Status::PageNotFound,
            Self::KeyNotFound(_) => Status::KeyNotFound,
            Self::ReferenceNotFound(_) => Status::ReferenceNotFound,
            Self::TransactionAlreadyInProgress => Status::TransactionAlreadyInProgress,
            Self::NoTransactionInProgress => Status::NoTransactionInProgress,
            Self::Io(_) | Self::Dag(DagError::Io(_)) => Status::IoError,
            Self::Store(err) => match err {
                StoreError::Io(_) | StoreError::SizeMismatch { .. } => Status::IoError,
                _ => Status::UnknownError,
            },
            Self::Dag(_) | Self::Config(_) => Status::UnknownError,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::ReferenceNotFound(id),
            other => Self::Store(other),
        }
    }
}

impl From<SnapshotError> for LedgerError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::KeyNotFound(key) => Self::KeyNotFound(key),
            SnapshotError::ReferenceNotFound(id) => Self::ReferenceNotFound(id),
            SnapshotError::Store(err) => err.into(),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Collapse a ledger result into the status vocabulary.
pub trait StatusExt {
    fn status(&self) -> Status;
}

impl<T> StatusExt for LedgerResult<T> {
    fn status(&self) -> Status {
        match self {
            Ok(_) => Status::Ok,
            Err(err) => err.status(),
        }
    }
}
