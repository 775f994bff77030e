use std::fmt;

use serde::{Deserialize, Serialize};

/// Status taxonomy shared by every ledger operation.
///
/// Operations return `Result`s; each error maps onto exactly one non-`Ok`
/// status so callers speaking the status vocabulary never have to inspect
/// error internals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    AuthenticationError,
    PageNotFound,
    KeyNotFound,
    ReferenceNotFound,
    /// Storage-layer failure; possibly transient, the caller may retry.
    IoError,
    TransactionAlreadyInProgress,
    NoTransactionInProgress,
    UnknownError,
}

impl Status {
    /// Returns `true` for [`Status::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns `true` if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::IoError)
    }

    /// The canonical upper-case name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::AuthenticationError => "AUTHENTICATION_ERROR",
            Self::PageNotFound => "PAGE_NOT_FOUND",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::ReferenceNotFound => "REFERENCE_NOT_FOUND",
            Self::IoError => "IO_ERROR",
            Self::TransactionAlreadyInProgress => "TRANSACTION_ALREADY_IN_PROGRESS",
            Self::NoTransactionInProgress => "NO_TRANSACTION_IN_PROGRESS",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ok_is_ok() {
        assert!(Status::Ok.is_ok());
        assert!(!Status::KeyNotFound.is_ok());
    }

    #[test]
    fn only_io_error_is_transient() {
        assert!(Status::IoError.is_transient());
        assert!(!Status::UnknownError.is_transient());
    }

    #[test]
    fn display_matches_serde_name() {
        let status = Status::TransactionAlreadyInProgress;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, format!("\"{status}\""));
    }
}
