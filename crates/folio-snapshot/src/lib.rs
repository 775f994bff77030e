//! Read-only, point-in-time views of a page.
//!
//! A [`Snapshot`] wraps one commit. Because commits never change after they
//! are created, a snapshot needs no locking and is unaffected by writers
//! advancing the page head after it was taken.

pub mod error;
pub mod snapshot;

pub use error::{SnapshotError, SnapshotResult};
pub use snapshot::Snapshot;
