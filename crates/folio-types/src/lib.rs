//! Foundation types for Folio.
//!
//! This crate provides the identifiers, value model, and status vocabulary
//! shared by every other Folio crate.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content-addressed identifier (BLAKE3 hash) for commits and references
//! - [`PageId`]: 16-byte page identifier; the all-zero id is the root page
//! - [`Timestamp`]: Client-supplied microseconds since the UNIX epoch
//! - [`Value`] / [`Priority`]: Inline bytes or a reference with sync priority
//! - [`Entry`] / [`EntryChange`] / [`EntryMap`]: Page contents and changes
//! - [`Status`]: The status taxonomy returned by every ledger operation

pub mod error;
pub mod object;
pub mod page;
pub mod status;
pub mod temporal;
pub mod value;

pub use error::TypeError;
pub use object::{CommitId, ObjectId};
pub use page::PageId;
pub use status::Status;
pub use temporal::Timestamp;
pub use value::{Entry, EntryChange, EntryMap, Priority, Value};
