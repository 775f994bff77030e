//! Content-addressed object storage for Folio.
//!
//! Values too large to inline in a commit are written here once and then
//! referenced by id from any number of commits and pages. Every object is
//! identified by the domain-separated BLAKE3 hash of its bytes.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- one file per object under a fan-out directory
//!
//! [`ReferenceStore`] sits on top of a backend and implements the reference
//! contract: size-validated creation from a byte stream, whole and partial
//! reads, and reference counting for garbage collection.
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Write-then-link: write object, verify hash, then hand out the id.
//! 3. Concurrent reads are always safe (objects are immutable).
//! 4. The store never interprets object contents.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod memory;
pub mod object;
pub mod range;
pub mod references;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{ObjectReader, ObjectValue, StoredObject};
pub use range::{resolve_range, slice_range};
pub use references::{ReferenceStore, DEFAULT_INLINE_READ_LIMIT};
pub use traits::ObjectStore;
