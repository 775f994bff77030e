//! Content hashing for Folio.
//!
//! Every identifier in Folio is a domain-separated BLAKE3 hash. Objects and
//! commits hash under different domains so that a blob whose bytes happen to
//! equal a commit encoding never shares its id.

pub mod hasher;

pub use hasher::{ContentHasher, HasherError};
