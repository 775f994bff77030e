//! Commit DAG for Folio pages.
//!
//! Every page owns a [`CommitStore`]: an append-only, content-addressed arena
//! of [`Commit`]s. Each commit carries the full page state and the ids of its
//! parents, so the history forms a Merkle DAG in which identical content
//! always yields the same id.
//!
//! # Operations
//!
//! - [`CommitStore::append`] -- the only write path (transactions, merges, ingest)
//! - [`CommitStore::heads`] -- commits without children; more than one means divergence
//! - [`CommitStore::common_ancestor`] -- generation-ordered walk of two histories
//! - [`CommitStore::topological_order`] -- deterministic parent-before-child order
//! - [`CommitStore::prune`] -- generation-based history retention
//!
//! Stores may be backed by a [`CommitLog`] so a page's history survives
//! restarts.

pub mod commit;
pub mod error;
pub mod log;
pub mod store;

pub use commit::{Commit, CommitRecord};
pub use error::{DagError, DagResult};
pub use log::CommitLog;
pub use store::{Append, CommitStore};
