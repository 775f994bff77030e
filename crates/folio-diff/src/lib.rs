//! Diffs between page states.
//!
//! A commit stores the full state of its page; watchers and the merge engine
//! work on the difference between two such states. This crate computes that
//! difference as a sorted [`ChangeSet`] of [`EntryChange`]s and applies
//! change sets back onto a state.
//!
//! [`EntryChange`]: folio_types::EntryChange

pub mod change_set;
pub mod error;

pub use change_set::{apply_changes, diff_entries, ChangeSet};
pub use error::{DiffError, DiffResult};
