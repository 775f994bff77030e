//! Staged mutations and the per-page transaction state machine.

use std::sync::Arc;

use bytes::Bytes;
use folio_dag::Commit;
use folio_types::{EntryMap, ObjectId, Value};

/// One mutation waiting to be committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StagedOp {
    Put(Bytes, Value),
    Delete(Bytes),
}

impl StagedOp {
    pub fn key(&self) -> &Bytes {
        match self {
            Self::Put(key, _) | Self::Delete(key) => key,
        }
    }

    /// Object the operation points to, if any.
    pub fn reference(&self) -> Option<ObjectId> {
        match self {
            Self::Put(_, value) => value.reference_id(),
            Self::Delete(_) => None,
        }
    }
}

/// Apply `ops` in order on top of `base`. Later operations on the same key
/// override earlier ones.
///
/// Returns a full copy of the state; see [`Commit`] for how states are kept.
pub fn apply_ops(base: &EntryMap, ops: &[StagedOp]) -> EntryMap {
    let mut state = base.clone();
    for op in ops {
        match op {
            StagedOp::Put(key, value) => {
                state.insert(key.clone(), value.clone());
            }
            StagedOp::Delete(key) => {
                state.remove(key);
            }
        }
    }
    state
}

/// Explicit transaction state of a page.
#[derive(Debug, Default)]
pub enum TransactionState {
    #[default]
    Idle,
    Active {
        /// Head the transaction was started from.
        base: Arc<Commit>,
        ops: Vec<StagedOp>,
    },
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}
