use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::object::ObjectId;

/// Full state of a page at one version: keys in raw byte order.
pub type EntryMap = BTreeMap<Bytes, Value>;

/// Sync urgency of a referenced value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Downloaded together with the commit that references it.
    #[default]
    Eager,
    /// Fetched on demand; may be transiently unavailable.
    Lazy,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eager => write!(f, "eager"),
            Self::Lazy => write!(f, "lazy"),
        }
    }
}

/// The value stored under a key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Bytes stored directly in the commit.
    Inline(Bytes),
    /// Content held in the object store.
    Reference { id: ObjectId, priority: Priority },
}

impl Value {
    /// Inline value from anything convertible to [`Bytes`].
    pub fn inline(data: impl Into<Bytes>) -> Self {
        Self::Inline(data.into())
    }

    /// Reference value.
    pub fn reference(id: ObjectId, priority: Priority) -> Self {
        Self::Reference { id, priority }
    }

    /// The object this value points to, if it is a reference.
    pub fn reference_id(&self) -> Option<ObjectId> {
        match self {
            Self::Reference { id, .. } => Some(*id),
            Self::Inline(_) => None,
        }
    }

    /// Sync priority. Inline values travel with their commit, i.e. eagerly.
    pub fn priority(&self) -> Priority {
        match self {
            Self::Reference { priority, .. } => *priority,
            Self::Inline(_) => Priority::Eager,
        }
    }
}

/// A key and the value stored under it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: Bytes,
    pub value: Value,
}

impl Entry {
    pub fn new(key: impl Into<Bytes>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// The new state of one key: a value, or `None` for a deletion.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryChange {
    pub key: Bytes,
    pub value: Option<Value>,
}

impl EntryChange {
    /// A change that sets `key` to `value`.
    pub fn put(key: impl Into<Bytes>, value: Value) -> Self {
        Self {
            key: key.into(),
            value: Some(value),
        }
    }

    /// A change that removes `key`.
    pub fn delete(key: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Returns `true` if this change removes its key.
    pub fn is_deletion(&self) -> bool {
        self.value.is_none()
    }
}
