//! The Folio ledger: per-user collections of versioned key-value pages.
//!
//! A [`Ledger`] owns a set of [`Page`]s and one reference store shared by
//! all of them. Each page keeps a commit DAG; clients mutate it through
//! transactions (or implicit, batched auto-commits), read it through
//! immutable snapshots and follow it with watchers. Commits ingested from
//! other devices can leave a page with several heads, which are merged
//! under the ledger's conflict resolution policy.
//!
//! # Example
//!
//! ```
//! use folio_ledger::{Ledger, LedgerConfig};
//!
//! let ledger = Ledger::open(LedgerConfig::default()).unwrap();
//! let page = ledger.new_page().unwrap();
//!
//! page.start_transaction().unwrap();
//! page.put("greeting", "hello").unwrap();
//! page.commit().unwrap();
//!
//! let snapshot = page.get_snapshot().unwrap();
//! assert_eq!(snapshot.get_keys(None).len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod ledger;
pub mod page;
pub mod resolution;
pub mod transaction;
pub mod watch;

pub use config::{LedgerConfig, StorageConfig};
pub use error::{LedgerError, LedgerResult, StatusExt};
pub use factory::{LedgerFactory, UserIdentity};
pub use ledger::Ledger;
pub use page::Page;
pub use watch::{PageChange, WatchEvent, WatchStream};

// Re-export the types clients handle directly.
pub use folio_dag::Commit;
pub use folio_diff::ChangeSet;
pub use folio_merge::{ConflictResolver, ConflictResolverFactory, MergePolicy, ResolverError};
pub use folio_snapshot::Snapshot;
pub use folio_store::ObjectValue;
pub use folio_types::{
    CommitId, Entry, EntryChange, EntryMap, ObjectId, PageId, Priority, Status, Timestamp, Value,
};
