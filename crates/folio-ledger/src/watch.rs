//! Per-page change notification.

use std::sync::Arc;

use folio_dag::Commit;
use folio_diff::{diff_entries, ChangeSet};
use folio_snapshot::Snapshot;
use folio_types::{CommitId, Timestamp};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// A change to a page's visible state.
#[derive(Clone, Debug)]
pub struct PageChange {
    pub timestamp: Timestamp,
    /// The commit whose state this change leads to.
    pub commit: CommitId,
    /// Sorted changes relative to the previously delivered state.
    pub changes: ChangeSet,
}

/// Event delivered to a watcher.
#[derive(Clone, Debug)]
pub enum WatchEvent {
    /// The page state at registration time. Always the first event.
    InitialState(Snapshot),
    Change(PageChange),
}

/// Receiving end of a watch registration. Dropping it unregisters the
/// watcher on the next delivery.
pub type WatchStream = mpsc::Receiver<WatchEvent>;

/// Fans page changes out to registered watchers.
///
/// The dispatcher keeps a cursor on the last state it announced. Each
/// notification diffs the cursor against the new preferred head, so a
/// watcher sees every commit that advanced the head, in the order the
/// commits landed, and a merge arrives as a single change once both of its
/// parents have been announced.
pub struct WatchDispatcher {
    watchers: Vec<mpsc::Sender<WatchEvent>>,
    cursor: Arc<Commit>,
    capacity: usize,
}

impl WatchDispatcher {
    pub fn new(head: Arc<Commit>, capacity: usize) -> Self {
        Self {
            watchers: Vec::new(),
            cursor: head,
            capacity,
        }
    }

    /// Register a watcher, delivering `initial` as its first event.
    pub fn register(&mut self, initial: Snapshot) -> WatchStream {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.notify(initial.commit());
        if tx.try_send(WatchEvent::InitialState(initial)).is_ok() {
            self.watchers.push(tx);
        }
        rx
    }

    /// Announce that the page head is now `head`.
    pub fn notify(&mut self, head: &Arc<Commit>) {
        if head.id() == self.cursor.id() {
            return;
        }
        let changes = diff_entries(self.cursor.entries(), head.entries());
        self.cursor = Arc::clone(head);
        if changes.is_empty() || self.watchers.is_empty() {
            return;
        }

        let event = WatchEvent::Change(PageChange {
            timestamp: head.timestamp(),
            commit: head.id(),
            changes,
        });
        self.watchers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(commit = %head.id().short_hex(), "watcher queue full, dropping watcher");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("watcher disconnected");
                false
            }
        });
    }

    /// Number of live registrations.
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Drop every registration; receivers see the stream end.
    pub fn clear(&mut self) {
        self.watchers.clear();
    }
}

impl std::fmt::Debug for WatchDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchDispatcher")
            .field("watchers", &self.watchers.len())
            .field("cursor", &self.cursor.id())
            .finish()
    }
}
