use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use folio_dag::{Append, Commit, CommitStore};
use folio_merge::MergeEngine;
use folio_snapshot::Snapshot;
use folio_store::{ObjectValue, ReferenceStore};
use folio_types::{CommitId, EntryMap, ObjectId, PageId, Priority, Timestamp, Value};
use tracing::{debug, warn};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::resolution::ConflictResolution;
use crate::transaction::{apply_ops, StagedOp, TransactionState};
use crate::watch::{WatchDispatcher, WatchStream};

struct PageInner {
    commits: CommitStore,
    transaction: TransactionState,
    /// Implicit mutations not yet committed.
    pending: Vec<StagedOp>,
    watchers: WatchDispatcher,
    deleted: bool,
}

/// An independently versioned key-value namespace.
///
/// All mutations, merges and watcher registrations of a page go through one
/// lock; reads work on immutable [`Snapshot`]s and take it only to pick the
/// current head.
pub struct Page {
    id: PageId,
    objects: Arc<ReferenceStore>,
    resolution: Arc<ConflictResolution>,
    config: Arc<LedgerConfig>,
    engine: MergeEngine,
    inner: Mutex<PageInner>,
}

impl Page {
    /// Wrap a loaded commit store.
    ///
    /// Every commit already in the store takes a reference on the objects it
    /// points to. Divergent heads left from an earlier run are merged.
    pub(crate) fn new(
        id: PageId,
        commits: CommitStore,
        objects: Arc<ReferenceStore>,
        resolution: Arc<ConflictResolution>,
        config: Arc<LedgerConfig>,
    ) -> LedgerResult<Self> {
        for commit in commits.commits() {
            objects.retain(commit.referenced_objects());
        }
        let head = commits.preferred_head().ok_or(LedgerError::PageNotFound(id))?;
        let inner = PageInner {
            commits,
            transaction: TransactionState::Idle,
            pending: Vec::new(),
            watchers: WatchDispatcher::new(head, config.watcher_channel_capacity),
            deleted: false,
        };
        let page = Self {
            id,
            engine: MergeEngine::new(Arc::clone(&objects)),
            objects,
            resolution,
            config,
            inner: Mutex::new(inner),
        };
        page.merge_heads()?;
        Ok(page)
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, PageInner>> {
        let inner = self.inner.lock().expect("page lock poisoned");
        if inner.deleted {
            return Err(LedgerError::PageNotFound(self.id));
        }
        Ok(inner)
    }

    // ---- Mutations ----

    /// Store `value` inline under `key`.
    pub fn put(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> LedgerResult<()> {
        self.stage(StagedOp::Put(key.into(), Value::inline(value)))
    }

    /// Store `value` in the object store and reference it from `key`.
    pub fn put_with_priority(
        &self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        priority: Priority,
    ) -> LedgerResult<()> {
        drop(self.lock()?);
        let id = self.objects.put_pinned(value)?;
        self.stage(StagedOp::Put(key.into(), Value::reference(id, priority)))
    }

    /// Point `key` at an existing object.
    pub fn put_reference(
        &self,
        key: impl Into<Bytes>,
        reference: ObjectId,
        priority: Priority,
    ) -> LedgerResult<()> {
        if !self.objects.pin_existing(&reference)? {
            return Err(LedgerError::ReferenceNotFound(reference));
        }
        self.stage(StagedOp::Put(key.into(), Value::reference(reference, priority)))
    }

    pub fn delete(&self, key: impl Into<Bytes>) -> LedgerResult<()> {
        self.stage(StagedOp::Delete(key.into()))
    }

    /// Stage `op` in the active transaction, or as an implicit mutation.
    ///
    /// Implicit mutations are batched; the batch is committed once it holds
    /// `auto_commit_batch_size` operations or when anything observes the
    /// page. If that commit fails the operation is unstaged and the error
    /// returned, so success is only reported for mutations that will land.
    ///
    /// A referenced object arrives pinned; the pin is dropped once the
    /// operation is committed or discarded.
    fn stage(&self, op: StagedOp) -> LedgerResult<()> {
        let mut inner = match self.lock() {
            Ok(inner) => inner,
            Err(e) => {
                self.unpin(std::slice::from_ref(&op));
                return Err(e);
            }
        };
        if let TransactionState::Active { ops, .. } = &mut inner.transaction {
            ops.push(op);
            return Ok(());
        }

        inner.pending.push(op);
        if inner.pending.len() >= self.config.auto_commit_batch_size {
            if let Err(e) = self.flush_locked(&mut inner) {
                if let Some(op) = inner.pending.pop() {
                    self.unpin(std::slice::from_ref(&op));
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Commit pending implicit mutations.
    pub fn flush(&self) -> LedgerResult<()> {
        let mut inner = self.lock()?;
        self.flush_locked(&mut inner)
    }

    fn flush_locked(&self, inner: &mut PageInner) -> LedgerResult<()> {
        if inner.pending.is_empty() {
            return Ok(());
        }
        let base = self.head(inner)?;
        let entries = apply_ops(base.entries(), &inner.pending);
        self.commit_entries(inner, &base, entries)?;
        let flushed = std::mem::take(&mut inner.pending);
        self.unpin(&flushed);
        self.try_merge(inner);
        Ok(())
    }

    // ---- References ----

    /// Create an object from `data`. A non-negative `expected_size` must
    /// match the number of bytes read.
    pub fn create_reference<R: Read>(&self, expected_size: i64, data: R) -> LedgerResult<ObjectId> {
        drop(self.lock()?);
        Ok(self.objects.put(expected_size, data)?)
    }

    pub fn get_reference(&self, reference: &ObjectId) -> LedgerResult<ObjectValue> {
        drop(self.lock()?);
        Ok(self.objects.get(reference)?)
    }

    pub fn get_partial_reference(
        &self,
        reference: &ObjectId,
        offset: i64,
        max_size: i64,
    ) -> LedgerResult<Bytes> {
        drop(self.lock()?);
        Ok(self.objects.get_partial(reference, offset, max_size)?)
    }

    // ---- Transactions ----

    pub fn start_transaction(&self) -> LedgerResult<()> {
        let mut inner = self.lock()?;
        if inner.transaction.is_active() {
            return Err(LedgerError::TransactionAlreadyInProgress);
        }
        self.flush_locked(&mut inner)?;
        let base = self.head(&inner)?;
        debug!(page = %self.id, base = %base.id().short_hex(), "transaction started");
        inner.transaction = TransactionState::Active {
            base,
            ops: Vec::new(),
        };
        Ok(())
    }

    /// Commit the active transaction.
    ///
    /// On failure the transaction stays active so it can be retried or
    /// rolled back.
    pub fn commit(&self) -> LedgerResult<()> {
        let mut inner = self.lock()?;
        let TransactionState::Active { base, ops } = &inner.transaction else {
            return Err(LedgerError::NoTransactionInProgress);
        };
        let base = Arc::clone(base);
        let entries = apply_ops(base.entries(), ops);

        self.commit_entries(&mut inner, &base, entries)?;
        if let TransactionState::Active { ops, .. } = std::mem::take(&mut inner.transaction) {
            self.unpin(&ops);
        }
        self.try_merge(&mut inner);
        Ok(())
    }

    pub fn rollback(&self) -> LedgerResult<()> {
        let mut inner = self.lock()?;
        match std::mem::take(&mut inner.transaction) {
            TransactionState::Idle => Err(LedgerError::NoTransactionInProgress),
            TransactionState::Active { ops, .. } => {
                debug!(page = %self.id, discarded = ops.len(), "transaction rolled back");
                self.unpin(&ops);
                self.try_merge(&mut inner);
                Ok(())
            }
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.inner
            .lock()
            .expect("page lock poisoned")
            .transaction
            .is_active()
    }

    // ---- Reads ----

    /// A snapshot of the current state.
    pub fn get_snapshot(&self) -> LedgerResult<Snapshot> {
        let mut inner = self.lock()?;
        self.flush_locked(&mut inner)?;
        Ok(Snapshot::new(self.head(&inner)?, Arc::clone(&self.objects)))
    }

    /// Register a watcher. The stream starts with the current state.
    pub fn watch(&self) -> LedgerResult<WatchStream> {
        let mut inner = self.lock()?;
        self.flush_locked(&mut inner)?;
        let snapshot = Snapshot::new(self.head(&inner)?, Arc::clone(&self.objects));
        Ok(inner.watchers.register(snapshot))
    }

    /// Current heads, ascending by `(timestamp, id)`.
    pub fn heads(&self) -> LedgerResult<Vec<Arc<Commit>>> {
        let mut inner = self.lock()?;
        self.flush_locked(&mut inner)?;
        Ok(inner.commits.heads())
    }

    pub fn get_commit(&self, id: &CommitId) -> LedgerResult<Option<Arc<Commit>>> {
        Ok(self.lock()?.commits.get(id).cloned())
    }

    /// Every retained commit, parents before children.
    pub fn history(&self) -> LedgerResult<Vec<Arc<Commit>>> {
        let mut inner = self.lock()?;
        self.flush_locked(&mut inner)?;
        Ok(inner.commits.topological_order())
    }

    // ---- Sync and maintenance ----

    /// Add a commit produced elsewhere.
    ///
    /// Idempotent by commit id. If the page ends up with several heads they
    /// are merged right away, or when the active transaction finishes.
    pub fn ingest_commit(
        &self,
        parents: Vec<CommitId>,
        timestamp: Timestamp,
        entries: EntryMap,
    ) -> LedgerResult<Arc<Commit>> {
        let mut inner = self.lock()?;
        self.flush_locked(&mut inner)?;
        let append = inner.commits.append(parents, timestamp, Arc::new(entries))?;
        debug!(
            page = %self.id,
            commit = %append.commit().summary(),
            created = append.is_created(),
            "ingested commit"
        );
        self.record(&mut inner, &append);
        self.try_merge(&mut inner);
        Ok(append.into_commit())
    }

    /// Merge divergent heads under the current conflict resolution policy.
    ///
    /// Skipped while a transaction is active. A failed merge is logged and
    /// leaves the heads as they are.
    pub fn merge_heads(&self) -> LedgerResult<()> {
        let mut inner = self.lock()?;
        self.flush_locked(&mut inner)?;
        self.try_merge(&mut inner);
        Ok(())
    }

    /// Prune history older than the configured retention. Returns the
    /// number of commits dropped.
    pub fn compact(&self) -> LedgerResult<usize> {
        let Some(retain) = self.config.history_retention else {
            return Ok(0);
        };
        let mut inner = self.lock()?;
        let pruned = inner.commits.prune(retain)?;
        for commit in &pruned {
            self.objects.release(commit.referenced_objects());
        }
        Ok(pruned.len())
    }

    /// Delete the page's history and release its objects. Every later
    /// operation on this handle fails with `PageNotFound`.
    pub(crate) fn destroy(&self) -> LedgerResult<()> {
        let mut inner = self.lock()?;
        self.flush_locked(&mut inner)?;
        let commits = std::mem::replace(&mut inner.commits, CommitStore::new()?);
        inner.deleted = true;
        if let TransactionState::Active { ops, .. } = std::mem::take(&mut inner.transaction) {
            self.unpin(&ops);
        }
        inner.watchers.clear();

        let commits = commits.destroy()?;
        for commit in &commits {
            self.objects.release(commit.referenced_objects());
        }
        debug!(page = %self.id, commits = commits.len(), "page destroyed");
        Ok(())
    }

    // ---- Internals ----

    fn head(&self, inner: &PageInner) -> LedgerResult<Arc<Commit>> {
        inner
            .commits
            .preferred_head()
            .ok_or(LedgerError::PageNotFound(self.id))
    }

    /// Append `entries` as a child of `base`. Nothing is appended when the
    /// state is unchanged.
    fn commit_entries(
        &self,
        inner: &mut PageInner,
        base: &Arc<Commit>,
        entries: EntryMap,
    ) -> LedgerResult<()> {
        if entries == **base.entries() {
            debug!(page = %self.id, "no changes to commit");
            return Ok(());
        }
        let append = inner
            .commits
            .append(vec![base.id()], Timestamp::now(), Arc::new(entries))?;
        debug!(page = %self.id, commit = %append.commit().summary(), "committed");
        self.record(inner, &append);
        Ok(())
    }

    fn unpin(&self, ops: &[StagedOp]) {
        self.objects.unpin(ops.iter().filter_map(StagedOp::reference));
    }

    fn record(&self, inner: &mut PageInner, append: &Append) {
        if append.is_created() {
            self.objects.retain(append.commit().referenced_objects());
        }
        if let Some(head) = inner.commits.preferred_head() {
            inner.watchers.notify(&head);
        }
    }

    fn try_merge(&self, inner: &mut PageInner) {
        if inner.commits.head_count() < 2 || inner.transaction.is_active() {
            return;
        }
        let Some(strategy) = self.resolution.strategy_for(&self.id) else {
            debug!(page = %self.id, heads = inner.commits.head_count(), "merge deferred");
            return;
        };

        let report = self.engine.merge_heads(&mut inner.commits, strategy.as_ref());
        for append in &report.merges {
            self.record(inner, append);
        }
        if let Some(err) = report.failure {
            warn!(
                page = %self.id,
                heads = inner.commits.head_count(),
                error = %err,
                "merge failed, heads left divergent"
            );
        }
    }
}

/// Pending implicit mutations were reported as successful, so they are
/// committed before the page goes away. An open transaction is discarded.
impl Drop for Page {
    fn drop(&mut self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.deleted {
            return;
        }
        if let Err(e) = self.flush_locked(&mut inner) {
            warn!(
                page = %self.id,
                pending = inner.pending.len(),
                error = %e,
                "failed to flush pending mutations on drop"
            );
        }
        if let TransactionState::Active { ops, .. } = std::mem::take(&mut inner.transaction) {
            debug!(page = %self.id, discarded = ops.len(), "open transaction dropped");
            self.unpin(&ops);
        }
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use folio_diff::apply_changes;
    use folio_merge::{
        ConflictResolver, ConflictResolverFactory, MergePolicy, ResolverError,
    };
    use folio_diff::ChangeSet;
    use folio_store::InMemoryObjectStore;
    use folio_types::{EntryChange, Status};
    use proptest::prelude::*;

    use super::*;
    use crate::error::StatusExt;
    use crate::watch::WatchEvent;

    struct Fixture {
        page: Page,
        objects: Arc<ReferenceStore>,
        resolution: Arc<ConflictResolution>,
    }

    fn fixture_with(config: LedgerConfig) -> Fixture {
        let objects = Arc::new(ReferenceStore::new(Arc::new(InMemoryObjectStore::new())));
        let resolution = Arc::new(ConflictResolution::new());
        let page = Page::new(
            PageId::generate(),
            CommitStore::new().unwrap(),
            Arc::clone(&objects),
            Arc::clone(&resolution),
            Arc::new(config),
        )
        .unwrap();
        Fixture {
            page,
            objects,
            resolution,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(LedgerConfig::default())
    }

    fn read(snapshot: &Snapshot, key: &str) -> Option<Bytes> {
        match snapshot.get(key.as_bytes()).ok()?.value {
            Value::Inline(data) => Some(data),
            Value::Reference { .. } => None,
        }
    }

    fn state(pairs: &[(&str, &str)]) -> EntryMap {
        pairs
            .iter()
            .map(|(k, v)| (Bytes::from(k.to_string()), Value::inline(v.to_string())))
            .collect()
    }

    #[test]
    fn put_then_read_back() {
        let fx = fixture();
        fx.page.put("name", "folio").unwrap();
        let snap = fx.page.get_snapshot().unwrap();
        assert_eq!(read(&snap, "name"), Some(Bytes::from_static(b"folio")));
        fx.page.delete("name").unwrap();
        let err = fx.page.get_snapshot().unwrap().get(b"name").unwrap_err();
        assert_eq!(LedgerError::from(err).status(), Status::KeyNotFound);
    }

    #[test]
    fn implicit_mutations_are_batched() {
        let fx = fixture_with(LedgerConfig {
            auto_commit_batch_size: 3,
            ..LedgerConfig::default()
        });
        for key in ["a", "b", "c", "d"] {
            fx.page.put(key, "v").unwrap();
        }
        // a, b, c filled one batch; the snapshot flushes d.
        let snap = fx.page.get_snapshot().unwrap();
        assert_eq!(snap.len(), 4);
        assert_eq!(fx.page.history().unwrap().len(), 3);
    }

    #[test]
    fn transaction_is_invisible_until_commit() {
        let fx = fixture();
        fx.page.put("k", "before").unwrap();
        fx.page.start_transaction().unwrap();
        fx.page.put("k", "during").unwrap();
        fx.page.put("other", "x").unwrap();

        let before = fx.page.get_snapshot().unwrap();
        assert_eq!(read(&before, "k"), Some(Bytes::from_static(b"before")));
        assert!(read(&before, "other").is_none());

        fx.page.commit().unwrap();
        let after = fx.page.get_snapshot().unwrap();
        assert_eq!(read(&after, "k"), Some(Bytes::from_static(b"during")));
        assert_eq!(read(&after, "other"), Some(Bytes::from_static(b"x")));
        // Old snapshots never change.
        assert_eq!(read(&before, "k"), Some(Bytes::from_static(b"before")));
    }

    #[test]
    fn rollback_restores_prior_state() {
        let fx = fixture();
        fx.page.put("k", "v").unwrap();
        let before = fx.page.get_snapshot().unwrap();
        fx.page.start_transaction().unwrap();
        fx.page.delete("k").unwrap();
        fx.page.put("x", "y").unwrap();
        fx.page.rollback().unwrap();

        let after = fx.page.get_snapshot().unwrap();
        assert_eq!(after.commit_id(), before.commit_id());
        assert!(!fx.page.in_transaction());
    }

    #[test]
    fn one_transaction_at_a_time() {
        let fx = fixture();
        assert_eq!(fx.page.commit().status(), Status::NoTransactionInProgress);
        assert_eq!(fx.page.rollback().status(), Status::NoTransactionInProgress);
        fx.page.start_transaction().unwrap();
        assert_eq!(
            fx.page.start_transaction().status(),
            Status::TransactionAlreadyInProgress
        );
        fx.page.commit().unwrap();
        assert_eq!(fx.page.commit().status(), Status::NoTransactionInProgress);
    }

    #[test]
    fn start_transaction_flushes_pending_mutations() {
        let fx = fixture_with(LedgerConfig {
            auto_commit_batch_size: 100,
            ..LedgerConfig::default()
        });
        fx.page.put("implicit", "1").unwrap();
        fx.page.start_transaction().unwrap();
        fx.page.rollback().unwrap();
        let snap = fx.page.get_snapshot().unwrap();
        assert_eq!(read(&snap, "implicit"), Some(Bytes::from_static(b"1")));
    }

    #[test]
    fn unchanged_transaction_creates_no_commit() {
        let fx = fixture();
        let before = fx.page.history().unwrap().len();
        fx.page.start_transaction().unwrap();
        fx.page.put("tmp", "1").unwrap();
        fx.page.delete("tmp").unwrap();
        fx.page.commit().unwrap();
        assert_eq!(fx.page.history().unwrap().len(), before);
    }

    #[test]
    fn create_reference_validates_size() {
        let fx = fixture();
        let err = fx.page.create_reference(5, &b"1234"[..]).unwrap_err();
        assert_eq!(err.status(), Status::IoError);
        assert!(fx.page.create_reference(5, &b"12345"[..]).is_ok());
        let id = fx.page.create_reference(-1, &b"any length at all"[..]).unwrap();
        let value = fx.page.get_reference(&id).unwrap().into_bytes().unwrap();
        assert_eq!(value, Bytes::from_static(b"any length at all"));
    }

    #[test]
    fn put_reference_requires_existing_object() {
        let fx = fixture();
        let missing = ObjectId::from_hash([7; 32]);
        assert_eq!(
            fx.page.put_reference("k", missing, Priority::Eager).status(),
            Status::ReferenceNotFound
        );

        let id = fx.page.create_reference(-1, &b"payload"[..]).unwrap();
        fx.page.put_reference("k", id, Priority::Lazy).unwrap();
        let entry = fx.page.get_snapshot().unwrap().get(b"k").unwrap();
        assert_eq!(entry.value, Value::reference(id, Priority::Lazy));
        assert_eq!(fx.objects.ref_count(&id), 1);
    }

    #[test]
    fn batched_reference_is_kept_until_flushed() {
        let fx = fixture_with(LedgerConfig {
            auto_commit_batch_size: 4,
            ..LedgerConfig::default()
        });
        let id = fx.objects.put_bytes(&b"payload"[..]).unwrap();
        fx.objects.retain([id]);
        fx.objects.release([id]);

        fx.page.put_reference("k", id, Priority::Eager).unwrap();
        fx.page
            .put_with_priority("fresh", &b"payload"[..], Priority::Lazy)
            .unwrap();
        assert_eq!(fx.objects.collect_garbage().unwrap(), 0);

        fx.page.flush().unwrap();
        assert_eq!(fx.objects.ref_count(&id), 2);
        let value = fx.page.get_snapshot().unwrap().fetch(b"k").unwrap();
        assert_eq!(value.into_bytes().unwrap(), Bytes::from_static(b"payload"));
    }

    #[test]
    fn partial_reads_of_references() {
        let fx = fixture();
        fx.page
            .put_with_priority("big", &b"0123456789"[..], Priority::Eager)
            .unwrap();
        let snap = fx.page.get_snapshot().unwrap();
        assert_eq!(snap.get_partial(b"big", -3, -1).unwrap(), Bytes::from_static(b"789"));
        assert_eq!(snap.get_partial(b"big", 0, 4).unwrap(), Bytes::from_static(b"0123"));

        let id = snap.get(b"big").unwrap().value.reference_id().unwrap();
        assert_eq!(
            fx.page.get_partial_reference(&id, 2, 3).unwrap(),
            Bytes::from_static(b"234")
        );
    }

    /// Two remote commits on top of the current head.
    fn diverge(
        page: &Page,
        left: EntryMap,
        left_ts: u64,
        right: EntryMap,
        right_ts: u64,
    ) -> (CommitId, CommitId) {
        let base = page.heads().unwrap()[0].id();
        let a = Commit::compute_id(&[base], Timestamp::from_micros(left_ts), &left).unwrap();
        let b = Commit::compute_id(&[base], Timestamp::from_micros(right_ts), &right).unwrap();
        page.ingest_commit(vec![base], Timestamp::from_micros(left_ts), left)
            .unwrap();
        page.ingest_commit(vec![base], Timestamp::from_micros(right_ts), right)
            .unwrap();
        (a, b)
    }

    #[test]
    fn equal_timestamps_resolve_to_larger_commit_id() {
        for _ in 0..3 {
            let fx = fixture();
            let left = state(&[("k", "left")]);
            let right = state(&[("k", "right")]);
            let (a, b) = diverge(&fx.page, left.clone(), 100, right.clone(), 100);

            let heads = fx.page.heads().unwrap();
            assert_eq!(heads.len(), 1);
            assert!(heads[0].is_merge());
            let expected = if a > b { "left" } else { "right" };
            let snap = fx.page.get_snapshot().unwrap();
            assert_eq!(read(&snap, "k"), Some(Bytes::from(expected)));
        }
    }

    struct Policy {
        policy: MergePolicy,
        resolver: Option<Arc<dyn ConflictResolver>>,
    }

    impl ConflictResolverFactory for Policy {
        fn get_policy(&self, _page: &PageId) -> MergePolicy {
            self.policy
        }

        fn new_conflict_resolver(&self, _page: &PageId) -> Option<Arc<dyn ConflictResolver>> {
            self.resolver.clone()
        }
    }

    /// Resolves only the keys changed by the first head.
    struct LeftKeysOnly;

    impl ConflictResolver for LeftKeysOnly {
        fn resolve(
            &self,
            change1: &ChangeSet,
            _change2: &ChangeSet,
            _common_ancestor: Option<&Snapshot>,
        ) -> Result<Vec<EntryChange>, ResolverError> {
            Ok(change1.changes().to_vec())
        }
    }

    #[test]
    fn incomplete_custom_resolution_keeps_heads() {
        let fx = fixture();
        let factory: Arc<dyn ConflictResolverFactory> = Arc::new(Policy {
            policy: MergePolicy::Custom,
            resolver: Some(Arc::new(LeftKeysOnly)),
        });
        fx.resolution.set_factory(Some(&factory));

        diverge(
            &fx.page,
            state(&[("k", "1")]),
            10,
            state(&[("k", "2"), ("extra", "x")]),
            20,
        );
        assert_eq!(fx.page.heads().unwrap().len(), 2);

        fx.resolution.set_factory(None);
        fx.page.merge_heads().unwrap();
        assert_eq!(fx.page.heads().unwrap().len(), 1);
    }

    #[test]
    fn policy_none_leaves_heads_until_changed() {
        let fx = fixture();
        let factory: Arc<dyn ConflictResolverFactory> = Arc::new(Policy {
            policy: MergePolicy::None,
            resolver: None,
        });
        fx.resolution.set_factory(Some(&factory));
        diverge(&fx.page, state(&[("a", "1")]), 10, state(&[("b", "2")]), 20);
        assert_eq!(fx.page.heads().unwrap().len(), 2);

        // The newer head is the one readers and writers see.
        let snap = fx.page.get_snapshot().unwrap();
        assert_eq!(read(&snap, "b"), Some(Bytes::from_static(b"2")));
        assert!(read(&snap, "a").is_none());
    }

    #[test]
    fn merge_waits_for_active_transaction() {
        let fx = fixture();
        fx.page.start_transaction().unwrap();
        fx.page.put("local", "1").unwrap();
        diverge(&fx.page, state(&[("a", "1")]), 10, state(&[("b", "2")]), 20);
        assert_eq!(fx.page.heads().unwrap().len(), 2);

        fx.page.commit().unwrap();
        let heads = fx.page.heads().unwrap();
        assert_eq!(heads.len(), 1);
        let snap = fx.page.get_snapshot().unwrap();
        for key in ["local", "a", "b"] {
            assert!(read(&snap, key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn ingest_is_idempotent() {
        let fx = fixture();
        let base = fx.page.heads().unwrap()[0].id();
        let first = fx
            .page
            .ingest_commit(vec![base], Timestamp::from_micros(5), state(&[("k", "v")]))
            .unwrap();
        let again = fx
            .page
            .ingest_commit(vec![base], Timestamp::from_micros(5), state(&[("k", "v")]))
            .unwrap();
        assert_eq!(first.id(), again.id());
        assert_eq!(fx.page.history().unwrap().len(), 2);
    }

    #[test]
    fn ingest_with_unknown_parent_fails() {
        let fx = fixture();
        let err = fx
            .page
            .ingest_commit(
                vec![CommitId::from_hash([1; 32])],
                Timestamp::from_micros(5),
                EntryMap::new(),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::Dag(_)));
    }

    #[test]
    fn watcher_diffs_reconstruct_final_state() {
        let fx = fixture();
        fx.page.put("seed", "0").unwrap();
        let mut rx = fx.page.watch().unwrap();

        fx.page.put("a", "1").unwrap();
        fx.page.start_transaction().unwrap();
        fx.page.put("b", "2").unwrap();
        fx.page.delete("seed").unwrap();
        fx.page.commit().unwrap();
        diverge(&fx.page, state(&[("x", "1")]), 10, state(&[("y", "1")]), 20);
        fx.page.put("a", "3").unwrap();

        let WatchEvent::InitialState(initial) = rx.try_recv().unwrap() else {
            panic!("first event must be the initial state");
        };
        let mut rebuilt = initial.entries().clone();
        let mut last = Timestamp::ZERO;
        let mut changes = 0;
        while let Ok(event) = rx.try_recv() {
            let WatchEvent::Change(change) = event else {
                panic!("initial state delivered twice");
            };
            assert!(!change.changes.is_empty());
            rebuilt = apply_changes(&rebuilt, &change.changes);
            last = change.timestamp;
            changes += 1;
        }
        let final_state = fx.page.get_snapshot().unwrap();
        assert_eq!(&rebuilt, final_state.entries());
        assert_eq!(last, final_state.timestamp());
        assert!(changes >= 3);
    }

    #[test]
    fn deleted_page_rejects_everything() {
        let fx = fixture();
        fx.page
            .put_with_priority("k", &b"blob"[..], Priority::Lazy)
            .unwrap();
        let id = fx
            .page
            .get_snapshot()
            .unwrap()
            .get(b"k")
            .unwrap()
            .value
            .reference_id()
            .unwrap();
        let mut rx = fx.page.watch().unwrap();
        rx.try_recv().unwrap();

        fx.page.destroy().unwrap();
        assert_eq!(fx.page.get_snapshot().status(), Status::PageNotFound);
        assert_eq!(fx.page.put("k", "v").status(), Status::PageNotFound);
        assert_eq!(fx.page.start_transaction().status(), Status::PageNotFound);
        assert!(rx.try_recv().is_err());
        assert_eq!(fx.objects.ref_count(&id), 0);
        assert_eq!(fx.objects.collect_garbage().unwrap(), 1);
    }

    #[test]
    fn compact_prunes_old_history() {
        let fx = fixture_with(LedgerConfig {
            history_retention: Some(1),
            ..LedgerConfig::default()
        });
        fx.page
            .put_with_priority("blob", &b"first"[..], Priority::Eager)
            .unwrap();
        for i in 0..5 {
            fx.page.put("counter", i.to_string()).unwrap();
        }
        let before = fx.page.history().unwrap().len();
        let pruned = fx.page.compact().unwrap();
        assert!(pruned > 0);
        assert_eq!(fx.page.history().unwrap().len(), before - pruned);
        let snap = fx.page.get_snapshot().unwrap();
        assert_eq!(read(&snap, "counter"), Some(Bytes::from_static(b"4")));
        assert_eq!(
            snap.fetch(b"blob").unwrap().into_bytes().unwrap(),
            Bytes::from_static(b"first")
        );
    }

    #[test]
    fn compact_without_retention_is_a_no_op() {
        let fx = fixture();
        for i in 0..3 {
            fx.page.put("k", i.to_string()).unwrap();
        }
        assert_eq!(fx.page.compact().unwrap(), 0);
    }

    fn arb_pairs() -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
        prop::collection::vec(
            (
                prop::collection::vec(any::<u8>(), 0..8),
                prop::collection::vec(any::<u8>(), 0..16),
            ),
            1..16,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn committed_values_read_back(pairs in arb_pairs()) {
            let fx = fixture();
            fx.page.start_transaction().unwrap();
            for (k, v) in &pairs {
                fx.page.put(k.clone(), v.clone()).unwrap();
            }
            fx.page.commit().unwrap();

            let snap = fx.page.get_snapshot().unwrap();
            let mut expected = std::collections::BTreeMap::new();
            for (k, v) in pairs {
                expected.insert(k, v);
            }
            for (k, v) in expected {
                prop_assert_eq!(snap.get(&k).unwrap().value, Value::inline(v));
            }
        }
    }
}
