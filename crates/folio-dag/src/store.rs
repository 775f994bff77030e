//! The per-page commit arena and its traversal algorithms.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use folio_types::{CommitId, EntryMap, Timestamp};
use tracing::debug;

use crate::commit::Commit;
use crate::error::{DagError, DagResult};
use crate::log::CommitLog;

/// Result of [`CommitStore::append`].
#[derive(Clone, Debug)]
pub enum Append {
    /// The commit was new and has been recorded.
    Created(Arc<Commit>),
    /// A commit with identical content already existed.
    Existing(Arc<Commit>),
}

impl Append {
    pub fn commit(&self) -> &Arc<Commit> {
        match self {
            Self::Created(commit) | Self::Existing(commit) => commit,
        }
    }

    pub fn into_commit(self) -> Arc<Commit> {
        match self {
            Self::Created(commit) | Self::Existing(commit) => commit,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Immutable commit DAG of a single page.
///
/// Commits live in an arena keyed by id; edges are parent ids, so the graph
/// never holds pointer cycles. The store also tracks the page's heads:
/// commits without a child in the store. One head is the normal state; more
/// than one means the page has diverged and awaits a merge.
///
/// When backed by a [`CommitLog`], every new commit is written to the log
/// before it becomes visible.
#[derive(Debug)]
pub struct CommitStore {
    /// All commits, keyed by id.
    commits: HashMap<CommitId, Arc<Commit>>,
    /// Forward-edge index: parent -> children.
    children: HashMap<CommitId, Vec<CommitId>>,
    /// Commits with no known child.
    heads: BTreeSet<CommitId>,
    log: Option<CommitLog>,
}

impl CommitStore {
    /// An in-memory store holding only the root commit.
    pub fn new() -> DagResult<Self> {
        let mut store = Self::empty(None);
        store.insert(Arc::new(Commit::root()?));
        Ok(store)
    }

    /// Open a log-backed store, replaying every commit in the log.
    ///
    /// An empty log is initialized with the root commit. Commits whose
    /// parents were pruned before the log was last rewritten are restored
    /// as-is; the missing parents simply stay unknown.
    pub fn open(log: CommitLog) -> DagResult<Self> {
        let records = log.recover()?;
        let mut store = Self::empty(Some(log));

        if records.is_empty() {
            store.append_root()?;
            return Ok(store);
        }

        for record in records {
            let commit = record.into_commit()?;
            if store.commits.contains_key(&commit.id()) {
                continue;
            }
            store.insert(Arc::new(commit));
        }
        debug!(commits = store.len(), heads = store.heads.len(), "commit store replayed");
        Ok(store)
    }

    fn empty(log: Option<CommitLog>) -> Self {
        Self {
            commits: HashMap::new(),
            children: HashMap::new(),
            heads: BTreeSet::new(),
            log,
        }
    }

    fn append_root(&mut self) -> DagResult<()> {
        let root = Commit::root()?;
        if let Some(log) = &self.log {
            log.append(&root)?;
        }
        self.insert(Arc::new(root));
        Ok(())
    }

    /// Total number of commits held.
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Append a commit with the given content.
    ///
    /// Every parent must already be present. Appending content that already
    /// exists is a no-op returning the existing commit, which makes remote
    /// ingestion idempotent. The log write happens before the in-memory
    /// state changes, so a failed append leaves the store untouched.
    pub fn append(
        &mut self,
        parents: Vec<CommitId>,
        timestamp: Timestamp,
        entries: Arc<EntryMap>,
    ) -> DagResult<Append> {
        let mut generation = 0;
        for parent in &parents {
            match self.commits.get(parent) {
                Some(commit) => generation = generation.max(commit.generation() + 1),
                None => {
                    return Err(DagError::DanglingParent {
                        commit: Commit::compute_id(&parents, timestamp, &entries)?,
                        parent: *parent,
                    })
                }
            }
        }

        let commit = Commit::build(parents, timestamp, generation, entries)?;
        if let Some(existing) = self.commits.get(&commit.id()) {
            return Ok(Append::Existing(Arc::clone(existing)));
        }

        if let Some(log) = &self.log {
            log.append(&commit)?;
        }

        let commit = Arc::new(commit);
        self.insert(Arc::clone(&commit));
        debug!(commit = %commit.summary(), heads = self.heads.len(), "appended commit");
        Ok(Append::Created(commit))
    }

    fn insert(&mut self, commit: Arc<Commit>) {
        let id = commit.id();
        for parent in commit.parents() {
            self.children.entry(*parent).or_default().push(id);
            self.heads.remove(parent);
        }
        if !self.children.contains_key(&id) {
            self.heads.insert(id);
        }
        self.commits.insert(id, commit);
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Retrieve a commit by id.
    pub fn get(&self, id: &CommitId) -> Option<&Arc<Commit>> {
        self.commits.get(id)
    }

    pub fn contains(&self, id: &CommitId) -> bool {
        self.commits.contains_key(id)
    }

    /// Every commit held, in no particular order.
    pub fn commits(&self) -> impl Iterator<Item = &Arc<Commit>> {
        self.commits.values()
    }

    /// Current heads, ascending by `(timestamp, id)`.
    pub fn heads(&self) -> Vec<Arc<Commit>> {
        let mut heads: Vec<Arc<Commit>> = self
            .heads
            .iter()
            .filter_map(|id| self.commits.get(id))
            .cloned()
            .collect();
        heads.sort_by_key(|commit| commit.order_key());
        heads
    }

    /// Number of heads.
    pub fn head_count(&self) -> usize {
        self.heads.len()
    }

    /// The head with the greatest `(timestamp, id)`: the base for new local
    /// commits while the page is diverged.
    pub fn preferred_head(&self) -> Option<Arc<Commit>> {
        self.heads
            .iter()
            .filter_map(|id| self.commits.get(id))
            .max_by_key(|commit| commit.order_key())
            .cloned()
    }

    /// The most recent commit reachable from both `a` and `b`.
    ///
    /// Walks both histories at once, always expanding the highest
    /// generation first. Because every child has a strictly higher generation
    /// than its parents, a commit is only expanded after all of its
    /// descendants on either walk, so the first commit reached from both
    /// sides is a lowest common ancestor. Returns `None` if either commit is
    /// unknown or the shared history has been pruned.
    pub fn common_ancestor(&self, a: &CommitId, b: &CommitId) -> Option<Arc<Commit>> {
        const FROM_A: u8 = 0b01;
        const FROM_B: u8 = 0b10;

        let commit_a = self.commits.get(a)?;
        let commit_b = self.commits.get(b)?;
        if a == b {
            return Some(Arc::clone(commit_a));
        }

        let mut flags: HashMap<CommitId, u8> = HashMap::new();
        let mut queue: BinaryHeap<(u64, CommitId)> = BinaryHeap::new();
        flags.insert(*a, FROM_A);
        flags.insert(*b, FROM_B);
        queue.push((commit_a.generation(), *a));
        queue.push((commit_b.generation(), *b));

        while let Some((_, id)) = queue.pop() {
            let side = flags.get(&id).copied().unwrap_or(0);
            if side == FROM_A | FROM_B {
                return self.commits.get(&id).cloned();
            }
            let Some(commit) = self.commits.get(&id) else {
                continue;
            };
            for parent in commit.parents() {
                let Some(parent_commit) = self.commits.get(parent) else {
                    continue;
                };
                let entry = flags.entry(*parent).or_insert(0);
                if *entry == 0 {
                    queue.push((parent_commit.generation(), *parent));
                }
                *entry |= side;
            }
        }
        None
    }

    /// All commits in topological order (parents before children).
    ///
    /// Kahn's algorithm; among commits that are ready at the same time the
    /// smallest `(timestamp, id)` goes first, so the output is deterministic.
    pub fn topological_order(&self) -> Vec<Arc<Commit>> {
        let mut in_degree: HashMap<CommitId, usize> = HashMap::new();
        let mut ready = BinaryHeap::new();
        for commit in self.commits.values() {
            let degree = commit
                .parents()
                .iter()
                .filter(|parent| self.commits.contains_key(parent))
                .count();
            if degree == 0 {
                ready.push(Reverse(commit.order_key()));
            } else {
                in_degree.insert(commit.id(), degree);
            }
        }

        let mut result = Vec::with_capacity(self.commits.len());
        while let Some(Reverse((_, id))) = ready.pop() {
            let Some(commit) = self.commits.get(&id) else {
                continue;
            };
            result.push(Arc::clone(commit));

            for child in self.children.get(&id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        in_degree.remove(child);
                        if let Some(child_commit) = self.commits.get(child) {
                            ready.push(Reverse(child_commit.order_key()));
                        }
                    }
                }
            }
        }
        result
    }

    // ---------------------------------------------------------------
    // Retention
    // ---------------------------------------------------------------

    /// Drop commits more than `retain` generations behind the oldest head.
    ///
    /// Heads are never pruned. Children of pruned commits keep their parent
    /// ids; those ids just stop resolving. The log, if any, is rewritten to
    /// hold only the surviving commits. Returns the pruned commits so the
    /// caller can release the objects they referenced.
    pub fn prune(&mut self, retain: u64) -> DagResult<Vec<Arc<Commit>>> {
        let Some(oldest_head) = self
            .heads
            .iter()
            .filter_map(|id| self.commits.get(id))
            .map(|commit| commit.generation())
            .min()
        else {
            return Ok(Vec::new());
        };
        let horizon = oldest_head.saturating_sub(retain);

        let to_prune: HashSet<CommitId> = self
            .commits
            .values()
            .filter(|commit| commit.generation() < horizon && !self.heads.contains(&commit.id()))
            .map(|commit| commit.id())
            .collect();
        if to_prune.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(log) = &self.log {
            let survivors = self.topological_order();
            log.rewrite(
                survivors
                    .iter()
                    .filter(|commit| !to_prune.contains(&commit.id()))
                    .map(|commit| commit.as_ref()),
            )?;
        }

        let mut pruned = Vec::with_capacity(to_prune.len());
        for id in &to_prune {
            if let Some(commit) = self.commits.remove(id) {
                pruned.push(commit);
            }
            self.children.remove(id);
        }
        for children in self.children.values_mut() {
            children.retain(|child| !to_prune.contains(child));
        }

        debug!(pruned = pruned.len(), horizon, "pruned commit history");
        Ok(pruned)
    }

    /// Tear the store down, deleting its log. Returns every commit it held.
    pub fn destroy(self) -> DagResult<Vec<Arc<Commit>>> {
        let CommitStore { commits, log, .. } = self;
        if let Some(log) = log {
            log.remove()?;
        }
        Ok(commits.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use folio_types::Value;

    use super::*;

    fn state(pairs: &[(&'static str, &'static str)]) -> Arc<EntryMap> {
        Arc::new(
            pairs
                .iter()
                .map(|(k, v)| (Bytes::from_static(k.as_bytes()), Value::inline(v.as_bytes())))
                .collect(),
        )
    }

    fn ts(micros: u64) -> Timestamp {
        Timestamp::from_micros(micros)
    }

    fn root_id(store: &CommitStore) -> CommitId {
        store.heads()[0].id()
    }

    fn commit_on(store: &mut CommitStore, parent: CommitId, at: u64, value: &'static str) -> CommitId {
        store
            .append(vec![parent], ts(at), state(&[("k", value)]))
            .unwrap()
            .into_commit()
            .id()
    }

    #[test]
    fn new_store_has_single_root_head() {
        let store = CommitStore::new().unwrap();
        assert_eq!(store.len(), 1);
        let heads = store.heads();
        assert_eq!(heads.len(), 1);
        assert!(heads[0].is_root());
        assert_eq!(heads[0].id(), Commit::root().unwrap().id());
    }

    #[test]
    fn append_advances_head() {
        let mut store = CommitStore::new().unwrap();
        let root = root_id(&store);
        let c1 = commit_on(&mut store, root, 10, "a");
        assert_eq!(store.head_count(), 1);
        assert_eq!(store.preferred_head().unwrap().id(), c1);
        assert_eq!(store.get(&c1).unwrap().generation(), 1);
    }

    #[test]
    fn append_is_idempotent() {
        let mut store = CommitStore::new().unwrap();
        let root = root_id(&store);
        let first = store.append(vec![root], ts(10), state(&[("k", "v")])).unwrap();
        let second = store.append(vec![root], ts(10), state(&[("k", "v")])).unwrap();
        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.commit().id(), second.commit().id());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn dangling_parent_is_rejected() {
        let mut store = CommitStore::new().unwrap();
        let missing = CommitId::from_hash([0xAB; 32]);
        let err = store.append(vec![missing], ts(1), state(&[])).unwrap_err();
        assert!(matches!(err, DagError::DanglingParent { parent, .. } if parent == missing));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn divergent_commits_produce_multiple_heads() {
        let mut store = CommitStore::new().unwrap();
        let root = root_id(&store);
        let a = commit_on(&mut store, root, 20, "a");
        let b = commit_on(&mut store, root, 10, "b");
        let heads: Vec<CommitId> = store.heads().iter().map(|c| c.id()).collect();
        assert_eq!(heads, vec![b, a]);
        assert_eq!(store.preferred_head().unwrap().id(), a);

        let merge = store
            .append(vec![a, b], ts(30), state(&[("k", "ab")]))
            .unwrap()
            .into_commit();
        assert!(merge.is_merge());
        assert_eq!(merge.generation(), 2);
        assert_eq!(store.head_count(), 1);
    }

    #[test]
    fn common_ancestor_of_fork() {
        let mut store = CommitStore::new().unwrap();
        let root = root_id(&store);
        let base = commit_on(&mut store, root, 5, "base");
        let a1 = commit_on(&mut store, base, 10, "a1");
        let a2 = commit_on(&mut store, a1, 11, "a2");
        let b1 = commit_on(&mut store, base, 12, "b1");

        assert_eq!(store.common_ancestor(&a2, &b1).unwrap().id(), base);
        assert_eq!(store.common_ancestor(&b1, &a2).unwrap().id(), base);
        assert_eq!(store.common_ancestor(&a2, &a1).unwrap().id(), a1);
        assert_eq!(store.common_ancestor(&a2, &a2).unwrap().id(), a2);
    }

    #[test]
    fn common_ancestor_after_criss_cross_merge() {
        let mut store = CommitStore::new().unwrap();
        let root = root_id(&store);
        let a = commit_on(&mut store, root, 10, "a");
        let b = commit_on(&mut store, root, 11, "b");
        let merge = store
            .append(vec![a, b], ts(12), state(&[("k", "m")]))
            .unwrap()
            .into_commit()
            .id();
        let left = commit_on(&mut store, merge, 13, "left");
        let right = commit_on(&mut store, merge, 14, "right");
        assert_eq!(store.common_ancestor(&left, &right).unwrap().id(), merge);
    }

    #[test]
    fn common_ancestor_unknown_commit() {
        let store = CommitStore::new().unwrap();
        let root = root_id(&store);
        assert!(store
            .common_ancestor(&root, &CommitId::from_hash([1; 32]))
            .is_none());
    }

    #[test]
    fn topological_order_parents_first() {
        let mut store = CommitStore::new().unwrap();
        let root = root_id(&store);
        let a = commit_on(&mut store, root, 30, "a");
        let b = commit_on(&mut store, root, 20, "b");
        let m = store
            .append(vec![a, b], ts(40), state(&[("k", "m")]))
            .unwrap()
            .into_commit()
            .id();

        let order: Vec<CommitId> = store.topological_order().iter().map(|c| c.id()).collect();
        assert_eq!(order, vec![root, b, a, m]);
    }

    #[test]
    fn prune_keeps_heads_and_recent_history() {
        let mut store = CommitStore::new().unwrap();
        let mut tip = root_id(&store);
        let mut chain = vec![tip];
        for i in 1..=5 {
            tip = commit_on(&mut store, tip, i * 10, "v");
            chain.push(tip);
        }
        let pruned = store.prune(2).unwrap();
        assert_eq!(pruned.len(), 3);
        assert_eq!(store.len(), 3);
        assert!(store.contains(&chain[5]));
        assert!(store.contains(&chain[3]));
        assert!(!store.contains(&chain[2]));
        assert_eq!(store.preferred_head().unwrap().id(), tip);
        assert_eq!(store.common_ancestor(&chain[5], &chain[3]).unwrap().id(), chain[3]);
        assert!(store.common_ancestor(&chain[5], &chain[1]).is_none());
    }

    #[test]
    fn log_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.log");

        let (a, b) = {
            let mut store = CommitStore::open(CommitLog::open(&path).unwrap()).unwrap();
            let root = root_id(&store);
            let a = commit_on(&mut store, root, 10, "a");
            let b = commit_on(&mut store, root, 20, "b");
            (a, b)
        };

        let store = CommitStore::open(CommitLog::open(&path).unwrap()).unwrap();
        assert_eq!(store.len(), 3);
        let heads: Vec<CommitId> = store.heads().iter().map(|c| c.id()).collect();
        assert_eq!(heads, vec![a, b]);
    }

    #[test]
    fn pruned_log_replays_without_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.log");

        let tip = {
            let mut store = CommitStore::open(CommitLog::open(&path).unwrap()).unwrap();
            let mut tip = root_id(&store);
            for i in 1..=4 {
                tip = commit_on(&mut store, tip, i, "v");
            }
            store.prune(1).unwrap();
            tip
        };

        let store = CommitStore::open(CommitLog::open(&path).unwrap()).unwrap();
        assert_eq!(store.len(), 2);
        let head = store.preferred_head().unwrap();
        assert_eq!(head.id(), tip);
        assert_eq!(head.generation(), 4);
    }

    #[test]
    fn destroy_removes_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.log");
        let mut store = CommitStore::open(CommitLog::open(&path).unwrap()).unwrap();
        let root = root_id(&store);
        commit_on(&mut store, root, 1, "v");

        let commits = store.destroy().unwrap();
        assert_eq!(commits.len(), 2);
        assert!(!path.exists());
    }
}
