use std::sync::Arc;

use folio_dag::{Append, Commit, CommitStore};
use folio_diff::{apply_changes, diff_entries};
use folio_snapshot::Snapshot;
use folio_store::ReferenceStore;
use folio_types::{EntryMap, Timestamp};
use tracing::debug;

use crate::error::{MergeError, MergeResult};
use crate::strategy::{MergeSide, MergeStrategy, Origins};

/// Outcome of [`MergeEngine::merge_heads`].
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Merge commits appended, in order.
    pub merges: Vec<Append>,
    /// The error that stopped the fold, if any.
    pub failure: Option<MergeError>,
}

impl MergeReport {
    /// Returns `true` if every merge step succeeded.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Reconciles divergent heads of a page's commit store.
///
/// The engine holds no per-page state: callers pass the commit store they
/// already hold exclusively, which serializes merges with every other
/// writer of that page.
#[derive(Clone, Debug)]
pub struct MergeEngine {
    objects: Arc<ReferenceStore>,
}

impl MergeEngine {
    pub fn new(objects: Arc<ReferenceStore>) -> Self {
        Self { objects }
    }

    /// Merge heads until one remains.
    ///
    /// Heads are sorted ascending by `(timestamp, id)` and folded from the
    /// left: the first two are merged, then the result with the third, and
    /// so on. Each intermediate merge commit remembers which head wrote each
    /// of its values, so a later step compares the writers rather than the
    /// merge commit itself. If a step fails, the merges already appended stay
    /// in place and the remaining heads stay divergent; the report carries
    /// both.
    pub fn merge_heads(
        &self,
        commits: &mut CommitStore,
        strategy: &dyn MergeStrategy,
    ) -> MergeReport {
        let mut report = MergeReport::default();
        let mut heads = commits.heads().into_iter();
        let Some(mut acc) = heads.next() else {
            return report;
        };
        let mut origins = Origins::of(&acc);

        for head in heads {
            match self.merge_step(commits, strategy, &acc, &origins, &head) {
                Ok((append, merged_origins)) => {
                    acc = Arc::clone(append.commit());
                    origins = merged_origins;
                    report.merges.push(append);
                }
                Err(e) => {
                    report.failure = Some(e);
                    break;
                }
            }
        }
        report
    }

    /// Merge two heads into one merge commit.
    pub fn merge_pair(
        &self,
        commits: &mut CommitStore,
        strategy: &dyn MergeStrategy,
        left: &Arc<Commit>,
        right: &Arc<Commit>,
    ) -> MergeResult<Append> {
        let (append, _) = self.merge_step(commits, strategy, left, &Origins::of(left), right)?;
        Ok(append)
    }

    fn merge_step(
        &self,
        commits: &mut CommitStore,
        strategy: &dyn MergeStrategy,
        left: &Arc<Commit>,
        left_origins: &Origins,
        right: &Arc<Commit>,
    ) -> MergeResult<(Append, Origins)> {
        let ancestor = commits.common_ancestor(&left.id(), &right.id());
        let empty = EntryMap::new();
        let base = ancestor.as_ref().map_or(&empty, |commit| commit.entries().as_ref());

        let change1 = diff_entries(base, left.entries());
        let change2 = diff_entries(base, right.entries());
        let ancestor_snapshot = ancestor
            .as_ref()
            .map(|commit| Snapshot::new(Arc::clone(commit), Arc::clone(&self.objects)));

        let merged = strategy.merge(
            MergeSide::new(left, &change1).with_origins(left_origins),
            MergeSide::new(right, &change2),
            ancestor_snapshot.as_ref(),
        )?;

        let entries = apply_changes(left.entries(), &merged);
        let timestamp = Timestamp::now()
            .max(left.timestamp())
            .max(right.timestamp());
        let append = commits.append(vec![left.id(), right.id()], timestamp, Arc::new(entries))?;

        // Values taken over from a side keep that side's writer; values the
        // strategy made up belong to the merge commit.
        let mut origins = left_origins.clone();
        for change in merged.iter() {
            let from_left = change1.get(&change.key) == Some(change);
            let from_right = change2.get(&change.key) == Some(change);
            let writer = match (from_left, from_right) {
                (true, true) => left_origins.writer(&change.key).max(right.order_key()),
                (true, false) => left_origins.writer(&change.key),
                (false, true) => right.order_key(),
                (false, false) => append.commit().order_key(),
            };
            origins.set(change.key.clone(), writer);
        }

        debug!(
            left = %left.id().short_hex(),
            right = %right.id().short_hex(),
            ancestor = ?ancestor.as_ref().map(|c| c.id().short_hex()),
            change1 = change1.len(),
            change2 = change2.len(),
            merged = %append.commit().id().short_hex(),
            "merged heads"
        );
        Ok((append, origins))
    }
}
