use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use folio_dag::{CommitLog, CommitStore};
use folio_merge::ConflictResolverFactory;
use folio_store::{FsObjectStore, InMemoryObjectStore, ObjectStore, ReferenceStore};
use folio_types::PageId;
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::page::Page;
use crate::resolution::ConflictResolution;

const PAGE_LOG_EXTENSION: &str = "log";

/// A user's collection of pages sharing one object store.
pub struct Ledger {
    config: Arc<LedgerConfig>,
    objects: Arc<ReferenceStore>,
    resolution: Arc<ConflictResolution>,
    /// `<dir>/pages` for persistent ledgers.
    pages_dir: Option<PathBuf>,
    pages: RwLock<HashMap<PageId, Arc<Page>>>,
}

impl Ledger {
    /// Open a ledger, loading every page persisted under the configured
    /// directory.
    pub fn open(config: LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        let backend: Arc<dyn ObjectStore> = match config.directory() {
            Some(dir) => Arc::new(FsObjectStore::open(dir.join("objects"))?),
            None => Arc::new(InMemoryObjectStore::new()),
        };
        let pages_dir = match config.directory() {
            Some(dir) => {
                let pages_dir = dir.join("pages");
                fs::create_dir_all(&pages_dir)?;
                Some(pages_dir)
            }
            None => None,
        };
        let objects = Arc::new(
            ReferenceStore::new(backend).with_inline_read_limit(config.inline_read_limit),
        );

        let ledger = Self {
            config: Arc::new(config),
            objects,
            resolution: Arc::new(ConflictResolution::new()),
            pages_dir,
            pages: RwLock::new(HashMap::new()),
        };

        if let Some(dir) = &ledger.pages_dir {
            for id in persisted_pages(dir)? {
                ledger.get_page(id)?;
            }
        }
        ledger.get_root_page()?;
        info!(
            storage = ?ledger.config.storage,
            pages = ledger.page_count(),
            "ledger opened"
        );
        Ok(ledger)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The page every ledger has.
    pub fn get_root_page(&self) -> LedgerResult<Arc<Page>> {
        self.get_page(PageId::ROOT)
    }

    /// The page with `id`, created empty if it does not exist yet.
    pub fn get_page(&self, id: PageId) -> LedgerResult<Arc<Page>> {
        if let Some(page) = self.pages.read().expect("pages lock poisoned").get(&id) {
            return Ok(Arc::clone(page));
        }

        let mut pages = self.pages.write().expect("pages lock poisoned");
        if let Some(page) = pages.get(&id) {
            return Ok(Arc::clone(page));
        }
        let page = Arc::new(self.load_page(id)?);
        pages.insert(id, Arc::clone(&page));
        Ok(page)
    }

    /// Create a page with a fresh id.
    pub fn new_page(&self) -> LedgerResult<Arc<Page>> {
        let page = self.get_page(PageId::generate())?;
        info!(page = %page.id(), "page created");
        Ok(page)
    }

    /// Delete a page and its history. Open handles to it start failing with
    /// `PageNotFound`.
    pub fn delete_page(&self, id: PageId) -> LedgerResult<()> {
        let page = self
            .pages
            .write()
            .expect("pages lock poisoned")
            .remove(&id)
            .ok_or(LedgerError::PageNotFound(id))?;
        page.destroy()?;
        info!(page = %id, "page deleted");
        Ok(())
    }

    /// Install a conflict resolver factory for every page, or revert to
    /// last-one-wins with `None`, then retry pending merges.
    ///
    /// The factory is held weakly; keep the `Arc` alive for as long as it
    /// should stay in effect.
    pub fn set_conflict_resolver_factory(
        &self,
        factory: Option<&Arc<dyn ConflictResolverFactory>>,
    ) {
        self.resolution.set_factory(factory);
        for page in self.pages() {
            if let Err(e) = page.merge_heads() {
                warn!(page = %page.id(), error = %e, "merge after policy change failed");
            }
        }
    }

    /// Commit pending implicit mutations on every page.
    pub fn flush(&self) -> LedgerResult<()> {
        for page in self.pages() {
            page.flush()?;
        }
        Ok(())
    }

    /// Reclaim objects no longer referenced by any page.
    pub fn collect_garbage(&self) -> LedgerResult<usize> {
        let removed = self.objects.collect_garbage()?;
        debug!(removed, "garbage collected");
        Ok(removed)
    }

    /// Ids of all live pages, sorted.
    pub fn page_ids(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self
            .pages
            .read()
            .expect("pages lock poisoned")
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    pub fn page_count(&self) -> usize {
        self.pages.read().expect("pages lock poisoned").len()
    }

    fn pages(&self) -> Vec<Arc<Page>> {
        self.pages
            .read()
            .expect("pages lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    fn load_page(&self, id: PageId) -> LedgerResult<Page> {
        let commits = match &self.pages_dir {
            Some(dir) => {
                let path = dir.join(format!("{}.{PAGE_LOG_EXTENSION}", id.to_hex()));
                CommitStore::open(CommitLog::open(&path)?)?
            }
            None => CommitStore::new()?,
        };
        debug!(page = %id, commits = commits.len(), "page loaded");
        Page::new(
            id,
            commits,
            Arc::clone(&self.objects),
            Arc::clone(&self.resolution),
            Arc::clone(&self.config),
        )
    }
}

/// Page ids with a log file in `dir`. Files that do not look like page
/// logs are ignored.
fn persisted_pages(dir: &Path) -> LedgerResult<Vec<PageId>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(PAGE_LOG_EXTENSION) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        match PageId::from_hex(stem) {
            Ok(id) => ids.push(id),
            Err(_) => warn!(path = %path.display(), "ignoring unrecognized file in pages directory"),
        }
    }
    ids.sort();
    Ok(ids)
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("storage", &self.config.storage)
            .field("pages", &self.page_count())
            .finish_non_exhaustive()
    }
}
