use std::path::{Path, PathBuf};

use folio_store::DEFAULT_INLINE_READ_LIMIT;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Where a ledger keeps its pages and objects.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageConfig {
    /// Nothing survives the process.
    #[default]
    Memory,
    /// Page logs under `<dir>/pages`, objects under `<dir>/objects`.
    Directory(PathBuf),
}

/// Ledger settings.
///
/// ```toml
/// storage = { directory = "/var/lib/folio" }
/// auto_commit_batch_size = 16
/// history_retention = 1000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub storage: StorageConfig,
    /// Mutations made outside a transaction are coalesced into one commit
    /// until this many are pending.
    pub auto_commit_batch_size: usize,
    /// Object reads above this size come back as a stream.
    pub inline_read_limit: usize,
    /// Queue bound of each watcher.
    pub watcher_channel_capacity: usize,
    /// Generations kept behind the oldest head by `Page::compact`.
    /// `None` keeps all history.
    pub history_retention: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::Memory,
            auto_commit_batch_size: 1,
            inline_read_limit: DEFAULT_INLINE_READ_LIMIT,
            watcher_channel_capacity: 256,
            history_retention: None,
        }
    }
}

impl LedgerConfig {
    /// A default configuration persisting under `dir`.
    pub fn in_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::Directory(dir.into()),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.auto_commit_batch_size == 0 {
            return Err(LedgerError::Config(
                "auto_commit_batch_size must be at least 1".into(),
            ));
        }
        if self.watcher_channel_capacity == 0 {
            return Err(LedgerError::Config(
                "watcher_channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The storage directory, if the ledger is persistent.
    pub fn directory(&self) -> Option<&Path> {
        match &self.storage {
            StorageConfig::Memory => None,
            StorageConfig::Directory(dir) => Some(dir),
        }
    }
}
