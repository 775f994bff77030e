use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use folio_crypto::ContentHasher;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{LedgerConfig, StorageConfig};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::Ledger;

/// The authenticated user a ledger belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    fn validate(&self) -> LedgerResult<()> {
        if self.user_id.is_empty() {
            return Err(LedgerError::Authentication("empty user id".into()));
        }
        if self
            .user_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(LedgerError::Authentication(format!(
                "invalid user id {:?}",
                self.user_id
            )));
        }
        Ok(())
    }
}

/// Hands out one ledger per user.
///
/// Every ledger is opened from the factory's base configuration; with
/// directory storage each user gets a subdirectory named after a hash of
/// the user id.
pub struct LedgerFactory {
    config: LedgerConfig,
    ledgers: Mutex<HashMap<String, Arc<Ledger>>>,
}

impl LedgerFactory {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            ledgers: Mutex::new(HashMap::new()),
        }
    }

    /// The ledger of `identity`, opened on first request.
    pub fn get_ledger(&self, identity: &UserIdentity) -> LedgerResult<Arc<Ledger>> {
        identity.validate()?;
        let mut ledgers = self.ledgers.lock().expect("factory lock poisoned");
        if let Some(ledger) = ledgers.get(&identity.user_id) {
            return Ok(Arc::clone(ledger));
        }

        let mut config = self.config.clone();
        if let Some(root) = self.config.directory() {
            config.storage = StorageConfig::Directory(user_directory(root, &identity.user_id));
        }
        let ledger = Arc::new(Ledger::open(config)?);
        info!(user = %identity.user_id, "ledger opened for user");
        ledgers.insert(identity.user_id.clone(), Arc::clone(&ledger));
        Ok(ledger)
    }
}

impl std::fmt::Debug for LedgerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerFactory")
            .field("storage", &self.config.storage)
            .finish_non_exhaustive()
    }
}

/// `<root>/<first 16 bytes of the user hash, hex>`.
fn user_directory(root: &Path, user_id: &str) -> PathBuf {
    let id = ContentHasher::USER.hash(user_id.as_bytes());
    root.join(hex::encode(&id.as_bytes()[..16]))
}
