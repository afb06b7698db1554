//! Vault session management.
//!
//! Sessions hold the master key in memory and provide access to vault
//! operations. The key is zeroized when the session is locked or dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::VaultConfig;
use crate::engine::ScatterEngine;
use crate::layout::FileRecord;
use crate::locks::FileLocks;
use crate::store::MetadataStore;
use dimvault_common::{Error, FileId, Result, VaultId};
use dimvault_crypto::{derive, DeviceFingerprint, MasterKey};
use dimvault_storage::StorageMedium;

/// Session handle for tracking active sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Generate a new unique session handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the handle string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// State of the vault session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session is active and the key is available.
    Active,
    /// Session is locked, the key has been cleared.
    Locked,
}

/// Active vault session.
///
/// Owns the master key, the medium and the metadata store. Shared between
/// foreground operations and the background rescatter service, so all
/// methods take `&self`.
pub struct VaultSession {
    handle: SessionHandle,
    config: RwLock<VaultConfig>,
    master_key: StdRwLock<Option<Arc<MasterKey>>>,
    medium: Arc<dyn StorageMedium>,
    store: Arc<dyn MetadataStore>,
    engine: ScatterEngine,
    locks: FileLocks,
    persist: Mutex<()>,
    placement: Mutex<()>,
}

impl VaultSession {
    /// Unlock a vault by re-deriving its key.
    ///
    /// # Preconditions
    /// - `medium` is the medium the vault was created on
    ///
    /// # Postconditions
    /// - Returns an active session
    ///
    /// # Errors
    /// - Incompatible vault version
    /// - Medium size differs from the recorded one
    /// - `MissingInput` if the key mode needs an absent factor
    /// - `NotPermitted` if the derived key fails the key check
    pub fn unlock(
        config: VaultConfig,
        passphrase: Option<&[u8]>,
        fingerprint: Option<&DeviceFingerprint>,
        medium: Arc<dyn StorageMedium>,
        store: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        if !config.version.is_compatible() {
            return Err(Error::Vault(format!(
                "Incompatible vault version: {:?}",
                config.version
            )));
        }
        if medium.size() != config.medium_size {
            return Err(Error::Vault(format!(
                "Medium has {} cells, vault expects {}",
                medium.size(),
                config.medium_size
            )));
        }

        let master_key = derive(config.key_mode, passphrase, fingerprint, &config.kdf_params)?;
        if !config.verify_key(&master_key) {
            return Err(Error::NotPermitted("Invalid key".to_string()));
        }

        let vault_id = config.id.clone();
        let session = Self::from_parts(config, master_key, medium, store)?;
        info!(vault = %vault_id, "Unlocked vault");
        Ok(session)
    }

    /// Session around an already verified key.
    pub(crate) fn from_parts(
        config: VaultConfig,
        master_key: MasterKey,
        medium: Arc<dyn StorageMedium>,
        store: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        let engine = ScatterEngine::new(config.engine.clone())?;
        Ok(Self {
            handle: SessionHandle::new(),
            config: RwLock::new(config),
            master_key: StdRwLock::new(Some(Arc::new(master_key))),
            medium,
            store,
            engine,
            locks: FileLocks::new(),
            persist: Mutex::new(()),
            placement: Mutex::new(()),
        })
    }

    /// Get the session handle.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Get the vault ID.
    pub async fn vault_id(&self) -> VaultId {
        self.config.read().await.id.clone()
    }

    /// Snapshot of the vault configuration.
    pub async fn config(&self) -> VaultConfig {
        self.config.read().await.clone()
    }

    pub fn medium(&self) -> Arc<dyn StorageMedium> {
        self.medium.clone()
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    pub fn engine(&self) -> &ScatterEngine {
        &self.engine
    }

    pub fn locks(&self) -> &FileLocks {
        &self.locks
    }

    /// Get the master key, if the session is active.
    ///
    /// # Errors
    /// - `NotPermitted` if the session is locked
    pub fn master_key(&self) -> Result<Arc<MasterKey>> {
        self.master_key
            .read()
            .map_err(|_| Error::Vault("Session key lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| Error::NotPermitted("Session is locked".to_string()))
    }

    /// Get the current session state.
    pub fn state(&self) -> SessionState {
        match self.master_key.read() {
            Ok(key) if key.is_some() => SessionState::Active,
            _ => SessionState::Locked,
        }
    }

    /// Check if session is active.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Lock the session, clearing the key from memory.
    ///
    /// # Postconditions
    /// - The session's reference to the key is dropped; the key is zeroized
    ///   once in-flight operations release theirs
    /// - No further operation can start
    pub fn lock(&self) {
        let key = match self.master_key.write() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if key.is_some() {
            info!("Locked vault session");
        }
    }

    /// Record of a live file.
    pub async fn file_record(&self, file_id: &FileId) -> Option<FileRecord> {
        self.config.read().await.files.get(file_id).cloned()
    }

    /// Ids of all live files, in order.
    pub async fn list_files(&self) -> Vec<FileId> {
        self.config.read().await.files.keys().cloned().collect()
    }

    pub async fn file_records(&self) -> BTreeMap<FileId, FileRecord> {
        self.config.read().await.files.clone()
    }

    /// Exclusive right to place or wipe cells on the medium.
    ///
    /// Held from collecting the other files' cells until the record switch
    /// and the retirement are done, so no two placements see a stale set.
    ///
    /// # Errors
    /// - `LockTimeout` if another placement is still running after `timeout`
    pub(crate) async fn lock_placement(
        &self,
        timeout: Option<Duration>,
    ) -> Result<MutexGuard<'_, ()>> {
        match timeout {
            None => Ok(self.placement.lock().await),
            Some(limit) => tokio::time::timeout(limit, self.placement.lock())
                .await
                .map_err(|_| Error::LockTimeout("Medium placement is busy".to_string())),
        }
    }

    /// Switch the record of a file and persist the metadata.
    ///
    /// `None` removes the file. If persisting fails the in-memory record is
    /// restored, so memory never runs ahead of the store.
    pub(crate) async fn switch_record(
        &self,
        file_id: &FileId,
        record: Option<FileRecord>,
    ) -> Result<()> {
        let _persist = self.persist.lock().await;

        let (previous, snapshot) = {
            let mut config = self.config.write().await;
            let previous = match record {
                Some(record) => config.files.insert(file_id.clone(), record),
                None => config.files.remove(file_id),
            };
            config.modified_at = chrono::Utc::now();
            (previous, config.clone())
        };

        if let Err(e) = self.store.save(&snapshot).await {
            warn!(file_id = %file_id, error = %e, "Failed to persist file record");
            let mut config = self.config.write().await;
            match previous {
                Some(previous) => config.files.insert(file_id.clone(), previous),
                None => config.files.remove(file_id),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Persist the current metadata as is.
    pub async fn save(&self) -> Result<()> {
        let _persist = self.persist.lock().await;
        let snapshot = self.config.read().await.clone();
        self.store.save(&snapshot).await
    }
}

impl Drop for VaultSession {
    fn drop(&mut self) {
        self.lock();
    }
}
