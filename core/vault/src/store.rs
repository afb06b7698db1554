//! Persistence of vault metadata.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::config::VaultConfig;
use dimvault_common::{Error, Result};

/// Where a vault's [`VaultConfig`] lives.
///
/// The store holds only non-secret metadata. Saving must replace the
/// previous config atomically: a reader sees either the old or the new one.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Load the config, or `None` if no vault was created here.
    async fn load(&self) -> Result<Option<VaultConfig>>;

    /// Replace the stored config.
    async fn save(&self, config: &VaultConfig) -> Result<()>;
}

/// JSON config file on the local filesystem.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl MetadataStore for JsonFileStore {
    async fn load(&self) -> Result<Option<VaultConfig>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => VaultConfig::from_bytes(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn save(&self, config: &VaultConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = config.to_json()?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, json.as_bytes()).await?;
        let file = tokio::fs::File::open(&temp).await?;
        file.sync_all().await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(files = config.files.len(), "Saved vault metadata");
        Ok(())
    }
}

/// In-memory store for tests and ephemeral vaults.
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: Mutex<Option<VaultConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn load(&self) -> Result<Option<VaultConfig>> {
        let config = self
            .config
            .lock()
            .map_err(|_| Error::Vault("Metadata store lock poisoned".to_string()))?;
        Ok(config.clone())
    }

    async fn save(&self, config: &VaultConfig) -> Result<()> {
        let mut stored = self
            .config
            .lock()
            .map_err(|_| Error::Vault("Metadata store lock poisoned".to_string()))?;
        *stored = Some(config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use dimvault_common::VaultId;
    use dimvault_crypto::{KdfParams, KeyMode, MasterKey, MASTER_KEY_LENGTH};
    use dimvault_storage::ShardGroup;
    use tempfile::TempDir;

    fn config() -> VaultConfig {
        VaultConfig::new(
            VaultId::new("store-test").unwrap(),
            &MasterKey::from_bytes([1; MASTER_KEY_LENGTH]),
            KeyMode::UserOnly,
            KdfParams::moderate(),
            "memory",
            serde_json::json!({"size": 1024}),
            1024,
            ShardGroup::default(),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_json_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp.path().join("nested").join("vault.config"));
        assert!(store.load().await.unwrap().is_none());

        store.save(&config()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.id.as_str(), "store-test");
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_json_store_rejects_garbage() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vault.config");
        std::fs::write(&path, b"not json").unwrap();
        let store = JsonFileStore::new(path);
        assert!(matches!(store.load().await, Err(Error::Serialization(_))));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load().await.unwrap().is_none());
        store.save(&config()).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().medium_size, 1024);
    }
}
