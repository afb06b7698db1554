//! Vault manager for creating and opening vaults.

use std::sync::Arc;
use tracing::info;

use crate::config::VaultConfig;
use crate::engine::{EngineConfig, ScatterEngine};
use crate::session::VaultSession;
use crate::store::MetadataStore;
use dimvault_common::{Error, Result, VaultId};
use dimvault_crypto::{derive_with_policy, DeviceFingerprint, KdfParams, KeyMode, KeyPolicy};
use dimvault_storage::{create_default_registry, MediumRegistry, ShardGroup};

/// Choices fixed when a vault is created.
#[derive(Debug, Clone)]
pub struct VaultOptions {
    pub key_mode: KeyMode,
    pub kdf_params: KdfParams,
    pub policy: KeyPolicy,
    pub medium_type: String,
    pub medium_config: serde_json::Value,
    pub default_group: ShardGroup,
    pub engine: EngineConfig,
}

impl VaultOptions {
    /// Options for a medium backend, with default key and engine settings.
    pub fn new(medium_type: impl Into<String>, medium_config: serde_json::Value) -> Self {
        Self {
            key_mode: KeyMode::Hybrid,
            kdf_params: KdfParams::default(),
            policy: KeyPolicy::default(),
            medium_type: medium_type.into(),
            medium_config,
            default_group: ShardGroup::default(),
            engine: EngineConfig::default(),
        }
    }

    pub fn with_key_mode(mut self, key_mode: KeyMode) -> Self {
        self.key_mode = key_mode;
        self
    }

    pub fn with_kdf_params(mut self, kdf_params: KdfParams) -> Self {
        self.kdf_params = kdf_params;
        self
    }

    pub fn with_policy(mut self, policy: KeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_group(mut self, group: ShardGroup) -> Self {
        self.default_group = group;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

/// Vault manager for creating and opening vaults.
pub struct VaultManager {
    registry: MediumRegistry,
}

impl VaultManager {
    /// Create a new vault manager with the built-in media.
    pub fn new() -> Self {
        Self {
            registry: create_default_registry(),
        }
    }

    /// Create with custom registry.
    pub fn with_registry(registry: MediumRegistry) -> Self {
        Self { registry }
    }

    /// Get the medium registry.
    pub fn registry(&self) -> &MediumRegistry {
        &self.registry
    }

    /// Get mutable medium registry.
    pub fn registry_mut(&mut self) -> &mut MediumRegistry {
        &mut self.registry
    }

    /// Create a new vault.
    ///
    /// # Preconditions
    /// - Medium type must be registered
    /// - `store` must not hold a vault yet
    ///
    /// # Postconditions
    /// - The medium is formatted with background filler
    /// - Vault configuration is persisted
    /// - Returns an active session
    ///
    /// # Errors
    /// - `AlreadyExists` if `store` already holds a vault
    /// - `MissingInput`/`WeakInput` from key derivation
    /// - Medium not found or invalid configuration
    pub async fn create_vault(
        &self,
        vault_id: VaultId,
        passphrase: Option<&[u8]>,
        fingerprint: Option<&DeviceFingerprint>,
        options: VaultOptions,
        store: Arc<dyn MetadataStore>,
    ) -> Result<VaultSession> {
        if store.load().await?.is_some() {
            return Err(Error::AlreadyExists(format!(
                "Vault metadata already present for '{}'",
                vault_id
            )));
        }
        options.default_group.validate()?;
        let engine = ScatterEngine::new(options.engine.clone())?;

        let master_key = derive_with_policy(
            options.key_mode,
            passphrase,
            fingerprint,
            &options.kdf_params,
            &options.policy,
        )?;

        let medium = self
            .registry
            .resolve(&options.medium_type, options.medium_config.clone())?;
        engine.format(&master_key, medium.as_ref()).await?;

        let config = VaultConfig::new(
            vault_id,
            &master_key,
            options.key_mode,
            options.kdf_params,
            options.medium_type,
            options.medium_config,
            medium.size(),
            options.default_group,
            options.engine,
        );
        store.save(&config).await?;

        info!(vault = %config.id, medium = medium.name(), size = medium.size(), "Created vault");
        VaultSession::from_parts(config, master_key, medium, store)
    }

    /// Open an existing vault.
    ///
    /// # Errors
    /// - `NotFound` if `store` holds no vault
    /// - `NotPermitted` if the key factors do not match
    /// - Incompatible version or medium mismatch
    pub async fn open_vault(
        &self,
        passphrase: Option<&[u8]>,
        fingerprint: Option<&DeviceFingerprint>,
        store: Arc<dyn MetadataStore>,
    ) -> Result<VaultSession> {
        let config = store
            .load()
            .await?
            .ok_or_else(|| Error::NotFound("Vault configuration not found".to_string()))?;
        let medium = self
            .registry
            .resolve(&config.medium_type, config.medium_config.clone())?;
        VaultSession::unlock(config, passphrase, fingerprint, medium, store)
    }

    /// Check if a vault exists in the given store.
    pub async fn vault_exists(&self, store: &dyn MetadataStore) -> Result<bool> {
        Ok(store.load().await?.is_some())
    }

    /// Save vault configuration to its store.
    pub async fn save_config(&self, session: &VaultSession) -> Result<()> {
        session.save().await
    }
}

impl Default for VaultManager {
    fn default() -> Self {
        Self::new()
    }
}
