//! Vault configuration and metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::engine::EngineConfig;
use crate::layout::FileRecord;
use dimvault_common::{Error, FileId, Result, VaultId};
use dimvault_crypto::{KdfParams, KeyMode, MasterKey};
use dimvault_storage::ShardGroup;

/// Vault format version for migration support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultVersion {
    pub major: u32,
    pub minor: u32,
}

impl VaultVersion {
    /// Current vault format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version is compatible with the current version.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for VaultVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Persistent vault metadata.
///
/// Everything in here is non-secret: key factors, the master key and
/// scatter layouts never appear. The layout of each file is recomputed from
/// the key and its [`FileRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Unique vault identifier.
    pub id: VaultId,
    /// Vault format version.
    pub version: VaultVersion,
    /// Which key factors the vault was created with.
    pub key_mode: KeyMode,
    /// KDF parameters.
    pub kdf_params: KdfParams,
    /// Medium backend name (e.g., "local", "memory").
    pub medium_type: String,
    /// Backend-specific medium configuration.
    pub medium_config: serde_json::Value,
    /// Medium size in cells, fixed at creation.
    pub medium_size: u64,
    /// Shard group for newly written files.
    pub default_group: ShardGroup,
    /// Scatter engine tunables.
    pub engine: EngineConfig,
    /// Vault creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub modified_at: DateTime<Utc>,
    /// Key-check value used to reject a wrong key before touching the medium.
    pub key_check: Vec<u8>,
    /// Records of all live files.
    #[serde(default)]
    pub files: BTreeMap<FileId, FileRecord>,
}

impl VaultConfig {
    /// Create a configuration for a freshly derived key.
    ///
    /// # Postconditions
    /// - No files are recorded
    /// - `key_check` matches `master_key`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: VaultId,
        master_key: &MasterKey,
        key_mode: KeyMode,
        kdf_params: KdfParams,
        medium_type: impl Into<String>,
        medium_config: serde_json::Value,
        medium_size: u64,
        default_group: ShardGroup,
        engine: EngineConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            version: VaultVersion::CURRENT,
            key_mode,
            kdf_params,
            medium_type: medium_type.into(),
            medium_config,
            medium_size,
            default_group,
            engine,
            created_at: now,
            modified_at: now,
            key_check: master_key.key_check().to_vec(),
            files: BTreeMap::new(),
        }
    }

    /// Whether `master_key` is the key this vault was created with.
    pub fn verify_key(&self, master_key: &MasterKey) -> bool {
        master_key.matches_check(&self.key_check)
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Serialize to bytes for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Configuration file name next to the medium.
pub const CONFIG_FILENAME: &str = "vault.config";
