//! What a rescatter cycle runs against.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use dimvault_common::{FileId, Result};
use dimvault_vault::{VaultOperations, VaultSession};

/// A set of files that can be moved to fresh layouts.
#[async_trait]
pub trait RescatterTarget: Send + Sync {
    /// Files currently stored.
    async fn file_ids(&self) -> Result<Vec<FileId>>;

    /// Rescatter one file under `temporal_salt`.
    ///
    /// Must fail with `LockTimeout` when the file stays busy past
    /// `lock_timeout` and with `Cancelled` when `cancel` fires before the
    /// new layout is committed.
    async fn rescatter_file(
        &self,
        file_id: &FileId,
        temporal_salt: u64,
        cancel: &CancellationToken,
        lock_timeout: Option<Duration>,
    ) -> Result<()>;
}

#[async_trait]
impl RescatterTarget for VaultSession {
    async fn file_ids(&self) -> Result<Vec<FileId>> {
        Ok(self.list_files().await)
    }

    async fn rescatter_file(
        &self,
        file_id: &FileId,
        temporal_salt: u64,
        cancel: &CancellationToken,
        lock_timeout: Option<Duration>,
    ) -> Result<()> {
        VaultOperations::new(self)?
            .rescatter_file(file_id, temporal_salt, cancel, lock_timeout)
            .await
            .map(|_| ())
    }
}
