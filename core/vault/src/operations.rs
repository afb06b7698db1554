//! Vault file operations.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::GenerationSwitch;
use crate::layout::{FileRecord, Occupancy, ScatterLayout};
use crate::session::VaultSession;
use dimvault_common::{Error, FileId, Result};
use dimvault_crypto::MasterKey;
use dimvault_storage::StorageMedium;

/// Vault operations handler.
///
/// Every operation holds the file's lock for its whole duration, so
/// operations on one file run in call order while reads of different files
/// proceed in parallel. Operations that place or wipe cells also hold the
/// session's placement lock and keep clear of every other file's cells.
pub struct VaultOperations<'a> {
    session: &'a VaultSession,
}

impl<'a> VaultOperations<'a> {
    /// Create new operations handler for a session.
    pub fn new(session: &'a VaultSession) -> Result<Self> {
        if !session.is_active() {
            return Err(Error::NotPermitted("Session is not active".to_string()));
        }
        Ok(Self { session })
    }

    async fn record(&self, file_id: &FileId) -> Result<FileRecord> {
        self.session
            .file_record(file_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("File '{}' not found", file_id)))
    }

    /// Real cells of every file except `file_id`.
    async fn occupancy(
        &self,
        file_id: &FileId,
        key: &MasterKey,
        medium: &Arc<dyn StorageMedium>,
    ) -> Result<Occupancy> {
        let mut others = self.session.file_records().await;
        others.remove(file_id);
        self.session
            .engine()
            .occupancy(key, &others, medium.as_ref())
            .await
    }

    /// Scatter new content for a file, replacing any previous content.
    ///
    /// # Postconditions
    /// - A new file starts in generation 0
    /// - An existing file moves to its next generation; the old content stays
    ///   readable until the record is switched, then its cells are retired
    ///
    /// # Errors
    /// - `InvalidInput` if the content does not fit the medium
    /// - Storage or metadata failure (the previous state remains)
    pub async fn write_file(&self, file_id: &FileId, content: &[u8]) -> Result<FileRecord> {
        let _guard = self.session.locks().acquire(file_id, None).await?;
        let key = self.session.master_key()?;
        let medium = self.session.medium();
        let group = self.session.config().await.default_group;
        let salt: u64 = rand::random();

        debug!(file_id = %file_id, size = content.len(), "Writing file");
        let _placement = self.session.lock_placement(None).await?;
        let occupied = self.occupancy(file_id, &key, &medium).await?;

        let record = match self.session.file_record(file_id).await {
            None => {
                let record = self
                    .session
                    .engine()
                    .scatter(
                        &key,
                        file_id,
                        content,
                        group,
                        salt,
                        &occupied,
                        medium.as_ref(),
                    )
                    .await?;
                if let Err(e) = self
                    .session
                    .switch_record(file_id, Some(record.clone()))
                    .await
                {
                    if let Err(cleanup) = self
                        .session
                        .engine()
                        .delete(&key, file_id, &record, &occupied, medium.as_ref())
                        .await
                    {
                        warn!(file_id = %file_id, error = %cleanup, "Failed to remove unrecorded scatter");
                    }
                    return Err(e);
                }
                record
            }
            Some(previous) => {
                let switch = self
                    .session
                    .engine()
                    .stage_rewrite(
                        &key,
                        file_id,
                        &previous,
                        content,
                        group,
                        salt,
                        &occupied,
                        medium.as_ref(),
                    )
                    .await?;
                self.commit_switch(file_id, switch, &key, &medium, &occupied)
                    .await?
            }
        };

        info!(file_id = %file_id, size = content.len(), generation = record.generation, "File written");
        Ok(record)
    }

    /// Gather a file's content.
    ///
    /// # Errors
    /// - `NotFound` if the file has no record
    /// - `InsufficientShards` or `CorruptedLayout` if it cannot be rebuilt
    pub async fn read_file(&self, file_id: &FileId) -> Result<Vec<u8>> {
        let _guard = self.session.locks().acquire(file_id, None).await?;
        let key = self.session.master_key()?;
        let record = self.record(file_id).await?;
        let content = self
            .session
            .engine()
            .gather(&key, file_id, &record, self.session.medium().as_ref())
            .await?;
        debug!(file_id = %file_id, size = content.len(), "File read");
        Ok(content)
    }

    /// Restore a file's cells to filler and drop its record.
    ///
    /// # Errors
    /// - `NotFound` if the file has no record
    /// - `CorruptedLayout` if none of its shards verify; the record is kept
    pub async fn delete_file(&self, file_id: &FileId) -> Result<()> {
        let _guard = self.session.locks().acquire(file_id, None).await?;
        let key = self.session.master_key()?;
        let record = self.record(file_id).await?;
        let medium = self.session.medium();
        let _placement = self.session.lock_placement(None).await?;
        let occupied = self.occupancy(file_id, &key, &medium).await?;
        self.session
            .engine()
            .delete(&key, file_id, &record, &occupied, medium.as_ref())
            .await?;
        self.session.switch_record(file_id, None).await?;
        info!(file_id = %file_id, "File deleted");
        Ok(())
    }

    /// Move a file to a fresh layout under a new temporal salt.
    ///
    /// Cancellation is honoured until the new layout is committed. The record
    /// switch and the retirement of the old layout always run after that.
    ///
    /// # Errors
    /// - `LockTimeout` if the file or the placement lock stays busy past
    ///   `lock_timeout`
    /// - `Cancelled` if `cancel` fired before the commit
    /// - `NotFound` if the file has no record
    pub async fn rescatter_file(
        &self,
        file_id: &FileId,
        temporal_salt: u64,
        cancel: &CancellationToken,
        lock_timeout: Option<Duration>,
    ) -> Result<FileRecord> {
        let _guard = self.session.locks().acquire(file_id, lock_timeout).await?;
        let key = self.session.master_key()?;
        let record = self.record(file_id).await?;
        let medium = self.session.medium();
        let _placement = self.session.lock_placement(lock_timeout).await?;
        let occupied = self.occupancy(file_id, &key, &medium).await?;

        let switch = self
            .session
            .engine()
            .stage_rescatter(
                &key,
                file_id,
                &record,
                temporal_salt,
                &occupied,
                medium.as_ref(),
                cancel,
            )
            .await?;
        let record = self
            .commit_switch(file_id, switch, &key, &medium, &occupied)
            .await?;

        info!(file_id = %file_id, generation = record.generation, "File rescattered");
        Ok(record)
    }

    /// Phase 2 of a generation switch.
    async fn commit_switch(
        &self,
        file_id: &FileId,
        switch: GenerationSwitch,
        key: &MasterKey,
        medium: &Arc<dyn StorageMedium>,
        occupied: &Occupancy,
    ) -> Result<FileRecord> {
        let engine = self.session.engine();
        if let Err(e) = self
            .session
            .switch_record(file_id, Some(switch.record.clone()))
            .await
        {
            // the old generation is still authoritative
            if let Err(cleanup) = engine
                .retire(key, &switch.placed, occupied, medium.as_ref())
                .await
            {
                warn!(file_id = %file_id, error = %cleanup, "Failed to retire uncommitted generation");
            }
            return Err(e);
        }
        engine
            .retire(key, &switch.retired, occupied, medium.as_ref())
            .await?;
        Ok(switch.record)
    }

    /// Recompute a file's current layout.
    pub async fn layout(&self, file_id: &FileId) -> Result<ScatterLayout> {
        let _guard = self.session.locks().acquire(file_id, None).await?;
        let key = self.session.master_key()?;
        let record = self.record(file_id).await?;
        self.session
            .engine()
            .layout(&key, file_id, &record, self.session.medium().as_ref())
            .await
    }

    pub async fn list_files(&self) -> Vec<FileId> {
        self.session.list_files().await
    }

    pub async fn file_record(&self, file_id: &FileId) -> Option<FileRecord> {
        self.session.file_record(file_id).await
    }

    pub async fn exists(&self, file_id: &FileId) -> bool {
        self.session.file_record(file_id).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;
    use crate::engine::{EngineConfig, ScatterEngine};
    use crate::store::{MemoryStore, MetadataStore};
    use dimvault_common::VaultId;
    use dimvault_crypto::{KdfParams, KeyMode, MASTER_KEY_LENGTH};
    use dimvault_storage::{MemoryMedium, ShardGroup};

    const MEDIUM_SIZE: u64 = 1 << 20;

    struct Fixture {
        session: Arc<VaultSession>,
        medium: Arc<MemoryMedium>,
        store: Arc<MemoryStore>,
        background: Vec<u8>,
    }

    async fn fixture() -> Fixture {
        fixture_of_size(MEDIUM_SIZE).await
    }

    async fn fixture_of_size(size: u64) -> Fixture {
        let key = MasterKey::from_bytes([0x42; MASTER_KEY_LENGTH]);
        let medium = Arc::new(MemoryMedium::new(size as usize));
        ScatterEngine::default()
            .format(&key, medium.as_ref())
            .await
            .unwrap();
        let background = medium.snapshot().unwrap();

        let config = VaultConfig::new(
            VaultId::new("ops").unwrap(),
            &key,
            KeyMode::UserOnly,
            KdfParams::moderate(),
            "memory",
            serde_json::json!({"size": size}),
            size,
            ShardGroup::default(),
            EngineConfig::default(),
        );
        let store = Arc::new(MemoryStore::new());
        let session =
            VaultSession::from_parts(config, key, medium.clone(), store.clone()).unwrap();
        Fixture {
            session: Arc::new(session),
            medium,
            store,
            background,
        }
    }

    fn id(name: &str) -> FileId {
        FileId::new(name).unwrap()
    }

    fn content(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(seed) ^ seed).collect()
    }

    #[tokio::test]
    async fn test_write_and_read_file() {
        let fx = fixture().await;
        let ops = VaultOperations::new(&fx.session).unwrap();

        let record = ops.write_file(&id("a.txt"), b"Hello, scattered world!").await.unwrap();
        assert_eq!(record.generation, 0);
        assert_eq!(ops.read_file(&id("a.txt")).await.unwrap(), b"Hello, scattered world!");
        assert!(ops.exists(&id("a.txt")).await);

        let stored = fx.store.load().await.unwrap().unwrap();
        assert_eq!(stored.files[&id("a.txt")], record);
    }

    #[tokio::test]
    async fn test_overwrite_moves_generation() {
        let fx = fixture().await;
        let ops = VaultOperations::new(&fx.session).unwrap();

        ops.write_file(&id("a"), &content(5000, 3)).await.unwrap();
        let record = ops.write_file(&id("a"), &content(700, 5)).await.unwrap();
        assert_eq!(record.generation, 1);
        assert_eq!(ops.read_file(&id("a")).await.unwrap(), content(700, 5));

        // only the live generation remains on the medium
        ops.delete_file(&id("a")).await.unwrap();
        assert_eq!(fx.medium.snapshot().unwrap(), fx.background);
    }

    #[tokio::test]
    async fn test_delete_file() {
        let fx = fixture().await;
        let ops = VaultOperations::new(&fx.session).unwrap();

        ops.write_file(&id("a"), &content(3000, 7)).await.unwrap();
        ops.delete_file(&id("a")).await.unwrap();

        assert!(!ops.exists(&id("a")).await);
        assert!(matches!(ops.read_file(&id("a")).await, Err(Error::NotFound(_))));
        assert!(matches!(ops.delete_file(&id("a")).await, Err(Error::NotFound(_))));
        assert_eq!(fx.medium.snapshot().unwrap(), fx.background);
    }

    #[tokio::test]
    async fn test_rescatter_file() {
        let fx = fixture().await;
        let ops = VaultOperations::new(&fx.session).unwrap();
        let data = content(4000, 9);

        ops.write_file(&id("a"), &data).await.unwrap();
        let before = ops.layout(&id("a")).await.unwrap().address_set();

        let record = ops
            .rescatter_file(&id("a"), 1234, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(record.generation, 1);
        assert_eq!(record.temporal_salt, 1234);

        let after = ops.layout(&id("a")).await.unwrap().address_set();
        assert!(before.is_disjoint(&after));
        assert_eq!(ops.read_file(&id("a")).await.unwrap(), data);

        let stored = fx.store.load().await.unwrap().unwrap();
        assert_eq!(stored.files[&id("a")].generation, 1);
    }

    #[tokio::test]
    async fn test_cancelled_rescatter_keeps_record() {
        let fx = fixture().await;
        let ops = VaultOperations::new(&fx.session).unwrap();
        let original = ops.write_file(&id("a"), &content(900, 2)).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = ops.rescatter_file(&id("a"), 1, &cancel, None).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(ops.file_record(&id("a")).await.unwrap(), original);
        assert_eq!(ops.read_file(&id("a")).await.unwrap(), content(900, 2));
    }

    #[tokio::test]
    async fn test_rescatter_lock_timeout() {
        let fx = fixture().await;
        let ops = VaultOperations::new(&fx.session).unwrap();
        ops.write_file(&id("a"), b"busy").await.unwrap();

        let _held = fx.session.locks().acquire(&id("a"), None).await.unwrap();
        let result = ops
            .rescatter_file(
                &id("a"),
                1,
                &CancellationToken::new(),
                Some(Duration::from_millis(20)),
            )
            .await;
        assert!(matches!(result, Err(Error::LockTimeout(_))));
    }

    #[tokio::test]
    async fn test_locked_session_rejects_operations() {
        let fx = fixture().await;
        fx.session.lock();
        assert!(matches!(
            VaultOperations::new(&fx.session),
            Err(Error::NotPermitted(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rescatter_concurrent_with_reads() {
        let fx = fixture().await;
        let data = content(6000, 11);
        VaultOperations::new(&fx.session)
            .unwrap()
            .write_file(&id("a"), &data)
            .await
            .unwrap();

        let rescatters = {
            let session = fx.session.clone();
            tokio::spawn(async move {
                let ops = VaultOperations::new(&session).unwrap();
                for salt in 0..4 {
                    ops.rescatter_file(&id("a"), salt, &CancellationToken::new(), None)
                        .await
                        .unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let session = fx.session.clone();
                let expected = data.clone();
                tokio::spawn(async move {
                    let ops = VaultOperations::new(&session).unwrap();
                    for _ in 0..4 {
                        assert_eq!(ops.read_file(&id("a")).await.unwrap(), expected);
                    }
                })
            })
            .collect();

        rescatters.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        let record = fx.session.file_record(&id("a")).await.unwrap();
        assert_eq!(record.generation, 4);
    }

    #[tokio::test]
    async fn test_files_are_independent() {
        let fx = fixture().await;
        let ops = VaultOperations::new(&fx.session).unwrap();

        ops.write_file(&id("a"), &content(300, 1)).await.unwrap();
        ops.write_file(&id("b"), &content(300, 2)).await.unwrap();
        ops.delete_file(&id("a")).await.unwrap();

        assert_eq!(ops.list_files().await, vec![id("b")]);
        assert_eq!(ops.read_file(&id("b")).await.unwrap(), content(300, 2));
    }

    #[tokio::test]
    async fn test_large_files_survive_each_other() {
        let fx = fixture_of_size(16 << 20).await;
        let ops = VaultOperations::new(&fx.session).unwrap();
        let (a, b) = (content(64 << 10, 3), content(64 << 10, 5));

        ops.write_file(&id("a.bin"), &a).await.unwrap();
        let b_record = ops.write_file(&id("b.bin"), &b).await.unwrap();
        assert!(!b_record.displaced.is_empty());
        let stored = fx.store.load().await.unwrap().unwrap();
        assert_eq!(stored.files[&id("b.bin")].displaced, b_record.displaced);

        assert_eq!(ops.read_file(&id("a.bin")).await.unwrap(), a);
        assert_eq!(ops.read_file(&id("b.bin")).await.unwrap(), b);

        ops.delete_file(&id("a.bin")).await.unwrap();
        assert_eq!(ops.read_file(&id("b.bin")).await.unwrap(), b);

        ops.write_file(&id("a.bin"), &a).await.unwrap();
        ops.rescatter_file(&id("b.bin"), 77, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(ops.read_file(&id("a.bin")).await.unwrap(), a);
        assert_eq!(ops.read_file(&id("b.bin")).await.unwrap(), b);

        ops.delete_file(&id("a.bin")).await.unwrap();
        ops.delete_file(&id("b.bin")).await.unwrap();
        assert_eq!(fx.medium.snapshot().unwrap(), fx.background);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_keep_files_apart() {
        let fx = fixture().await;
        let writers: Vec<_> = (0..4u8)
            .map(|i| {
                let session = fx.session.clone();
                tokio::spawn(async move {
                    let ops = VaultOperations::new(&session).unwrap();
                    let name = format!("w{}", i);
                    ops.write_file(&id(&name), &content(20_000, i + 1))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let ops = VaultOperations::new(&fx.session).unwrap();
        let mut seen = std::collections::HashSet::new();
        for i in 0..4u8 {
            let name = format!("w{}", i);
            assert_eq!(ops.read_file(&id(&name)).await.unwrap(), content(20_000, i + 1));
            let cells = ops.layout(&id(&name)).await.unwrap();
            for address in cells.addresses() {
                assert!(seen.insert(address), "cell {} shared", address);
            }
        }
    }
}
