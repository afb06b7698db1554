//! Local-file storage medium.

use async_trait::async_trait;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::journal::{Journal, JournalEntry};
use crate::medium::{check_range, SealedBatch, StorageMedium, BLOCK_SIZE};
use dimvault_common::{Error, Result};

/// Fixed-size medium backed by a single local file.
///
/// Batches are journaled before they touch the file, so a crash during a
/// commit is completed on the next open.
pub struct FileMedium {
    path: PathBuf,
    size: u64,
    file: Mutex<File>,
    journal: Journal,
}

impl FileMedium {
    /// Create a new zero-filled medium file.
    ///
    /// # Preconditions
    /// - `path` must not exist
    /// - `size` must be non-zero
    ///
    /// # Errors
    /// - File already exists
    /// - Permission denied
    pub fn create(path: impl AsRef<Path>, size: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if size == 0 {
            return Err(Error::InvalidInput(
                "Medium size must be greater than zero".to_string(),
            ));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    Error::AlreadyExists(format!("Medium file exists: {}", path.display()))
                }
                _ => Error::Io(e),
            })?;
        file.set_len(size)?;
        file.sync_all()?;

        info!(path = %path.display(), size, "Created medium file");
        Ok(Self::from_std(path, size, file))
    }

    /// Open an existing medium file, replaying an interrupted commit.
    ///
    /// # Errors
    /// - File not found
    /// - Journal replay fails
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Error::NotFound(format!("Medium file not found: {}", path.display()))
                }
                _ => Error::Io(e),
            })?;
        let size = file.metadata()?.len();

        let journal = Journal::for_medium(&path);
        if let Some(entries) = journal.load_pending()? {
            for entry in &entries {
                check_range(size, entry.offset, entry.data.len())?;
                file.seek(SeekFrom::Start(entry.offset))?;
                file.write_all(&entry.data)?;
            }
            file.sync_all()?;
            journal.discard()?;
            info!(path = %path.display(), blocks = entries.len(), "Replayed commit journal");
        }

        Ok(Self::from_std(path, size, file))
    }

    /// Open `path` if it exists, otherwise create it with `size` cells.
    ///
    /// # Errors
    /// - An existing file has a different size
    pub fn open_or_create(path: impl AsRef<Path>, size: u64) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Self::create(path, size);
        }
        let medium = Self::open(path)?;
        if medium.size != size {
            return Err(Error::InvalidInput(format!(
                "Medium file has {} cells, expected {}",
                medium.size, size
            )));
        }
        Ok(medium)
    }

    fn from_std(path: PathBuf, size: u64, file: std::fs::File) -> Self {
        let journal = Journal::for_medium(&path);
        Self {
            path,
            size,
            file: Mutex::new(File::from_std(file)),
            journal,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn read_at(file: &mut File, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    file.seek(SeekFrom::Start(offset)).await?;
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_at(file: &mut File, offset: u64, data: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset)).await?;
    file.write_all(data).await?;
    Ok(())
}

#[async_trait]
impl StorageMedium for FileMedium {
    fn name(&self) -> &str {
        "local"
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        check_range(self.size, offset, len)?;
        let mut file = self.file.lock().await;
        read_at(&mut file, offset, len).await
    }

    async fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        check_range(self.size, offset, data.len())?;
        let mut file = self.file.lock().await;
        write_at(&mut file, offset, data).await
    }

    async fn flush(&self) -> Result<()> {
        let file = self.file.lock().await;
        file.sync_data().await?;
        Ok(())
    }

    /// Journaled commit.
    ///
    /// # Postconditions
    /// - Every touched block is rewritten from its post-image
    /// - The journal is removed once the file is synced
    async fn apply(&self, batch: &SealedBatch) -> Result<()> {
        batch.check_bounds(self.size)?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut file = self.file.lock().await;
        let mut entries = Vec::new();
        for (block, range) in batch.blocks() {
            let start = block * BLOCK_SIZE;
            let len = BLOCK_SIZE.min(self.size - start) as usize;
            let mut data = read_at(&mut file, start, len).await?;
            batch.apply_to_block(block, range, &mut data);
            entries.push(JournalEntry {
                offset: start,
                data,
            });
        }

        self.journal.record(&entries).await?;
        for entry in &entries {
            write_at(&mut file, entry.offset, &entry.data).await?;
        }
        file.sync_data().await?;
        self.journal.clear().await?;

        debug!(blocks = entries.len(), "Committed batch to medium file");
        Ok(())
    }
}
