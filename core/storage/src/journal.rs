//! Commit journal for the local-file medium.
//!
//! Before a batch touches the medium file, the post-images of every affected
//! block are written next to it. A crash mid-commit leaves a complete journal
//! behind, which the next open replays; a torn journal is discarded and the
//! medium keeps its pre-commit contents.
//!
//! File format (little-endian):
//!
//! ```text
//! "DVJ1" | entry count u32 | { offset u64 | len u32 | bytes }* | crc32 u32
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use dimvault_common::{Error, Result};

const MAGIC: &[u8; 4] = b"DVJ1";

/// One block image to be written at `offset`.
#[derive(Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub offset: u64,
    pub data: Vec<u8>,
}

impl fmt::Debug for JournalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JournalEntry")
            .field("offset", &self.offset)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Journal file belonging to one medium file.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    /// Journal stored alongside `medium_path`.
    pub fn for_medium(medium_path: &Path) -> Self {
        let mut name = medium_path.as_os_str().to_os_string();
        name.push(".journal");
        Self {
            path: PathBuf::from(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Durably record the block images of a commit.
    ///
    /// # Postconditions
    /// - The journal file is complete or absent, never partial
    pub async fn record(&self, entries: &[JournalEntry]) -> Result<()> {
        let tmp = self.tmp_path();
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&encode(entries)).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Remove the journal after a completed commit.
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Load a journal left behind by an interrupted commit.
    ///
    /// Returns `None` when there is nothing to replay. Torn or damaged
    /// journals are removed.
    pub fn load_pending(&self) -> Result<Option<Vec<JournalEntry>>> {
        let _ = std::fs::remove_file(self.tmp_path());
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        match decode(&bytes) {
            Some(entries) => Ok(Some(entries)),
            None => {
                warn!(journal = %self.path.display(), "Discarding damaged commit journal");
                self.discard()?;
                Ok(None)
            }
        }
    }

    /// Remove the journal synchronously.
    pub fn discard(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

fn encode(entries: &[JournalEntry]) -> Vec<u8> {
    let body: usize = entries.iter().map(|e| 12 + e.data.len()).sum();
    let mut out = Vec::with_capacity(12 + body);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for entry in entries {
        out.extend_from_slice(&entry.offset.to_le_bytes());
        out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&entry.data);
    }
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

fn decode(bytes: &[u8]) -> Option<Vec<JournalEntry>> {
    let (body, trailer) = bytes.split_at(bytes.len().checked_sub(4)?);
    if crc32fast::hash(body).to_le_bytes() != trailer {
        return None;
    }
    let mut reader = Reader { bytes: body };
    if reader.take(4)? != MAGIC {
        return None;
    }
    let count = u32::from_le_bytes(reader.take(4)?.try_into().ok()?);
    let mut entries = Vec::new();
    for _ in 0..count {
        let offset = u64::from_le_bytes(reader.take(8)?.try_into().ok()?);
        let len = u32::from_le_bytes(reader.take(4)?.try_into().ok()?) as usize;
        let data = reader.take(len)?.to_vec();
        entries.push(JournalEntry { offset, data });
    }
    reader.bytes.is_empty().then_some(entries)
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.bytes.len() < n {
            return None;
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Some(head)
    }
}
