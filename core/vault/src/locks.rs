//! Per-file mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use dimvault_common::{Error, FileId, Result};

/// Guard held for the duration of one file operation.
pub type FileGuard = OwnedMutexGuard<()>;

/// One async lock per file id.
///
/// Scatter, gather, delete and rescatter of a file serialize on its lock;
/// different files proceed concurrently.
#[derive(Debug, Default)]
pub struct FileLocks {
    locks: Mutex<HashMap<FileId, Arc<AsyncMutex<()>>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, file_id: &FileId) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::Vault("File lock table poisoned".to_string()))?;
        // drop entries nobody holds or waits on
        locks.retain(|id, lock| id == file_id || Arc::strong_count(lock) > 1);
        Ok(locks
            .entry(file_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    /// Acquire the lock of `file_id`, waiting at most `timeout` if given.
    ///
    /// # Errors
    /// - `LockTimeout` if the lock is still held when the timeout expires
    pub async fn acquire(&self, file_id: &FileId, timeout: Option<Duration>) -> Result<FileGuard> {
        let lock = self.slot(file_id)?;
        match timeout {
            None => Ok(lock.lock_owned().await),
            Some(limit) => tokio::time::timeout(limit, lock.lock_owned())
                .await
                .map_err(|_| Error::LockTimeout(format!("File '{}' is busy", file_id))),
        }
    }

    /// Number of tracked lock entries.
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> FileId {
        FileId::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_same_file_times_out() {
        let locks = FileLocks::new();
        let _held = locks.acquire(&id("a"), None).await.unwrap();

        let result = locks
            .acquire(&id("a"), Some(Duration::from_millis(20)))
            .await;
        assert!(matches!(result, Err(Error::LockTimeout(_))));
    }

    #[tokio::test]
    async fn test_different_files_independent() {
        let locks = FileLocks::new();
        let _a = locks.acquire(&id("a"), None).await.unwrap();
        let b = locks.acquire(&id("b"), Some(Duration::from_millis(20))).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_released_lock_reacquired_and_pruned() {
        let locks = FileLocks::new();
        drop(locks.acquire(&id("a"), None).await.unwrap());
        drop(locks.acquire(&id("b"), None).await.unwrap());
        assert!(locks
            .acquire(&id("a"), Some(Duration::from_millis(20)))
            .await
            .is_ok());
        // "b" was idle when "a" was acquired again
        assert_eq!(locks.len(), 1);
    }
}
