//! In-memory storage medium for testing.

use async_trait::async_trait;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::medium::{check_range, SealedBatch, StorageMedium};
use dimvault_common::{Error, Result};

/// In-memory storage medium.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. A batch is applied under a single write lock.
pub struct MemoryMedium {
    cells: RwLock<Vec<u8>>,
}

impl MemoryMedium {
    /// Create a zero-filled medium of `size` cells.
    pub fn new(size: usize) -> Self {
        Self::from_bytes(vec![0u8; size])
    }

    /// Wrap existing cell contents.
    pub fn from_bytes(cells: Vec<u8>) -> Self {
        Self {
            cells: RwLock::new(cells),
        }
    }

    /// Copy of the whole medium.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        Ok(self.read_guard()?.clone())
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, Vec<u8>>> {
        self.cells
            .read()
            .map_err(|_| Error::Storage("Memory medium lock poisoned".to_string()))
    }

    fn write_guard(&self) -> Result<RwLockWriteGuard<'_, Vec<u8>>> {
        self.cells
            .write()
            .map_err(|_| Error::Storage("Memory medium lock poisoned".to_string()))
    }
}

#[async_trait]
impl StorageMedium for MemoryMedium {
    fn name(&self) -> &str {
        "memory"
    }

    fn size(&self) -> u64 {
        self.read_guard().map(|cells| cells.len() as u64).unwrap_or(0)
    }

    async fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let cells = self.read_guard()?;
        check_range(cells.len() as u64, offset, len)?;
        let start = offset as usize;
        Ok(cells[start..start + len].to_vec())
    }

    async fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut cells = self.write_guard()?;
        check_range(cells.len() as u64, offset, data.len())?;
        let start = offset as usize;
        cells[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    async fn read_cells(&self, addresses: &[u64]) -> Result<Vec<u8>> {
        let cells = self.read_guard()?;
        addresses
            .iter()
            .map(|&address| {
                cells.get(address as usize).copied().ok_or_else(|| {
                    Error::InvalidInput("Cell address exceeds the medium size".to_string())
                })
            })
            .collect()
    }

    async fn apply(&self, batch: &SealedBatch) -> Result<()> {
        let mut cells = self.write_guard()?;
        batch.check_bounds(cells.len() as u64)?;
        for (address, write) in batch.cells() {
            if let crate::medium::CellWrite::Put(value) = write {
                cells[*address as usize] = *value;
            }
        }
        Ok(())
    }
}
