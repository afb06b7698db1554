//! Storage medium trait and write batches.

use async_trait::async_trait;
use std::fmt;
use std::ops::Range;

use dimvault_common::{Error, Result};

/// Granularity of block-wise medium access.
pub const BLOCK_SIZE: u64 = 4096;

/// What a batch does to one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellWrite {
    /// Store this byte.
    Put(u8),
    /// Rewrite the cell with the value it holds at commit time.
    Touch,
}

/// Cell writes collected before a commit.
#[derive(Default)]
pub struct WriteBatch {
    cells: Vec<(u64, CellWrite)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    pub fn put(&mut self, address: u64, value: u8) {
        self.cells.push((address, CellWrite::Put(value)));
    }

    pub fn touch(&mut self, address: u64) {
        self.cells.push((address, CellWrite::Touch));
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Sort by address and merge duplicates.
    ///
    /// For one address the last `Put` wins, and any `Put` wins over `Touch`.
    pub fn seal(mut self) -> SealedBatch {
        self.cells.sort_by_key(|(address, _)| *address);
        let mut cells: Vec<(u64, CellWrite)> = Vec::with_capacity(self.cells.len());
        for (address, write) in self.cells {
            match cells.last_mut() {
                Some(last) if last.0 == address => {
                    if let CellWrite::Put(_) = write {
                        last.1 = write;
                    }
                }
                _ => cells.push((address, write)),
            }
        }
        SealedBatch { cells }
    }
}

impl fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WriteBatch({} cells)", self.cells.len())
    }
}

/// Address-ordered batch with one write per cell.
pub struct SealedBatch {
    cells: Vec<(u64, CellWrite)>,
}

impl SealedBatch {
    pub fn cells(&self) -> &[(u64, CellWrite)] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn puts(&self) -> usize {
        self.cells
            .iter()
            .filter(|(_, w)| matches!(w, CellWrite::Put(_)))
            .count()
    }

    pub fn touches(&self) -> usize {
        self.len() - self.puts()
    }

    /// Check that every cell lies inside a medium of `size` cells.
    pub fn check_bounds(&self, size: u64) -> Result<()> {
        match self.cells.last() {
            Some((address, _)) if *address >= size => Err(Error::InvalidInput(
                "Write batch exceeds the medium size".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Group cells by medium block.
    ///
    /// Yields `(block index, range into cells())` in address order.
    pub fn blocks(&self) -> Vec<(u64, Range<usize>)> {
        let mut groups: Vec<(u64, Range<usize>)> = Vec::new();
        for (i, (address, _)) in self.cells.iter().enumerate() {
            let block = address / BLOCK_SIZE;
            match groups.last_mut() {
                Some((current, range)) if *current == block => range.end = i + 1,
                _ => groups.push((block, i..i + 1)),
            }
        }
        groups
    }

    /// Apply the cells of one block group to a buffer holding that block.
    pub fn apply_to_block(&self, block: u64, range: Range<usize>, buf: &mut [u8]) {
        let start = block * BLOCK_SIZE;
        for (address, write) in &self.cells[range] {
            if let CellWrite::Put(value) = write {
                buf[(address - start) as usize] = *value;
            }
        }
    }
}

impl fmt::Debug for SealedBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedBatch")
            .field("puts", &self.puts())
            .field("touches", &self.touches())
            .finish()
    }
}

/// A fixed-size array of byte cells.
///
/// Implementations must be safe to share across tasks. `apply` must commit
/// a batch as a unit: readers never observe part of it, and a crash either
/// loses it entirely or lets it be completed on reopen.
#[async_trait]
pub trait StorageMedium: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    /// Number of cells.
    fn size(&self) -> u64;

    /// Read `len` cells starting at `offset`.
    ///
    /// # Errors
    /// - Range exceeds the medium
    /// - I/O failure
    async fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Write cells starting at `offset`.
    ///
    /// # Errors
    /// - Range exceeds the medium
    /// - I/O failure
    async fn write(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Make previous writes durable.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Read scattered cells, one block read per touched block.
    ///
    /// The result is in the order of `addresses`.
    async fn read_cells(&self, addresses: &[u64]) -> Result<Vec<u8>> {
        let size = self.size();
        let mut order: Vec<usize> = (0..addresses.len()).collect();
        order.sort_unstable_by_key(|&i| addresses[i]);

        let mut out = vec![0u8; addresses.len()];
        let mut cached: Option<(u64, Vec<u8>)> = None;
        for i in order {
            let address = addresses[i];
            if address >= size {
                return Err(Error::InvalidInput(
                    "Cell address exceeds the medium size".to_string(),
                ));
            }
            let block = address / BLOCK_SIZE;
            let start = block * BLOCK_SIZE;
            if cached.as_ref().map(|(b, _)| *b) != Some(block) {
                let len = BLOCK_SIZE.min(size - start) as usize;
                cached = Some((block, self.read(start, len).await?));
            }
            if let Some((_, data)) = &cached {
                out[i] = data[(address - start) as usize];
            }
        }
        Ok(out)
    }

    /// Commit a batch with block-wise read-modify-write.
    ///
    /// Backends override this to make the commit atomic.
    async fn apply(&self, batch: &SealedBatch) -> Result<()> {
        let size = self.size();
        batch.check_bounds(size)?;
        for (block, range) in batch.blocks() {
            let start = block * BLOCK_SIZE;
            let len = BLOCK_SIZE.min(size - start) as usize;
            let mut buf = self.read(start, len).await?;
            batch.apply_to_block(block, range, &mut buf);
            self.write(start, &buf).await?;
        }
        Ok(())
    }
}

/// Reject ranges outside a medium of `size` cells.
pub(crate) fn check_range(size: u64, offset: u64, len: usize) -> Result<()> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::InvalidInput(format!(
            "Range of {} cells exceeds the medium size",
            len
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_orders_and_merges() {
        let mut batch = WriteBatch::new();
        batch.put(9, 1);
        batch.touch(3);
        batch.put(3, 7);
        batch.touch(3);
        batch.put(9, 2);
        batch.touch(1);

        let sealed = batch.seal();
        assert_eq!(
            sealed.cells(),
            &[
                (1, CellWrite::Touch),
                (3, CellWrite::Put(7)),
                (9, CellWrite::Put(2)),
            ]
        );
        assert_eq!(sealed.puts(), 2);
        assert_eq!(sealed.touches(), 1);
    }

    #[test]
    fn test_blocks_group_by_block() {
        let mut batch = WriteBatch::new();
        for address in [5, BLOCK_SIZE - 1, BLOCK_SIZE, 3 * BLOCK_SIZE + 2] {
            batch.put(address, 0);
        }
        let sealed = batch.seal();
        assert_eq!(sealed.blocks(), vec![(0, 0..2), (1, 2..3), (3, 3..4)]);
    }

    #[test]
    fn test_bounds() {
        let mut batch = WriteBatch::new();
        batch.put(99, 0);
        let sealed = batch.seal();
        assert!(sealed.check_bounds(100).is_ok());
        assert!(sealed.check_bounds(99).is_err());
        assert!(WriteBatch::new().seal().check_bounds(0).is_ok());

        assert!(check_range(10, 5, 5).is_ok());
        assert!(check_range(10, 5, 6).is_err());
        assert!(check_range(10, u64::MAX, 2).is_err());
    }

    #[test]
    fn test_debug_shows_counts_only() {
        let mut batch = WriteBatch::new();
        batch.put(1234, 0xab);
        batch.touch(77);
        assert_eq!(format!("{:?}", batch), "WriteBatch(2 cells)");
        let rendered = format!("{:?}", batch.seal());
        assert!(!rendered.contains("1234"));
        assert!(rendered.contains("puts: 1"));
    }
}
