//! Reed-Solomon redundancy and shard integrity trailers.

use reed_solomon_erasure::galois_8::ReedSolomon;
use serde::{Deserialize, Serialize};

use dimvault_common::{Error, Result};

/// Maximum number of shards in one group.
pub const MAX_SHARDS: usize = 256;

/// Length of the integrity trailer appended to each shard stream.
pub const TRAILER_LEN: usize = 4;

/// Data and parity shard counts of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardGroup {
    pub n_data: usize,
    pub n_parity: usize,
}

impl ShardGroup {
    /// # Errors
    /// - `n_data` is zero
    /// - More than [`MAX_SHARDS`] shards in total
    pub fn new(n_data: usize, n_parity: usize) -> Result<Self> {
        let group = Self { n_data, n_parity };
        group.validate()?;
        Ok(group)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_data == 0 {
            return Err(Error::InvalidInput(
                "At least one data shard is required".to_string(),
            ));
        }
        if self.total() > MAX_SHARDS {
            return Err(Error::InvalidInput(format!(
                "At most {} shards per group",
                MAX_SHARDS
            )));
        }
        Ok(())
    }

    pub fn total(&self) -> usize {
        self.n_data + self.n_parity
    }

    /// Uniform shard length for a plaintext of `len` bytes (at least 1).
    pub fn shard_len(&self, len: usize) -> usize {
        len.div_ceil(self.n_data).max(1)
    }
}

impl Default for ShardGroup {
    fn default() -> Self {
        Self {
            n_data: 4,
            n_parity: 2,
        }
    }
}

/// Splits plaintext into shards and rebuilds it from any `n_data` of them.
pub struct RedundancyCodec {
    group: ShardGroup,
    rs: Option<ReedSolomon>,
}

impl RedundancyCodec {
    /// # Errors
    /// - Invalid group parameters
    pub fn new(group: ShardGroup) -> Result<Self> {
        group.validate()?;
        let rs = if group.n_parity > 0 {
            Some(
                ReedSolomon::new(group.n_data, group.n_parity)
                    .map_err(|e| Error::InvalidInput(format!("Invalid shard group: {:?}", e)))?,
            )
        } else {
            None
        };
        Ok(Self { group, rs })
    }

    pub fn group(&self) -> ShardGroup {
        self.group
    }

    /// Encode plaintext into `n_data + n_parity` equal-length shards.
    ///
    /// The last data shard is zero-padded.
    pub fn encode(&self, plaintext: &[u8]) -> Result<Vec<Vec<u8>>> {
        let shard_len = self.group.shard_len(plaintext.len());
        let mut shards: Vec<Vec<u8>> = (0..self.group.total())
            .map(|i| {
                let mut shard = vec![0u8; shard_len];
                if i < self.group.n_data {
                    let start = (i * shard_len).min(plaintext.len());
                    let end = (start + shard_len).min(plaintext.len());
                    shard[..end - start].copy_from_slice(&plaintext[start..end]);
                }
                shard
            })
            .collect();

        if let Some(rs) = &self.rs {
            rs.encode(&mut shards)
                .map_err(|e| Error::Storage(format!("Redundancy encoding failed: {:?}", e)))?;
        }
        Ok(shards)
    }

    /// Rebuild plaintext from the surviving shards.
    ///
    /// `shards[i]` is shard `i` or `None` if it was lost.
    ///
    /// # Errors
    /// - `InsufficientShards` if fewer than `n_data` shards survive
    /// - `InvalidInput` on a wrong shard count or uneven shard lengths
    pub fn decode(&self, mut shards: Vec<Option<Vec<u8>>>, plaintext_len: usize) -> Result<Vec<u8>> {
        if shards.len() != self.group.total() {
            return Err(Error::InvalidInput(format!(
                "Expected {} shards, got {}",
                self.group.total(),
                shards.len()
            )));
        }
        let shard_len = self.group.shard_len(plaintext_len);
        if shards.iter().flatten().any(|s| s.len() != shard_len) {
            return Err(Error::InvalidInput("Shard length mismatch".to_string()));
        }

        let available = shards.iter().filter(|s| s.is_some()).count();
        if available < self.group.n_data {
            return Err(Error::InsufficientShards {
                available,
                required: self.group.n_data,
            });
        }

        let data_missing = shards[..self.group.n_data].iter().any(|s| s.is_none());
        if data_missing {
            let rs = self.rs.as_ref().ok_or(Error::InsufficientShards {
                available,
                required: self.group.total(),
            })?;
            rs.reconstruct_data(&mut shards)
                .map_err(|e| Error::CorruptedLayout(format!("Reconstruction failed: {:?}", e)))?;
        }

        let mut plaintext = Vec::with_capacity(shard_len * self.group.n_data);
        for shard in shards.into_iter().take(self.group.n_data).flatten() {
            plaintext.extend_from_slice(&shard);
        }
        plaintext.truncate(plaintext_len);
        Ok(plaintext)
    }

    /// Rebuild plaintext from `(shard index, shard)` pairs.
    pub fn decode_indexed(
        &self,
        present: Vec<(usize, Vec<u8>)>,
        plaintext_len: usize,
    ) -> Result<Vec<u8>> {
        let mut shards = vec![None; self.group.total()];
        for (index, shard) in present {
            let slot = shards
                .get_mut(index)
                .ok_or_else(|| Error::InvalidInput(format!("Shard index {} out of range", index)))?;
            *slot = Some(shard);
        }
        self.decode(shards, plaintext_len)
    }
}

/// Append the integrity trailer: CRC-32 over (index ‖ shard), little-endian.
pub fn seal_shard(index: u16, shard: &[u8]) -> Vec<u8> {
    let mut stream = Vec::with_capacity(shard.len() + TRAILER_LEN);
    stream.extend_from_slice(shard);
    stream.extend_from_slice(&shard_crc(index, shard).to_le_bytes());
    stream
}

/// Verify and strip the trailer. `None` means the shard is damaged.
pub fn open_shard(index: u16, stream: &[u8]) -> Option<&[u8]> {
    let split = stream.len().checked_sub(TRAILER_LEN)?;
    let (shard, trailer) = stream.split_at(split);
    (shard_crc(index, shard).to_le_bytes() == trailer).then_some(shard)
}

fn shard_crc(index: u16, shard: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&index.to_le_bytes());
    hasher.update(shard);
    hasher.finalize()
}
