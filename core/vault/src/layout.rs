//! File records and in-memory scatter layouts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use dimvault_addressing::PhysicalAddress;
use dimvault_storage::{ShardGroup, TRAILER_LEN};

/// Non-secret metadata of one scattered file.
///
/// Everything needed to recompute the layout from the key, and nothing
/// more. The layout itself is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// True plaintext length in bytes.
    pub plaintext_len: u64,
    /// Redundancy parameters.
    pub group: ShardGroup,
    /// Length of every shard before the integrity trailer.
    pub shard_len: u64,
    /// Rescatter epoch; selects the lane generation.
    pub generation: u64,
    /// Salt absorbed by the TEMPORAL axis.
    pub temporal_salt: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Units moved off cells held by other files when this generation was
    /// placed, in placement order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub displaced: Vec<Displacement>,
}

/// A unit that skipped free probe positions because another file held them.
///
/// Carries unit indices only; the cells themselves are recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Displacement {
    pub shard: u16,
    pub unit: u64,
    /// Unclaimed probe positions passed over before the one taken.
    pub skip: u32,
}

impl FileRecord {
    pub fn new(plaintext_len: usize, group: ShardGroup, generation: u64, temporal_salt: u64) -> Self {
        let now = Utc::now();
        Self {
            plaintext_len: plaintext_len as u64,
            group,
            shard_len: group.shard_len(plaintext_len) as u64,
            generation,
            temporal_salt,
            created_at: now,
            modified_at: now,
            displaced: Vec::new(),
        }
    }

    /// Record of the same content in the next generation.
    pub fn next_generation(&self, temporal_salt: u64) -> Self {
        Self {
            generation: self.generation + 1,
            temporal_salt,
            modified_at: Utc::now(),
            displaced: Vec::new(),
            ..self.clone()
        }
    }

    /// Units per shard stream, trailer included.
    pub fn stream_len(&self) -> u64 {
        self.shard_len.saturating_add(TRAILER_LEN as u64)
    }

    /// Lanes the medium is split into for this file.
    ///
    /// One lane per shard and generation parity, so shards of one file never
    /// share a cell.
    pub fn lanes(&self) -> u64 {
        2 * self.group.total() as u64
    }

    /// Lane of one shard. Its low bit is the generation parity, so every real
    /// cell of a generation has that parity whatever the shard group.
    pub fn lane(&self, shard: usize) -> u64 {
        2 * shard as u64 + self.generation % 2
    }

    /// Recorded skips of one shard, by unit.
    pub(crate) fn skips(&self, shard: usize) -> HashMap<u64, u32> {
        self.displaced
            .iter()
            .filter(|d| d.shard as usize == shard)
            .map(|d| (d.unit, d.skip))
            .collect()
    }
}

/// Real cells of the other live files on a medium.
///
/// Placement keeps clear of these cells and wipes leave them alone.
#[derive(Clone, Default)]
pub struct Occupancy {
    cells: HashSet<PhysicalAddress>,
}

impl Occupancy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, address: PhysicalAddress) -> bool {
        self.cells.contains(&address)
    }

    pub fn extend(&mut self, cells: impl IntoIterator<Item = PhysicalAddress>) {
        self.cells.extend(cells);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl fmt::Debug for Occupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Occupancy")
            .field("cells", &self.cells.len())
            .finish()
    }
}

/// Real cells of one shard stream, in unit order.
#[derive(Clone)]
pub struct ShardLayout {
    pub(crate) addresses: Vec<PhysicalAddress>,
    pub(crate) complete: bool,
}

impl ShardLayout {
    pub fn addresses(&self) -> &[PhysicalAddress] {
        &self.addresses
    }

    /// False when the shard failed verification and only its bootstrap
    /// prefix could be located.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Per-shard real addresses of a file.
///
/// Recomputed on every access and held only in memory. Deliberately not
/// serializable.
#[derive(Clone)]
pub struct ScatterLayout {
    pub(crate) generation: u64,
    pub(crate) shards: Vec<ShardLayout>,
}

impl ScatterLayout {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn shards(&self) -> &[ShardLayout] {
        &self.shards
    }

    pub fn is_complete(&self) -> bool {
        self.shards.iter().all(|s| s.complete)
    }

    /// All real addresses.
    pub fn addresses(&self) -> impl Iterator<Item = PhysicalAddress> + '_ {
        self.shards.iter().flat_map(|s| s.addresses.iter().copied())
    }

    pub fn address_set(&self) -> HashSet<PhysicalAddress> {
        self.addresses().collect()
    }

    pub fn real_cells(&self) -> usize {
        self.shards.iter().map(|s| s.addresses.len()).sum()
    }
}

impl fmt::Debug for ScatterLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScatterLayout")
            .field("generation", &self.generation)
            .field("shards", &self.shards.len())
            .field("cells", &self.real_cells())
            .finish()
    }
}

impl fmt::Debug for ShardLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardLayout")
            .field("cells", &self.addresses.len())
            .field("complete", &self.complete)
            .finish()
    }
}
