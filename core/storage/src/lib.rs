//! Storage medium abstraction for DimVault.
//!
//! This module provides:
//! - The `StorageMedium` trait: a fixed-size array of byte cells
//! - Write batches committed to a medium as one operation
//! - In-memory and journaled local-file backends
//! - A registry resolving backends by name and JSON configuration
//! - Reed-Solomon redundancy and per-shard integrity trailers
//!
//! # Design Principles
//! - Backends know nothing about keys, files or layouts
//! - A committed batch is either fully applied or not at all
//! - All I/O operations are async

pub mod erasure;
pub mod file;
pub mod journal;
pub mod medium;
pub mod memory;
pub mod registry;

pub use erasure::{open_shard, seal_shard, RedundancyCodec, ShardGroup, TRAILER_LEN};
pub use file::FileMedium;
pub use journal::{Journal, JournalEntry};
pub use medium::{CellWrite, SealedBatch, StorageMedium, WriteBatch, BLOCK_SIZE};
pub use memory::MemoryMedium;
pub use registry::{create_default_registry, MediumFactory, MediumRegistry};
