//! Vault engine for DimVault.
//!
//! This module provides:
//! - The scatter/gather engine that places files on a medium by key-derived
//!   coordinates and reads them back
//! - Generation switches for rewrites and temporal rescatter
//! - Vault creation, unlock/lock and metadata persistence
//! - Per-file locking for concurrent foreground and background work
//!
//! # Architecture
//! The vault sits between the presentation layer and a storage medium. It
//! persists only non-secret file records; every layout is recomputed from
//! the master key on access.

pub mod config;
pub mod engine;
pub mod layout;
pub mod locks;
pub mod manager;
pub mod operations;
pub mod session;
pub mod store;

pub use config::{VaultConfig, VaultVersion};
pub use engine::{EngineConfig, GenerationSwitch, ScatterEngine};
pub use layout::{Displacement, FileRecord, Occupancy, ScatterLayout, ShardLayout};
pub use locks::{FileGuard, FileLocks};
pub use manager::{VaultManager, VaultOptions};
pub use operations::VaultOperations;
pub use session::{SessionHandle, SessionState, VaultSession};
pub use store::{JsonFileStore, MemoryStore, MetadataStore};
