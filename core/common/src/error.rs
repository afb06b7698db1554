//! Common error types for DimVault.
//!
//! Messages carried by these variants must never contain key material,
//! plaintext, coordinates or physical addresses.

use thiserror::Error;

/// Top-level error type for DimVault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The key mode requires a factor that was not supplied.
    #[error("Missing key input: {0}")]
    MissingInput(String),

    /// A key factor was rejected by the configured policy.
    #[error("Weak key input: {0}")]
    WeakInput(String),

    /// Too few intact shards remain to rebuild the data.
    #[error("Insufficient shards: {available} available, {required} required")]
    InsufficientShards { available: usize, required: usize },

    /// The recomputed layout does not resolve to valid data.
    ///
    /// Usually a key mismatch or wholesale medium corruption.
    #[error("Corrupted layout: {0}")]
    CorruptedLayout(String),

    /// The per-file lock could not be acquired in time.
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    /// The operation was cancelled before it committed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Vault operation failed.
    #[error("Vault error: {0}")]
    Vault(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not permitted.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Whether the caller may simply try again later.
    ///
    /// Only lock contention qualifies; data loss and layout corruption
    /// reread the same cells and would fail the same way.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::LockTimeout(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
