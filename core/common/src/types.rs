//! Common types used throughout DimVault.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Unique identifier for a vault.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VaultId(String);

impl VaultId {
    /// Create a new VaultId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "VaultId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable, vault-unique identifier of a scattered file.
///
/// This is the identity the presentation layer hands to the engine, not a
/// display path. Every coordinate of the file is bound to it, so two files
/// never share addressing streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    /// Maximum identifier length in bytes.
    pub const MAX_LEN: usize = 255;

    /// Create a new FileId.
    ///
    /// # Preconditions
    /// - `id` must be non-empty and at most [`FileId::MAX_LEN`] bytes
    ///
    /// # Errors
    /// - Returns error if id is empty or too long
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "FileId cannot be empty".to_string(),
            ));
        }
        if id.len() > Self::MAX_LEN {
            return Err(crate::Error::InvalidInput(format!(
                "FileId longer than {} bytes",
                Self::MAX_LEN
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the identifier bytes fed into key-dependent derivations.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SensitiveBytes {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_vault_id_creation() {
        let id = VaultId::new("test-vault").unwrap();
        assert_eq!(id.as_str(), "test-vault");
    }

    #[test]
    fn test_vault_id_empty_fails() {
        assert!(VaultId::new("").is_err());
    }

    #[test]
    fn test_file_id_bounds() {
        assert!(FileId::new("").is_err());
        assert!(FileId::new("x".repeat(FileId::MAX_LEN + 1)).is_err());
        assert!(FileId::new("x".repeat(FileId::MAX_LEN)).is_ok());
    }

    #[test]
    fn test_sensitive_bytes_debug_is_redacted() {
        let secret = SensitiveBytes::from("correct-horse-battery");
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("horse"));
        assert!(rendered.contains("21 bytes"));
    }

    proptest! {
        #[test]
        fn prop_file_id_preserves_bytes(id in "[a-zA-Z0-9/._-]{1,64}") {
            let file_id = FileId::new(id.clone()).unwrap();
            prop_assert_eq!(file_id.as_bytes(), id.as_bytes());
            prop_assert_eq!(file_id.to_string(), id);
        }
    }
}
