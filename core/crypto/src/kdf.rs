//! Hybrid key derivation using Argon2id.
//!
//! The master key is derived from a device fingerprint, a passphrase, or
//! both, depending on the vault's [`KeyMode`]:
//!
//! ```text
//! salt   = HMAC-SHA256(fingerprint_or_constant, domain_tag)
//! master = Argon2id(SHA-256(passphrase_or_fingerprint), salt) -> 64 bytes
//! ```
//!
//! Derivation is deterministic. The fingerprint, not a random salt, is what
//! makes two machines derive different keys from the same passphrase.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::keys::{MasterKey, MASTER_KEY_LENGTH};
use crate::prf::hmac_sha256;
use dimvault_common::{Error, Result, SensitiveBytes};

/// HMAC key standing in for the fingerprint in modes that do not use one.
const NO_DEVICE_KEY: &[u8] = b"dimvault/no-device/v1";

/// Which key factors feed the derivation.
///
/// Fixed at vault creation and stored (non-secret) in vault metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyMode {
    /// Passphrase bound to this device.
    Hybrid,
    /// Device fingerprint only.
    DeviceOnly,
    /// Passphrase only; portable across machines.
    UserOnly,
}

impl KeyMode {
    fn domain_tag(self) -> &'static [u8] {
        match self {
            KeyMode::Hybrid => b"dimvault/salt/hybrid/v1",
            KeyMode::DeviceOnly => b"dimvault/salt/device-only/v1",
            KeyMode::UserOnly => b"dimvault/salt/user-only/v1",
        }
    }

    /// Produce the Argon2id password input and salt for this mode.
    fn key_material(
        self,
        passphrase: Option<&[u8]>,
        fingerprint: Option<&DeviceFingerprint>,
    ) -> Result<(Zeroizing<[u8; 32]>, [u8; 32])> {
        let passphrase = passphrase.filter(|p| !p.is_empty());
        match self {
            KeyMode::Hybrid => {
                let passphrase = passphrase.ok_or_else(|| {
                    Error::MissingInput("hybrid mode requires a passphrase".to_string())
                })?;
                let fingerprint = fingerprint.ok_or_else(|| {
                    Error::MissingInput("hybrid mode requires a device fingerprint".to_string())
                })?;
                let salt = hmac_sha256(fingerprint.as_bytes(), &[self.domain_tag()]);
                Ok((sha256(passphrase), salt))
            }
            KeyMode::DeviceOnly => {
                let fingerprint = fingerprint.ok_or_else(|| {
                    Error::MissingInput(
                        "device-only mode requires a device fingerprint".to_string(),
                    )
                })?;
                let salt = hmac_sha256(NO_DEVICE_KEY, &[self.domain_tag()]);
                Ok((sha256(fingerprint.as_bytes()), salt))
            }
            KeyMode::UserOnly => {
                let passphrase = passphrase.ok_or_else(|| {
                    Error::MissingInput("user-only mode requires a passphrase".to_string())
                })?;
                let salt = hmac_sha256(NO_DEVICE_KEY, &[self.domain_tag()]);
                Ok((sha256(passphrase), salt))
            }
        }
    }

    /// Whether this mode consumes a passphrase.
    pub fn uses_passphrase(self) -> bool {
        matches!(self, KeyMode::Hybrid | KeyMode::UserOnly)
    }
}

fn sha256(data: &[u8]) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(Sha256::digest(data).into())
}

/// Fixed-width digest of the hardware-identifying values of a machine.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DeviceFingerprint([u8; 32]);

impl DeviceFingerprint {
    /// Hash the raw bytes reported by the platform collaborator.
    ///
    /// # Errors
    /// - Returns error if `raw` is empty
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidInput(
                "Device fingerprint cannot be empty".to_string(),
            ));
        }
        Ok(Self(Sha256::digest(raw).into()))
    }

    /// Use an already-computed digest as is.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// Collect and hash a fingerprint from a platform source.
    pub fn collect(source: &dyn FingerprintSource) -> Result<Self> {
        let raw = source.collect_device_fingerprint()?;
        Self::from_raw(raw.as_bytes())
    }

    /// Get the digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for DeviceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceFingerprint([REDACTED])")
    }
}

/// Platform collaborator that knows how to identify the current machine.
///
/// The value must be stable across reboots and OS reinstalls of the same
/// physical machine. It is opaque to the engine.
pub trait FingerprintSource: Send + Sync {
    /// Return the raw identifying bytes.
    fn collect_device_fingerprint(&self) -> Result<SensitiveBytes>;
}

/// Fingerprint source returning a fixed value.
///
/// Used by tests and by deployments that provision the fingerprint out of band.
pub struct StaticFingerprint(SensitiveBytes);

impl StaticFingerprint {
    pub fn new(raw: impl Into<Vec<u8>>) -> Self {
        Self(SensitiveBytes::new(raw.into()))
    }
}

impl FingerprintSource for StaticFingerprint {
    fn collect_device_fingerprint(&self) -> Result<SensitiveBytes> {
        Ok(self.0.clone())
    }
}

/// Parameters for Argon2id key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Standard vault parameters: t=3, m=64 MiB, p=4.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Create moderate parameters for mobile devices.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Optional passphrase strength policy.
///
/// Disabled by default: rejecting weak passphrases is a deployment decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyPolicy {
    /// Minimum estimated passphrase entropy in bits.
    pub min_passphrase_bits: Option<f64>,
}

impl KeyPolicy {
    /// A policy requiring roughly 60 bits of estimated entropy.
    pub fn strict() -> Self {
        Self {
            min_passphrase_bits: Some(60.0),
        }
    }

    /// Rough entropy estimate: length times log2 of the character pool.
    pub fn estimate_bits(passphrase: &[u8]) -> f64 {
        let mut pool = 0u32;
        if passphrase.iter().any(|b| b.is_ascii_lowercase()) {
            pool += 26;
        }
        if passphrase.iter().any(|b| b.is_ascii_uppercase()) {
            pool += 26;
        }
        if passphrase.iter().any(|b| b.is_ascii_digit()) {
            pool += 10;
        }
        if passphrase
            .iter()
            .any(|b| b.is_ascii_punctuation() || *b == b' ')
        {
            pool += 33;
        }
        if passphrase.iter().any(|b| !b.is_ascii()) {
            pool += 128;
        }
        if pool == 0 {
            return 0.0;
        }
        passphrase.len() as f64 * (pool as f64).log2()
    }

    fn check(&self, mode: KeyMode, passphrase: Option<&[u8]>) -> Result<()> {
        let (Some(min_bits), Some(passphrase)) = (self.min_passphrase_bits, passphrase) else {
            return Ok(());
        };
        if mode.uses_passphrase() && Self::estimate_bits(passphrase) < min_bits {
            return Err(Error::WeakInput(format!(
                "passphrase below the required {:.0} bits of estimated entropy",
                min_bits
            )));
        }
        Ok(())
    }
}

/// Derive the master key with the default (disabled) passphrase policy.
///
/// # Errors
/// - `MissingInput` if the mode needs a factor that is absent or empty
/// - `Crypto` if the Argon2id parameters are invalid
///
/// # Security
/// - Passphrase and fingerprint are neither stored nor logged
/// - Intermediate digests are zeroized after derivation
pub fn derive(
    mode: KeyMode,
    passphrase: Option<&[u8]>,
    fingerprint: Option<&DeviceFingerprint>,
    params: &KdfParams,
) -> Result<MasterKey> {
    derive_with_policy(mode, passphrase, fingerprint, params, &KeyPolicy::default())
}

/// Derive the master key, enforcing a passphrase policy.
///
/// # Errors
/// - `MissingInput` if the mode needs a factor that is absent or empty
/// - `WeakInput` if the policy rejects the passphrase
/// - `Crypto` if the Argon2id parameters are invalid
pub fn derive_with_policy(
    mode: KeyMode,
    passphrase: Option<&[u8]>,
    fingerprint: Option<&DeviceFingerprint>,
    params: &KdfParams,
    policy: &KeyPolicy,
) -> Result<MasterKey> {
    let (input, salt) = mode.key_material(passphrase, fingerprint)?;
    policy.check(mode, passphrase)?;

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(MASTER_KEY_LENGTH),
    )
    .map_err(|e| Error::Crypto(format!("Invalid KDF parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = Zeroizing::new([0u8; MASTER_KEY_LENGTH]);
    argon2
        .hash_password_into(input.as_slice(), &salt, key_bytes.as_mut_slice())
        .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(MasterKey::from_bytes(*key_bytes))
}
