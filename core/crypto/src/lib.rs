//! Cryptographic primitives for DimVault.
//!
//! This module provides:
//! - Hybrid key derivation (device fingerprint and/or passphrase) using Argon2id
//! - The 512-bit master key and its eight per-axis sub-keys
//! - A keyed pseudorandom stream used by the addressing layer
//! - The entropic mixer that produces filler and masks real units
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time comparison for key verification

pub mod kdf;
pub mod keys;
pub mod mixer;
pub mod prf;

pub use kdf::{
    derive, derive_with_policy, DeviceFingerprint, FingerprintSource, KdfParams, KeyMode,
    KeyPolicy, StaticFingerprint,
};
pub use keys::{Axis, AxisSubKey, AxisSubKeys, MasterKey, AXIS_COUNT, MASTER_KEY_LENGTH};
pub use mixer::{DensityBand, EntropicMixer, DENSITY_REGION_UNITS};
pub use prf::{fmix64, hmac_sha256, KeyedStream};
