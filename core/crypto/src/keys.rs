//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::prf::hmac_sha256;

/// Length of the master key in bytes (512-bit).
pub const MASTER_KEY_LENGTH: usize = 64;

/// Number of addressing dimensions.
pub const AXIS_COUNT: usize = 8;

/// Length of one axis sub-key in bytes.
pub const SUB_KEY_LENGTH: usize = MASTER_KEY_LENGTH / AXIS_COUNT;

/// Addressing dimension.
///
/// The declaration order is the order in which the master key is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Spatial,
    Temporal,
    Entropic,
    Semantic,
    Fractal,
    Phase,
    Topological,
    Holographic,
}

impl Axis {
    /// All axes in key-split order.
    pub const ALL: [Axis; AXIS_COUNT] = [
        Axis::Spatial,
        Axis::Temporal,
        Axis::Entropic,
        Axis::Semantic,
        Axis::Fractal,
        Axis::Phase,
        Axis::Topological,
        Axis::Holographic,
    ];

    /// Position of this axis in coordinates and in the key split.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Domain-separation tag mixed into every derivation on this axis.
    pub fn tag(self) -> &'static [u8] {
        match self {
            Axis::Spatial => b"spatial",
            Axis::Temporal => b"temporal",
            Axis::Entropic => b"entropic",
            Axis::Semantic => b"semantic",
            Axis::Fractal => b"fractal",
            Axis::Phase => b"phase",
            Axis::Topological => b"topological",
            Axis::Holographic => b"holographic",
        }
    }
}

/// Master key derived from the vault's key factors.
///
/// This key is the root of the addressing hierarchy. It is never persisted;
/// it is split into one sub-key per axis and otherwise only used to produce
/// the vault's key-check value.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; MASTER_KEY_LENGTH],
}

impl MasterKey {
    /// Create a master key from raw bytes.
    ///
    /// # Postconditions
    /// - Returns a MasterKey that will zeroize on drop
    pub fn from_bytes(key: [u8; MASTER_KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LENGTH] {
        &self.key
    }

    /// Split into the eight per-axis sub-keys.
    ///
    /// Sub-key `i` is bytes `8*i..8*i+8` of the master key, so no two axes
    /// share any key byte.
    pub fn axis_keys(&self) -> AxisSubKeys {
        let keys = std::array::from_fn(|i| {
            let mut bytes = [0u8; SUB_KEY_LENGTH];
            bytes.copy_from_slice(&self.key[i * SUB_KEY_LENGTH..(i + 1) * SUB_KEY_LENGTH]);
            AxisSubKey::from_bytes(Axis::ALL[i], bytes)
        });
        AxisSubKeys { keys }
    }

    /// Non-secret verification value stored in vault metadata.
    pub fn key_check(&self) -> [u8; 32] {
        hmac_sha256(&self.key, &[b"dimvault/key-check/v1"])
    }

    /// Compare against a stored key-check value in constant time.
    pub fn matches_check(&self, expected: &[u8]) -> bool {
        let actual = self.key_check();
        actual.as_slice().ct_eq(expected).into()
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

/// 64-bit key dedicated to a single axis.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AxisSubKey {
    #[zeroize(skip)]
    axis: Axis,
    key: [u8; SUB_KEY_LENGTH],
}

impl AxisSubKey {
    /// Create a sub-key from raw bytes.
    pub fn from_bytes(axis: Axis, key: [u8; SUB_KEY_LENGTH]) -> Self {
        Self { axis, key }
    }

    /// The axis this key belongs to.
    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; SUB_KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for AxisSubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AxisSubKey({:?}, [REDACTED])", self.axis)
    }
}

/// The full set of sub-keys, one per axis.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AxisSubKeys {
    keys: [AxisSubKey; AXIS_COUNT],
}

impl AxisSubKeys {
    /// Sub-key for one axis.
    pub fn get(&self, axis: Axis) -> &AxisSubKey {
        &self.keys[axis.index()]
    }
}

impl fmt::Debug for AxisSubKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AxisSubKeys([REDACTED; {}])", AXIS_COUNT)
    }
}
