//! Eight-dimensional coordinates.
//!
//! Each axis of a coordinate comes from its own keyed stream, bound to the
//! axis sub-key and the unit scope (file, shard). TEMPORAL also absorbs the
//! file's temporal salt, so a rescatter moves every unit. SEMANTIC switches
//! to a content-bound seed after the first [`SEMANTIC_BOOTSTRAP_UNITS`] units.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use dimvault_common::FileId;
use dimvault_crypto::{Axis, AxisSubKey, AxisSubKeys, KeyedStream, AXIS_COUNT};

/// Bit width of each axis component, in axis order.
pub const AXIS_WIDTHS: [u32; AXIS_COUNT] = [24, 16, 16, 16, 12, 8, 16, 12];

/// Number of leading units addressed with the default SEMANTIC seed.
pub const SEMANTIC_BOOTSTRAP_UNITS: u64 = 32;

const AXIS_DOMAIN: &[u8] = b"dimvault/axis/v1";

/// One component per axis, each truncated to its axis width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimensionalCoordinate([u32; AXIS_COUNT]);

impl DimensionalCoordinate {
    /// Build a coordinate, truncating each component to its axis width.
    pub fn new(components: [u32; AXIS_COUNT]) -> Self {
        Self(std::array::from_fn(|i| components[i] & width_mask(i)))
    }

    pub fn components(&self) -> &[u32; AXIS_COUNT] {
        &self.0
    }

    pub fn component(&self, axis: Axis) -> u32 {
        self.0[axis.index()]
    }

    /// Flip the low bit of every axis whose bit is set in `mask`.
    ///
    /// Bit `i` of the mask selects axis `i`.
    pub fn with_selector_flips(&self, mask: u8) -> Self {
        let mut components = self.0;
        for (i, component) in components.iter_mut().enumerate() {
            if mask & (1 << i) != 0 {
                *component ^= 1;
            }
        }
        Self(components)
    }
}

fn width_mask(axis_index: usize) -> u32 {
    ((1u64 << AXIS_WIDTHS[axis_index]) - 1) as u32
}

/// Identity of a unit stream: one shard of one file at one temporal salt.
#[derive(Debug, Clone, Copy)]
pub struct UnitScope<'a> {
    pub file_id: &'a FileId,
    pub shard: u16,
    pub temporal_salt: u64,
}

/// Coordinate source for one unit stream.
///
/// Construction costs one HMAC per axis; each coordinate after that is a few
/// multiplications per axis.
#[derive(Debug, Clone)]
pub struct CoordinateGenerator {
    streams: [KeyedStream; AXIS_COUNT],
    semantic_key: AxisSubKey,
    file_id: Vec<u8>,
    shard: u16,
    bootstrapped: Option<KeyedStream>,
}

impl CoordinateGenerator {
    pub fn new(keys: &AxisSubKeys, scope: &UnitScope<'_>) -> Self {
        let salt_bytes = scope.temporal_salt.to_le_bytes();
        let shard = scope.shard.to_le_bytes();
        let streams = std::array::from_fn(|i| {
            let axis = Axis::ALL[i];
            let salt: &[u8] = if axis == Axis::Temporal {
                &salt_bytes
            } else {
                &[]
            };
            KeyedStream::new(
                keys.get(axis).as_bytes(),
                &[AXIS_DOMAIN, axis.tag(), scope.file_id.as_bytes(), &shard, salt],
            )
        });
        Self {
            streams,
            semantic_key: keys.get(Axis::Semantic).clone(),
            file_id: scope.file_id.as_bytes().to_vec(),
            shard: scope.shard,
            bootstrapped: None,
        }
    }

    /// Bind units past the bootstrap prefix to the prefix content.
    ///
    /// `digest` is [`bootstrap_digest`] of the first
    /// [`SEMANTIC_BOOTSTRAP_UNITS`] units of the stream. Without it those
    /// units keep using the default seed.
    pub fn with_bootstrap(mut self, digest: &[u8; 32]) -> Self {
        let shard = self.shard.to_le_bytes();
        self.bootstrapped = Some(KeyedStream::new(
            self.semantic_key.as_bytes(),
            &[
                AXIS_DOMAIN,
                Axis::Semantic.tag(),
                self.file_id.as_slice(),
                &shard,
                b"bootstrap",
                digest,
            ],
        ));
        self
    }

    /// Coordinate of the unit at `index`.
    pub fn coordinate(&self, index: u64) -> DimensionalCoordinate {
        DimensionalCoordinate(std::array::from_fn(|i| {
            let stream = match &self.bootstrapped {
                Some(derived)
                    if i == Axis::Semantic.index() && index >= SEMANTIC_BOOTSTRAP_UNITS =>
                {
                    derived
                }
                _ => &self.streams[i],
            };
            stream.word(index) as u32 & width_mask(i)
        }))
    }

    /// Keyed tag of this stream, used for per-stream density decisions.
    pub fn stream_tag(&self) -> u64 {
        self.streams[Axis::Temporal.index()].word(u64::MAX)
    }
}

/// BLAKE2b-256 digest of a stream's bootstrap prefix.
pub fn bootstrap_digest(prefix: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(b"dimvault/semantic-bootstrap/v1");
    hasher.update(prefix);
    hasher.finalize().into()
}

/// Coordinate of a single unit without reusing a generator.
pub fn coordinate(
    keys: &AxisSubKeys,
    scope: &UnitScope<'_>,
    bootstrap: Option<&[u8; 32]>,
    index: u64,
) -> DimensionalCoordinate {
    let generator = CoordinateGenerator::new(keys, scope);
    match bootstrap {
        Some(digest) => generator.with_bootstrap(digest).coordinate(index),
        None => generator.coordinate(index),
    }
}
