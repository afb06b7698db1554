//! Keyed pseudorandom functions.
//!
//! Every key-dependent value in the addressing layer comes from a
//! [`KeyedStream`]: HMAC-SHA256 binds the stream to a sub-key and a scope
//! (file, shard, axis, salt), and a cheap keyed 64-bit mixer then expands
//! the stream over unit indices. Hashing once per scope and mixing per unit
//! keeps megabyte-sized scatters affordable.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over length-prefixed parts.
///
/// Length prefixes keep `["ab", "c"]` and `["a", "bc"]` distinct.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(&(part.len() as u64).to_le_bytes());
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// 64-bit finalizer with full avalanche (MurmurHash3 fmix64).
#[inline]
pub fn fmix64(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x
}

/// Deterministic keyed stream of 64-bit words.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyedStream {
    k: [u64; 4],
}

impl KeyedStream {
    /// Seed a stream from a key and a scope.
    pub fn new(key: &[u8], parts: &[&[u8]]) -> Self {
        let mut seed = hmac_sha256(key, parts);
        let k = std::array::from_fn(|i| {
            let mut word = [0u8; 8];
            word.copy_from_slice(&seed[i * 8..(i + 1) * 8]);
            u64::from_le_bytes(word)
        });
        seed.zeroize();
        Self { k }
    }

    /// Word at `index`.
    #[inline]
    pub fn word(&self, index: u64) -> u64 {
        self.pair(index, 0)
    }

    /// Word for a two-part input.
    #[inline]
    pub fn pair(&self, a: u64, b: u64) -> u64 {
        let x = fmix64(a ^ self.k[0]);
        let y = fmix64(b.wrapping_add(self.k[1]) ^ x.rotate_left(29));
        let z = x.wrapping_add(y).wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ self.k[2];
        fmix64(z ^ y.rotate_left(41)).wrapping_add(self.k[3])
    }

    /// Uniform value in `[0, 1)` for a two-part input.
    #[inline]
    pub fn unit_interval(&self, a: u64, b: u64) -> f64 {
        (self.pair(a, b) >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl std::fmt::Debug for KeyedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyedStream([REDACTED])")
    }
}
