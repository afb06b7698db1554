//! Projection of coordinates onto the physical medium.

use crate::coordinate::DimensionalCoordinate;
use dimvault_common::{Error, Result};
use dimvault_crypto::{fmix64, AXIS_COUNT};

/// Byte offset into the storage medium.
pub type PhysicalAddress = u64;

const AXIS_MULTIPLIERS: [u64; AXIS_COUNT] = [
    0x9e37_79b9_7f4a_7c15,
    0xc2b2_ae3d_27d4_eb4f,
    0x1656_67b1_9e37_79f9,
    0xd6e8_feb8_6659_fd93,
    0xa076_1d64_78bd_642f,
    0xe703_7ed1_a0b4_28db,
    0x8ebc_6af0_9c88_c6e3,
    0x5899_65cc_7537_4cc3,
];

/// Non-linear fold of all eight components into one 64-bit word.
///
/// A change of one bit in any component flips about half of the output bits.
pub fn mix(coordinate: &DimensionalCoordinate) -> u64 {
    let mut acc: u64 = 0x6a09_e667_f3bc_c908;
    for (i, component) in coordinate.components().iter().enumerate() {
        let term = (u64::from(*component) + 1).wrapping_mul(AXIS_MULTIPLIERS[i]);
        acc = (acc ^ term)
            .rotate_left(23)
            .wrapping_mul(0x9e37_79b9_7f4a_7c15);
    }
    fmix64(acc)
}

/// Maps coordinates onto a medium of fixed size.
#[derive(Debug, Clone, Copy)]
pub struct AddressProjector {
    medium_size: u64,
}

impl AddressProjector {
    /// # Errors
    /// - Returns error if `medium_size` is zero
    pub fn new(medium_size: u64) -> Result<Self> {
        if medium_size == 0 {
            return Err(Error::InvalidInput(
                "Medium size must be greater than zero".to_string(),
            ));
        }
        Ok(Self { medium_size })
    }

    pub fn medium_size(&self) -> u64 {
        self.medium_size
    }

    /// Address anywhere on the medium.
    pub fn project(&self, coordinate: &DimensionalCoordinate) -> PhysicalAddress {
        mix(coordinate) % self.medium_size
    }

    /// Number of cells in each lane when the medium is split into `lanes`.
    pub fn lane_slots(&self, lanes: u64) -> u64 {
        if lanes == 0 {
            0
        } else {
            self.medium_size / lanes
        }
    }

    /// Address restricted to one lane.
    ///
    /// # Preconditions
    /// - `lane < lanes` and `lane_slots(lanes) > 0`
    ///
    /// # Postconditions
    /// - `result % lanes == lane` and `result < medium_size`
    pub fn project_striped(
        &self,
        coordinate: &DimensionalCoordinate,
        lane: u64,
        lanes: u64,
    ) -> PhysicalAddress {
        let slot = mix(coordinate) % self.lane_slots(lanes);
        slot * lanes + lane
    }

    /// The next cell of the same lane, wrapping at the lane end.
    pub fn next_in_lane(&self, address: PhysicalAddress, lanes: u64) -> PhysicalAddress {
        let slots = self.lane_slots(lanes);
        let lane = address % lanes;
        let slot = (address / lanes + 1) % slots;
        slot * lanes + lane
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn coord(seed: u64) -> DimensionalCoordinate {
        DimensionalCoordinate::new(std::array::from_fn(|i| {
            fmix64(seed.wrapping_mul(31).wrapping_add(i as u64)) as u32
        }))
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(AddressProjector::new(0).is_err());
    }

    #[test]
    fn test_avalanche() {
        let mut total = 0u64;
        let mut samples = 0u64;
        for seed in 0..200 {
            let base = coord(seed);
            let base_mix = mix(&base);
            for axis in 0..AXIS_COUNT {
                let mut components = *base.components();
                components[axis] ^= 1;
                let flipped = DimensionalCoordinate::new(components);
                total += u64::from((base_mix ^ mix(&flipped)).count_ones());
                samples += 1;
            }
        }
        let mean = total as f64 / samples as f64;
        assert!((mean - 32.0).abs() < 1.5, "mean hamming distance {}", mean);
    }

    #[test]
    fn test_projection_is_spread() {
        let projector = AddressProjector::new(1 << 20).unwrap();
        let mut buckets = [0u32; 16];
        for seed in 0..16_000 {
            let address = projector.project(&coord(seed));
            buckets[(address >> 16) as usize] += 1;
        }
        assert!(buckets.iter().all(|&b| (800..1200).contains(&b)));
    }

    #[test]
    fn test_next_in_lane_wraps() {
        let projector = AddressProjector::new(100).unwrap();
        // 12 lanes of 8 slots; cells 96..100 belong to no lane
        assert_eq!(projector.lane_slots(12), 8);
        assert_eq!(projector.next_in_lane(5, 12), 17);
        assert_eq!(projector.next_in_lane(7 * 12 + 5, 12), 5);
    }

    proptest! {
        #[test]
        fn prop_striped_stays_in_lane(seed in any::<u64>(), size in 64u64..1_000_000, lanes in 1u64..32) {
            let projector = AddressProjector::new(size).unwrap();
            let lane = seed % lanes;
            let address = projector.project_striped(&coord(seed), lane, lanes);
            prop_assert_eq!(address % lanes, lane);
            prop_assert!(address < size);
            prop_assert!(projector.project(&coord(seed)) < size);
        }
    }
}
