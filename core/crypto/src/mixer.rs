//! Entropic masking and background filler.
//!
//! Every medium cell holds either background filler or a real unit masked
//! with a filler derived from the same key. Both look uniformly random to
//! anyone without the ENTROPIC sub-key.

use serde::{Deserialize, Serialize};

use crate::keys::{Axis, AxisSubKeys};
use crate::prf::KeyedStream;
use dimvault_common::{Error, Result};

/// Units per density region.
pub const DENSITY_REGION_UNITS: u64 = 4096;

/// Bounds on the real-to-touched ratio of a region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityBand {
    pub min_real_ratio: f64,
    pub max_real_ratio: f64,
}

impl DensityBand {
    /// Validate the band.
    ///
    /// # Errors
    /// - Returns error unless `0 < min <= max <= 1`
    pub fn validate(&self) -> Result<()> {
        let valid = self.min_real_ratio > 0.0
            && self.min_real_ratio <= self.max_real_ratio
            && self.max_real_ratio <= 1.0;
        if !valid {
            return Err(Error::InvalidInput(format!(
                "Invalid density band {}..{}",
                self.min_real_ratio, self.max_real_ratio
            )));
        }
        Ok(())
    }
}

impl Default for DensityBand {
    fn default() -> Self {
        Self {
            min_real_ratio: 0.30,
            max_real_ratio: 0.70,
        }
    }
}

/// Keyed masking and density decisions for one vault key.
#[derive(Debug, Clone)]
pub struct EntropicMixer {
    filler: KeyedStream,
    density: KeyedStream,
    dither: KeyedStream,
    band: DensityBand,
}

impl EntropicMixer {
    /// Build the mixer from the ENTROPIC sub-key.
    pub fn new(keys: &AxisSubKeys, band: DensityBand) -> Self {
        let key = keys.get(Axis::Entropic).as_bytes();
        Self {
            filler: KeyedStream::new(key, &[b"dimvault/filler/v1"]),
            density: KeyedStream::new(key, &[b"dimvault/density/v1"]),
            dither: KeyedStream::new(key, &[b"dimvault/dither/v1"]),
            band,
        }
    }

    /// Filler byte for a cell. Context 0 is the medium background.
    #[inline]
    pub fn filler(&self, address: u64, context: u64) -> u8 {
        (self.filler.pair(address, context) >> 56) as u8
    }

    /// Mask a real unit for storage.
    #[inline]
    pub fn write_unit(&self, real: u8, address: u64, context: u64) -> u8 {
        real ^ self.filler(address, context)
    }

    /// Recover a real unit from a stored cell.
    #[inline]
    pub fn read_unit(&self, stored: u8, address: u64, context: u64) -> u8 {
        stored ^ self.filler(address, context)
    }

    /// Write the background filler for `buf.len()` cells starting at `start`.
    pub fn fill_block(&self, start: u64, buf: &mut [u8]) {
        for (i, cell) in buf.iter_mut().enumerate() {
            *cell = self.filler(start + i as u64, 0);
        }
    }

    /// Real-to-touched ratio of one region of a unit stream.
    pub fn real_ratio(&self, stream_tag: u64, region: u64) -> f64 {
        let span = self.band.max_real_ratio - self.band.min_real_ratio;
        self.band.min_real_ratio + span * self.density.unit_interval(stream_tag, region)
    }

    /// Number of decoy touches to pair with a real unit.
    ///
    /// The fractional part of the per-unit budget is dithered so that the
    /// average over a region matches its ratio.
    pub fn decoy_count(&self, stream_tag: u64, unit_index: u64, max_decoys: usize) -> usize {
        let ratio = self.real_ratio(stream_tag, unit_index / DENSITY_REGION_UNITS);
        let budget = (1.0 - ratio) / ratio;
        let whole = budget.floor();
        let extra = self.dither.unit_interval(stream_tag, unit_index) < budget - whole;
        (whole as usize + usize::from(extra)).min(max_decoys)
    }

    pub fn band(&self) -> DensityBand {
        self.band
    }
}
