//! Candidate coordinates around a base coordinate.
//!
//! Flipping the low bit of any subset of the eight axes yields 256
//! candidates. Selector 0 (no flips) is authoritative; the others serve as
//! fallbacks when a cell is already claimed and as decoy positions.

use crate::coordinate::DimensionalCoordinate;
use dimvault_crypto::Axis;

/// Number of candidates per coordinate.
pub const SELECTOR_COUNT: usize = 256;

/// The candidate space of one unit, with its keyed probe order.
#[derive(Debug, Clone, Copy)]
pub struct CandidateSet {
    base: DimensionalCoordinate,
    step: u8,
    offset: u8,
}

impl CandidateSet {
    pub fn new(base: DimensionalCoordinate) -> Self {
        Self {
            base,
            step: base.component(Axis::Phase) as u8 | 1,
            offset: base.component(Axis::Holographic) as u8,
        }
    }

    pub fn base(&self) -> &DimensionalCoordinate {
        &self.base
    }

    /// Candidate for one selector.
    pub fn candidate(&self, selector: u8) -> DimensionalCoordinate {
        self.base.with_selector_flips(selector)
    }

    /// All selectors in probe order, starting with 0.
    ///
    /// The odd step makes the walk a permutation of all 256 selectors.
    pub fn selectors(&self) -> impl Iterator<Item = u8> {
        std::iter::once(0).chain(self.walk(0..=255).filter(|&s| s != 0))
    }

    /// Decoy candidates, taken from the tail of the probe order.
    ///
    /// Never yields the authoritative candidate or `chosen`.
    pub fn decoys(&self, chosen: u8, count: usize) -> impl Iterator<Item = DimensionalCoordinate> {
        let this = *self;
        self.walk((0..=255).rev())
            .filter(move |&s| s != 0 && s != chosen)
            .take(count)
            .map(move |s| this.candidate(s))
    }

    fn walk(&self, positions: impl Iterator<Item = u8>) -> impl Iterator<Item = u8> {
        let (step, offset) = (self.step, self.offset);
        positions.map(move |i| i.wrapping_mul(step) ^ offset)
    }
}
