//! Key-dependent addressing for DimVault.
//!
//! Maps every unit of a shard stream to a cell of the storage medium:
//!
//! ```text
//! (sub-keys, scope, index) -> DimensionalCoordinate -> candidate -> PhysicalAddress
//! ```
//!
//! Everything here is pure and thread-safe. Layouts are recomputed on every
//! access and never persisted.

pub mod candidates;
pub mod coordinate;
pub mod projector;

pub use candidates::{CandidateSet, SELECTOR_COUNT};
pub use coordinate::{
    bootstrap_digest, coordinate, CoordinateGenerator, DimensionalCoordinate, UnitScope,
    AXIS_WIDTHS, SEMANTIC_BOOTSTRAP_UNITS,
};
pub use projector::{mix, AddressProjector, PhysicalAddress};
