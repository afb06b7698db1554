//! Temporal rescatter for DimVault.
//!
//! Files at rest are periodically moved to fresh layouts under new temporal
//! salts. This crate provides:
//! - Manual and periodic scheduling of rescatter cycles
//! - A de-duplicated FIFO of files per cycle, one file at a time
//! - Backoff for files held by foreground operations
//! - Per-file rescatter state

pub mod rescatter;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod target;

pub use rescatter::{RescatterConfig, TemporalRescatterer};
pub use retry::{RetryConfig, RetryExecutor};
pub use scheduler::{
    RescatterMode, RescatterReport, RescatterRequest, RescatterScheduler,
    RescatterSchedulerHandle,
};
pub use state::{RescatterEntry, RescatterState, RescatterStatus};
pub use target::RescatterTarget;
