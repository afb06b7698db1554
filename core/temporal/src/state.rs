//! Rescatter state tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use dimvault_common::{Error, FileId, Result};

/// Rescatter status of a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RescatterStatus {
    /// No rescatter pending.
    Idle,
    /// Queued for the current cycle.
    Pending,
    /// Being rescattered.
    Running,
    /// Skipped because the file stayed busy; picked up again later.
    Deferred,
    /// The last attempt failed with a non-transient error.
    Failed,
}

/// Rescatter bookkeeping for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescatterEntry {
    pub file_id: FileId,
    pub status: RescatterStatus,
    /// Completed rescatters.
    pub cycles: u64,
    /// Consecutive failed attempts.
    pub failure_count: u32,
    /// Consecutive deferrals.
    pub deferrals: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl RescatterEntry {
    pub fn new(file_id: FileId) -> Self {
        Self {
            file_id,
            status: RescatterStatus::Idle,
            cycles: 0,
            failure_count: 0,
            deferrals: 0,
            last_success: None,
            last_error: None,
        }
    }

    pub fn mark_pending(&mut self) {
        self.status = RescatterStatus::Pending;
    }

    pub fn mark_running(&mut self) {
        self.status = RescatterStatus::Running;
    }

    pub fn mark_rescattered(&mut self) {
        self.status = RescatterStatus::Idle;
        self.cycles += 1;
        self.failure_count = 0;
        self.deferrals = 0;
        self.last_success = Some(Utc::now());
        self.last_error = None;
    }

    pub fn mark_deferred(&mut self) {
        self.status = RescatterStatus::Deferred;
        self.deferrals += 1;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = RescatterStatus::Failed;
        self.failure_count += 1;
        self.last_error = Some(error.into());
    }
}

/// Rescatter state of a vault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RescatterState {
    entries: HashMap<FileId, RescatterEntry>,
    /// When the last full cycle finished.
    pub last_cycle: Option<DateTime<Utc>>,
    pub cycle_in_progress: bool,
}

impl RescatterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file_id: &FileId) -> Option<&RescatterEntry> {
        self.entries.get(file_id)
    }

    /// Entry of a file, created on first use.
    pub fn entry(&mut self, file_id: &FileId) -> &mut RescatterEntry {
        self.entries
            .entry(file_id.clone())
            .or_insert_with(|| RescatterEntry::new(file_id.clone()))
    }

    pub fn remove(&mut self, file_id: &FileId) -> Option<RescatterEntry> {
        self.entries.remove(file_id)
    }

    /// Drop entries of files that no longer exist.
    pub fn retain_files(&mut self, live: &[FileId]) {
        self.entries.retain(|id, _| live.contains(id));
    }

    pub fn entries(&self) -> impl Iterator<Item = &RescatterEntry> {
        self.entries.values()
    }

    pub fn count_by_status(&self) -> HashMap<RescatterStatus, usize> {
        let mut counts = HashMap::new();
        for entry in self.entries.values() {
            *counts.entry(entry.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> FileId {
        FileId::new(name).unwrap()
    }

    #[test]
    fn test_entry_lifecycle() {
        let mut entry = RescatterEntry::new(id("f1"));
        entry.mark_pending();
        entry.mark_running();
        entry.mark_deferred();
        entry.mark_deferred();
        assert_eq!(entry.status, RescatterStatus::Deferred);
        assert_eq!(entry.deferrals, 2);

        entry.mark_failed("corrupted");
        assert_eq!(entry.failure_count, 1);
        assert_eq!(entry.last_error.as_deref(), Some("corrupted"));

        entry.mark_rescattered();
        assert_eq!(entry.status, RescatterStatus::Idle);
        assert_eq!(entry.cycles, 1);
        assert_eq!(entry.failure_count, 0);
        assert_eq!(entry.deferrals, 0);
        assert!(entry.last_success.is_some());
        assert!(entry.last_error.is_none());
    }

    #[test]
    fn test_state_counts_and_retain() {
        let mut state = RescatterState::new();
        state.entry(&id("a")).mark_rescattered();
        state.entry(&id("b")).mark_deferred();
        state.entry(&id("c")).mark_failed("x");

        let counts = state.count_by_status();
        assert_eq!(counts[&RescatterStatus::Idle], 1);
        assert_eq!(counts[&RescatterStatus::Deferred], 1);

        state.retain_files(&[id("a"), id("b")]);
        assert_eq!(state.entries().count(), 2);
        assert!(state.get(&id("c")).is_none());
    }

    #[test]
    fn test_state_serialization() {
        let mut state = RescatterState::new();
        state.entry(&id("f1")).mark_rescattered();

        let json = state.to_json().unwrap();
        let restored = RescatterState::from_json(&json).unwrap();
        assert_eq!(restored.get(&id("f1")).unwrap().cycles, 1);
    }
}
