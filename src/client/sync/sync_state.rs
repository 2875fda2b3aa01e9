//! # Sync State Management
//!
//! Coarse status shown by the UI plus the per-collection bookkeeping the
//! engine needs to schedule retries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Sync indicator for a whole collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Synced,
    /// Served from cache only; no network
    Offline,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Offline => "offline",
            SyncStatus::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncState {
    pub status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Failed cycles since the last success
    pub consecutive_failures: u32,
    /// When the next automatic retry is due; `None` when no retry is planned
    pub next_retry_at: Option<Instant>,
    pub pending_operations: usize,
}

impl SyncState {
    pub fn begin(&mut self) {
        self.status = SyncStatus::Syncing;
    }

    pub fn succeed(&mut self, at: DateTime<Utc>, pending_operations: usize) {
        self.status = SyncStatus::Synced;
        self.last_sync = Some(at);
        self.last_error = None;
        self.consecutive_failures = 0;
        self.next_retry_at = None;
        self.pending_operations = pending_operations;
    }

    /// Cycle skipped because the device is offline
    pub fn went_offline(&mut self) {
        self.status = SyncStatus::Offline;
        self.next_retry_at = None;
    }

    pub fn fail(&mut self, status: SyncStatus, error: String) {
        self.status = status;
        self.last_error = Some(error);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.next_retry_at = None;
    }

    pub fn retry_due(&self, now: Instant) -> bool {
        self.next_retry_at.is_some_and(|at| at <= now)
    }
}
