//! # Sync Metrics
//!
//! Counters for sync cycles, kept per collection.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct SyncMetrics {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub coalesced_triggers: u64,
    pub mutations_flushed: u64,
    pub average_sync_duration: Duration,
    pub last_sync_duration: Option<Duration>,
    last_sync_start: Option<Instant>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sync_start(&mut self) {
        self.last_sync_start = Some(Instant::now());
        self.total_syncs += 1;
    }

    pub fn record_sync_success(&mut self, flushed: usize) {
        if let Some(start) = self.last_sync_start.take() {
            let duration = start.elapsed();
            self.last_sync_duration = Some(duration);
            self.successful_syncs += 1;
            self.mutations_flushed += flushed as u64;

            // Update rolling average
            let previous = self.successful_syncs.saturating_sub(1) as u32;
            let total_duration = self.average_sync_duration * previous + duration;
            self.average_sync_duration = total_duration / self.successful_syncs as u32;
        }
    }

    pub fn record_sync_failure(&mut self) {
        self.last_sync_start = None;
        self.failed_syncs += 1;
    }

    pub fn record_coalesced(&mut self) {
        self.coalesced_triggers += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_syncs == 0 {
            0.0
        } else {
            self.successful_syncs as f64 / self.total_syncs as f64
        }
    }
}
