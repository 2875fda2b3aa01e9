//! # Sync Scheduler
//!
//! Decides whether a trigger should start a cycle and when the next
//! automatic retry is due.

use crate::client::offline::RetryPolicy;
use crate::client::sync::sync_state::SyncState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// What asked for a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Startup,
    AppForeground,
    /// Runs only when the cache is stale or empty
    ScreenFocus,
    PullToRefresh,
    /// Connectivity came back
    Reconnected,
    /// Automatic backoff retry; runs only when due
    Retry,
    /// Cache read or corrective reload issued by the service layer
    Manual,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Synchronization scheduler
#[derive(Debug, Clone)]
pub struct SyncScheduler {
    retry: RetryPolicy,
    stale_after: Duration,
}

impl SyncScheduler {
    pub fn new(retry: RetryPolicy, stale_after: Duration) -> Self {
        Self { retry, stale_after }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Check whether `trigger` should start a cycle now
    pub fn should_sync(&self, trigger: SyncTrigger, cache_stale: bool, state: &SyncState, now: Instant) -> bool {
        match trigger {
            SyncTrigger::ScreenFocus => cache_stale,
            SyncTrigger::Retry => state.retry_due(now),
            _ => true,
        }
    }

    /// Plan the next automatic retry after a failure recorded in `state`.
    /// Returns the deadline, or `None` once the attempt ceiling is reached.
    pub fn schedule_retry(&self, state: &mut SyncState, now: Instant) -> Option<Instant> {
        if !self.retry.should_retry(state.consecutive_failures) {
            state.next_retry_at = None;
            return None;
        }
        let deadline = now + self.retry.delay_for(state.consecutive_failures);
        state.next_retry_at = Some(deadline);
        Some(deadline)
    }
}
