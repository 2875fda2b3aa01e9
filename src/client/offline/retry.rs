//! # Retry Logic and Backoff Strategies
//!
//! Delay calculation for automatic sync retries: exponential backoff with
//! jitter and a ceiling on consecutive attempts. After the ceiling the
//! collection stays in `Error` until a user-driven trigger succeeds.

use crate::shared::config::RetrySettings;
use rand::Rng;
use std::time::Duration;

/// Backoff strategy configuration
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed interval between retries
    Fixed { interval: Duration },
    /// Exponential backoff with jitter
    Exponential {
        base: Duration,
        max: Duration,
        /// Jitter factor (0.0 to 1.0)
        jitter: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub strategy: BackoffStrategy,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential {
                base: settings.base_delay,
                max: settings.max_delay,
                jitter: settings.jitter,
            },
            max_attempts: settings.max_attempts,
        }
    }

    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed { interval },
            max_attempts,
        }
    }

    /// Whether another automatic attempt is allowed after `failures` consecutive failures
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match &self.strategy {
            BackoffStrategy::Fixed { interval } => *interval,
            BackoffStrategy::Exponential { base, max, jitter } => {
                let exponent = attempt.saturating_sub(1).min(31);
                let delay = base.saturating_mul(1u32 << exponent).min(*max);
                if *jitter <= 0.0 || delay.is_zero() {
                    return delay;
                }
                let factor = rand::rng().random_range(0.0..=*jitter);
                (delay + delay.mul_f64(factor)).min(*max)
            }
        }
    }
}
