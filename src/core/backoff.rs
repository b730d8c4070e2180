//! Backoff between a failed attempt and its replay
//!
//! The wait grows geometrically from the configured initial interval and is
//! capped at the configured maximum. A fixed backoff is the degenerate
//! `multiplier = 1.0` case.

use crate::config::BackoffConfig;
use std::time::Duration;

/// Exponential backoff derived from a step's [`BackoffConfig`]
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
}

impl ExponentialBackoff {
    /// Build the backoff from a validated configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_ms),
            multiplier: config.multiplier,
            max: Duration::from_millis(config.max_ms),
        }
    }

    /// Wait before replay number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.initial.min(self.max);
        }
        let factor = self.multiplier.powi(attempt as i32 - 1);
        let millis = (self.initial.as_millis() as f64 * factor).round();
        if millis >= self.max.as_millis() as f64 {
            self.max
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Sleep for the delay of replay number `attempt`
    pub async fn wait(&self, attempt: u32) {
        let delay = self.delay_for(attempt);
        if !delay.is_zero() {
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off before replay");
            tokio::time::sleep(delay).await;
        }
    }
}
