//! Per-step-execution retry and skip state
//!
//! These are explicit values created when a step execution starts and
//! dropped when it ends. Nothing here is shared across executions, so
//! concurrently dispatched step executions can never observe each other's
//! counters.

use std::collections::HashMap;

/// Retry attempt counters, one per error class
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    attempts: HashMap<String, u32>,
}

impl RetryState {
    /// Create fresh state for a step execution
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay attempts recorded so far for an error class
    pub fn attempts(&self, class: &str) -> u32 {
        self.attempts.get(class).copied().unwrap_or(0)
    }

    /// Record one replay attempt for an error class
    pub fn record_attempt(&mut self, class: &str) -> u32 {
        let counter = self.attempts.entry(class.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// Skip counter bounded by the step skip limit
#[derive(Debug, Clone, Default)]
pub struct SkipState {
    count: usize,
    classes: Vec<String>,
}

impl SkipState {
    /// Create fresh state for a step execution
    pub fn new() -> Self {
        Self::default()
    }

    /// Items skipped so far in this step execution
    pub fn count(&self) -> usize {
        self.count
    }

    /// Record one skipped item
    pub fn record_skip(&mut self, class: &str) -> usize {
        self.count += 1;
        self.classes.push(class.to_string());
        self.count
    }

    /// Error classes of the skipped items, in skip order
    pub fn skipped_classes(&self) -> &[String] {
        &self.classes
    }
}
