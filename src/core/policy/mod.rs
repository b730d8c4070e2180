//! Fault tolerance policy
//!
//! Classifies a failure raised by the transform or the sink and decides how
//! the chunk orchestrator must recover: replay, skip, roll the chunk back
//! into scan mode, or abort the step. The policy owns no mutable state of
//! its own; retry and skip counters are explicit values scoped to one step
//! execution and passed in by the caller.

pub mod classification;
pub mod state;

pub use classification::{ClassificationFlags, ErrorClassifier};
pub use state::{RetryState, SkipState};

use crate::config::StepConfig;
use crate::domain::errors::ItemError;

/// Where in the chunk cycle the failure was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureRole {
    /// Failure raised by the item transform
    Process,
    /// Failure raised by the sink while writing a chunk
    Write,
}

/// Recovery decision for one failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Replay the failing work. For `Process` only the failing item is
    /// re-submitted; for `Write` the whole chunk is replayed from the
    /// transform. `attempt` is 1 for the first replay and drives backoff.
    Retry { attempt: u32 },

    /// Exclude the failing item without rolling back the chunk transaction;
    /// the remaining buffered items still go to the sink.
    SkipAndContinue,

    /// Roll back the chunk transaction and resolve the chunk in scan mode,
    /// one item per transaction.
    RollbackChunk,

    /// Scan mode only: discard the single-item transaction and exclude the
    /// item.
    SkipItem,

    /// Unrecoverable; the step aborts with this failure as the root cause.
    Fatal,
}

/// Decides retry vs skip vs rollback vs fatal for classified failures
///
/// Precedence, in order:
/// 1. unclassified class -> Fatal
/// 2. retryable with attempts remaining -> Retry
/// 3. skippable under the skip limit -> SkipAndContinue when the class is
///    also no-rollback, RollbackChunk otherwise (skip dominates no-rollback)
/// 4. everything exhausted -> Fatal
#[derive(Debug, Clone)]
pub struct FaultTolerancePolicy {
    classifier: ErrorClassifier,
    retry_limit: u32,
    skip_limit: usize,
}

impl FaultTolerancePolicy {
    /// Build the policy for one step from its validated configuration
    pub fn from_config(config: &StepConfig) -> Self {
        Self {
            classifier: ErrorClassifier::from_entries(&config.errors),
            retry_limit: config.retry_limit,
            skip_limit: config.skip_limit,
        }
    }

    /// Decide how to recover from a transform or chunk-write failure
    pub fn on_failure(
        &self,
        error: &ItemError,
        role: FailureRole,
        retry: &mut RetryState,
        skip: &mut SkipState,
    ) -> Decision {
        let Some(flags) = self.classifier.classify(error.class()) else {
            tracing::error!(class = error.class(), ?role, "Unclassified failure is fatal");
            return Decision::Fatal;
        };

        if flags.retryable {
            let limit = self
                .classifier
                .retry_limit_override(error.class())
                .unwrap_or(self.retry_limit);
            let attempts = retry.attempts(error.class());
            // The first attempt counts as attempt #1, so at most limit - 1
            // replays occur.
            if attempts < limit.saturating_sub(1) {
                let attempt = retry.record_attempt(error.class());
                tracing::warn!(
                    class = error.class(),
                    ?role,
                    attempt,
                    limit,
                    "Retrying failed item"
                );
                return Decision::Retry { attempt };
            }
        }

        if flags.skippable && skip.count() < self.skip_limit {
            let skipped = skip.record_skip(error.class());
            if flags.no_rollback {
                tracing::warn!(
                    class = error.class(),
                    ?role,
                    skipped,
                    skip_limit = self.skip_limit,
                    "Skipping item without rollback"
                );
                Decision::SkipAndContinue
            } else {
                tracing::warn!(
                    class = error.class(),
                    ?role,
                    skipped,
                    skip_limit = self.skip_limit,
                    "Skipping item; chunk rolls back into scan mode"
                );
                Decision::RollbackChunk
            }
        } else {
            tracing::error!(
                class = error.class(),
                ?role,
                skips = skip.count(),
                skip_limit = self.skip_limit,
                "Recovery exhausted; failure is fatal"
            );
            Decision::Fatal
        }
    }

    /// Decide how to handle a failure during scan mode
    ///
    /// Retry still applies (a transient failure inside a single-item
    /// transaction replays that item); skip decisions collapse to excluding
    /// the item and discarding its transaction.
    pub fn on_scan_failure(
        &self,
        error: &ItemError,
        role: FailureRole,
        retry: &mut RetryState,
        skip: &mut SkipState,
    ) -> Decision {
        match self.on_failure(error, role, retry, skip) {
            Decision::SkipAndContinue | Decision::RollbackChunk => Decision::SkipItem,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassificationEntry, StepConfig};

    fn policy(entries: Vec<ClassificationEntry>, retry_limit: u32, skip_limit: usize) -> FaultTolerancePolicy {
        let mut config = StepConfig::new("test", 10)
            .with_retry_limit(retry_limit)
            .with_skip_limit(skip_limit);
        for entry in entries {
            config = config.with_classification(entry);
        }
        FaultTolerancePolicy::from_config(&config)
    }

    fn err(class: &str) -> ItemError {
        ItemError::new(class, "boom")
    }

    #[test]
    fn test_unclassified_is_fatal() {
        let policy = policy(vec![], 3, 2);
        let mut retry = RetryState::new();
        let mut skip = SkipState::new();
        let decision = policy.on_failure(&err("Unknown"), FailureRole::Process, &mut retry, &mut skip);
        assert_eq!(decision, Decision::Fatal);
    }

    #[test]
    fn test_retry_until_limit_then_fatal() {
        // retry_limit 3: the first attempt counts, so two replays happen
        let policy = policy(vec![ClassificationEntry::new("TestException").retryable()], 3, 0);
        let mut retry = RetryState::new();
        let mut skip = SkipState::new();

        let e = err("TestException");
        assert_eq!(
            policy.on_failure(&e, FailureRole::Process, &mut retry, &mut skip),
            Decision::Retry { attempt: 1 }
        );
        assert_eq!(
            policy.on_failure(&e, FailureRole::Process, &mut retry, &mut skip),
            Decision::Retry { attempt: 2 }
        );
        assert_eq!(
            policy.on_failure(&e, FailureRole::Process, &mut retry, &mut skip),
            Decision::Fatal
        );
    }

    #[test]
    fn test_retry_limit_one_never_replays() {
        let policy = policy(vec![ClassificationEntry::new("TestException").retryable()], 1, 0);
        let mut retry = RetryState::new();
        let mut skip = SkipState::new();
        assert_eq!(
            policy.on_failure(&err("TestException"), FailureRole::Write, &mut retry, &mut skip),
            Decision::Fatal
        );
    }

    #[test]
    fn test_per_class_retry_limit_override() {
        let policy = policy(
            vec![
                ClassificationEntry::new("Throttled").retryable().with_retry_limit(3),
                ClassificationEntry::new("TestException").retryable(),
            ],
            1,
            0,
        );
        let mut retry = RetryState::new();
        let mut skip = SkipState::new();

        // Throttled overrides the step limit of 1
        assert_eq!(
            policy.on_failure(&err("Throttled"), FailureRole::Write, &mut retry, &mut skip),
            Decision::Retry { attempt: 1 }
        );
        // TestException uses the step limit and fails at once
        assert_eq!(
            policy.on_failure(&err("TestException"), FailureRole::Write, &mut retry, &mut skip),
            Decision::Fatal
        );
    }

    #[test]
    fn test_skip_rolls_back_without_no_rollback() {
        let policy = policy(vec![ClassificationEntry::new("TestException").skippable()], 1, 2);
        let mut retry = RetryState::new();
        let mut skip = SkipState::new();
        assert_eq!(
            policy.on_failure(&err("TestException"), FailureRole::Process, &mut retry, &mut skip),
            Decision::RollbackChunk
        );
        assert_eq!(skip.count(), 1);
    }

    #[test]
    fn test_no_rollback_skip_continues() {
        let policy = policy(
            vec![ClassificationEntry::new("TestException").skippable().no_rollback()],
            1,
            2,
        );
        let mut retry = RetryState::new();
        let mut skip = SkipState::new();
        assert_eq!(
            policy.on_failure(&err("TestException"), FailureRole::Process, &mut retry, &mut skip),
            Decision::SkipAndContinue
        );
    }

    #[test]
    fn test_no_rollback_without_skippable_is_fatal() {
        let policy = policy(vec![ClassificationEntry::new("TestException").no_rollback()], 1, 2);
        let mut retry = RetryState::new();
        let mut skip = SkipState::new();
        assert_eq!(
            policy.on_failure(&err("TestException"), FailureRole::Process, &mut retry, &mut skip),
            Decision::Fatal
        );
    }

    #[test]
    fn test_skip_limit_exhaustion_is_fatal() {
        let policy = policy(vec![ClassificationEntry::new("TestException").skippable()], 1, 2);
        let mut retry = RetryState::new();
        let mut skip = SkipState::new();
        let e = err("TestException");

        assert_eq!(
            policy.on_failure(&e, FailureRole::Process, &mut retry, &mut skip),
            Decision::RollbackChunk
        );
        assert_eq!(
            policy.on_failure(&e, FailureRole::Process, &mut retry, &mut skip),
            Decision::RollbackChunk
        );
        assert_eq!(
            policy.on_failure(&e, FailureRole::Process, &mut retry, &mut skip),
            Decision::Fatal
        );
        // Count frozen at the limit
        assert_eq!(skip.count(), 2);
    }

    #[test]
    fn test_retry_exhausted_falls_through_to_skip() {
        let policy = policy(
            vec![ClassificationEntry::new("TestException").retryable().skippable()],
            2,
            1,
        );
        let mut retry = RetryState::new();
        let mut skip = SkipState::new();
        let e = err("TestException");

        assert_eq!(
            policy.on_failure(&e, FailureRole::Process, &mut retry, &mut skip),
            Decision::Retry { attempt: 1 }
        );
        assert_eq!(
            policy.on_failure(&e, FailureRole::Process, &mut retry, &mut skip),
            Decision::RollbackChunk
        );
    }

    #[test]
    fn test_scan_failure_collapses_skip_decisions() {
        let policy = policy(vec![ClassificationEntry::new("TestException").skippable()], 1, 2);
        let mut retry = RetryState::new();
        let mut skip = SkipState::new();
        assert_eq!(
            policy.on_scan_failure(&err("TestException"), FailureRole::Write, &mut retry, &mut skip),
            Decision::SkipItem
        );
    }

    #[test]
    fn test_scan_failure_keeps_fatal() {
        let policy = policy(vec![], 1, 0);
        let mut retry = RetryState::new();
        let mut skip = SkipState::new();
        assert_eq!(
            policy.on_scan_failure(&err("Unknown"), FailureRole::Write, &mut retry, &mut skip),
            Decision::Fatal
        );
    }
}
