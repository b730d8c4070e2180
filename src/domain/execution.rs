//! Execution records for steps and jobs
//!
//! A step execution moves through `Starting -> Running -> (Retrying |
//! Skipping)* -> Completed | Failed`; Retrying and Skipping are transient
//! sub-states entered only while a single chunk is being resolved. The
//! terminal record carries the counters accumulated up to the terminal
//! point, which on failure is enough to diagnose exactly which item broke
//! and how many retries and skips occurred.

use crate::domain::errors::ItemError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Step execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step execution created but not yet driving chunks
    Starting,
    /// Chunks are being read, transformed, and written
    Running,
    /// A failed item or chunk write is being replayed
    Retrying,
    /// A poison item is being excluded (no-rollback skip or scan mode)
    Skipping,
    /// Step reached end-of-stream and every chunk committed or resolved
    Completed,
    /// Step aborted on a fatal failure
    Failed,
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::Starting
    }
}

/// Overall job status, derived from step results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Every step execution completed
    Completed,
    /// At least one step execution failed
    Failed,
}

/// Terminal record of a step execution
///
/// Created when a step starts and updated as chunks resolve. The counters
/// always reflect committed progress plus the chunk that was in flight when
/// a fatal failure occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionResult {
    /// Step name from configuration
    pub step_name: String,

    /// Terminal (or in-flight) status
    pub status: StepStatus,

    /// Items pulled from the source
    pub read_count: usize,

    /// Items written through the sink in committed transactions
    pub write_count: usize,

    /// Items excluded by the transform returning a filtered marker
    pub filter_count: usize,

    /// Items excluded by the skip policy
    pub skip_count: usize,

    /// Committed transactions
    pub commit_count: usize,

    /// Rolled-back transactions
    pub rollback_count: usize,

    /// Root cause when the status is Failed
    pub failure: Option<ItemError>,

    /// Timestamp when the step execution started
    pub started_at: DateTime<Utc>,

    /// Timestamp when the step execution reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepExecutionResult {
    /// Create a new record in the Starting state
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Starting,
            read_count: 0,
            write_count: 0,
            filter_count: 0,
            skip_count: 0,
            commit_count: 0,
            rollback_count: 0,
            failure: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Transition to Running
    pub fn mark_running(&mut self) {
        self.status = StepStatus::Running;
    }

    /// Transition to Completed
    pub fn mark_completed(&mut self) {
        self.status = StepStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Transition to Failed with the root cause
    pub fn mark_failed(&mut self, cause: ItemError) {
        self.status = StepStatus::Failed;
        self.failure = Some(cause);
        self.completed_at = Some(Utc::now());
    }

    /// Check whether the step completed successfully
    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// Check whether the step failed
    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }

    /// Duration of the step execution, if it reached a terminal status
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }
}

/// Terminal record of a job execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionResult {
    /// Job name from configuration
    pub job_name: String,

    /// Derived status: Failed if any step failed, else Completed
    pub status: JobStatus,

    /// Per-step results in execution order
    pub steps: Vec<StepExecutionResult>,

    /// Timestamp when the job execution started
    pub started_at: DateTime<Utc>,

    /// Timestamp when the job execution finished
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobExecutionResult {
    /// Create a new record for a job that is starting
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            status: JobStatus::Completed,
            steps: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Append a step result, re-deriving the job status
    pub fn push_step(&mut self, step: StepExecutionResult) {
        if step.is_failed() {
            self.status = JobStatus::Failed;
        }
        self.steps.push(step);
    }

    /// Mark the job execution as finished
    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Total items written across all steps
    pub fn total_written(&self) -> usize {
        self.steps.iter().map(|s| s.write_count).sum()
    }

    /// Total items skipped across all steps
    pub fn total_skipped(&self) -> usize {
        self.steps.iter().map(|s| s.skip_count).sum()
    }

    /// Log a structured summary of the job execution
    pub fn log_summary(&self) {
        tracing::info!(
            job = %self.job_name,
            status = ?self.status,
            steps = self.steps.len(),
            written = self.total_written(),
            skipped = self.total_skipped(),
            "Job execution finished"
        );
        for step in &self.steps {
            tracing::info!(
                step = %step.step_name,
                status = ?step.status,
                read = step.read_count,
                written = step.write_count,
                filtered = step.filter_count,
                skipped = step.skip_count,
                commits = step.commit_count,
                rollbacks = step.rollback_count,
                "Step execution result"
            );
        }
    }
}
