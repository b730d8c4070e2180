//! Execution identifier types
//!
//! This module provides newtype wrappers for execution identifiers. Each job
//! run and each step run gets a fresh identity so that execution contexts,
//! retry state, and skip state can never leak across concurrent executions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Job execution identifier newtype wrapper
///
/// Identifies a single run of a job. Two runs of the same job definition
/// (even with identical parameters) have distinct execution ids.
///
/// # Examples
///
/// ```
/// use gristmill::domain::ids::JobExecutionId;
///
/// let a = JobExecutionId::new();
/// let b = JobExecutionId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobExecutionId(Uuid);

impl JobExecutionId {
    /// Creates a fresh job execution id
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for JobExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobExecutionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid job execution id '{s}': {e}"))
    }
}

/// Step execution identifier newtype wrapper
///
/// Identifies a single run of a step within a job execution. Step-scoped
/// execution context is keyed by this id and is never visible to sibling
/// step executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepExecutionId(Uuid);

impl StepExecutionId {
    /// Creates a fresh step execution id
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for StepExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StepExecutionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid step execution id '{s}': {e}"))
    }
}
