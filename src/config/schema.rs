//! Configuration schema types
//!
//! This module defines the configuration structure for Gristmill. Every
//! tunable the orchestrator consumes is explicit here and validated before
//! a run starts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main Gristmill configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GristmillConfig {
    /// Job-level settings
    pub job: JobConfig,

    /// Step definitions, executed in order
    #[serde(default)]
    pub steps: Vec<StepConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GristmillConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.job.validate()?;
        if self.steps.is_empty() {
            return Err("At least one [[steps]] entry is required".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            step.validate()?;
            if !seen.insert(step.name.as_str()) {
                return Err(format!("Duplicate step name '{}'", step.name));
            }
        }
        self.logging.validate()?;
        Ok(())
    }

    /// Look up a step configuration by name
    pub fn step(&self, name: &str) -> Option<&StepConfig> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Job-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job name; combined with parameters it forms the job identity
    pub name: String,

    /// Flat string parameters; part of the job identity for restart checks
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    /// Parameter keys that must be present before the job may start
    #[serde(default)]
    pub required_parameters: Vec<String>,
}

impl JobConfig {
    /// Create a job configuration with no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
            required_parameters: Vec::new(),
        }
    }

    /// Add a parameter
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Validates the job configuration, including required parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("job.name cannot be empty".to_string());
        }
        for key in &self.required_parameters {
            if !self.parameters.contains_key(key) {
                return Err(format!("Missing required job parameter '{key}'"));
            }
        }
        Ok(())
    }
}

/// Chunk step configuration
///
/// One entry per step. `commit_interval` is the chunk size: the number of
/// items read before the buffered chunk is transformed and written in one
/// transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name, unique within the job
    pub name: String,

    /// Chunk size (> 0)
    pub commit_interval: usize,

    /// Maximum attempts for one item before escalating to skip or fatal.
    /// The first attempt counts, so `retry_limit = 3` allows two replays.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Maximum items this step may discard before failing
    #[serde(default)]
    pub skip_limit: usize,

    /// Backoff between a failed attempt and its replay
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Error classification table; unlisted classes are fatal
    #[serde(default)]
    pub errors: Vec<ClassificationEntry>,
}

impl StepConfig {
    /// Create a step configuration with defaults for everything but the
    /// name and chunk size
    pub fn new(name: impl Into<String>, commit_interval: usize) -> Self {
        Self {
            name: name.into(),
            commit_interval,
            retry_limit: default_retry_limit(),
            skip_limit: 0,
            backoff: BackoffConfig::default(),
            errors: Vec::new(),
        }
    }

    /// Set the retry limit
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    /// Set the skip limit
    pub fn with_skip_limit(mut self, limit: usize) -> Self {
        self.skip_limit = limit;
        self
    }

    /// Set the backoff policy
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Add a classification entry
    pub fn with_classification(mut self, entry: ClassificationEntry) -> Self {
        self.errors.push(entry);
        self
    }

    /// Validates the step configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("step name cannot be empty".to_string());
        }
        if self.commit_interval == 0 {
            return Err(format!(
                "step '{}': commit_interval must be greater than 0",
                self.name
            ));
        }
        if self.retry_limit == 0 {
            return Err(format!(
                "step '{}': retry_limit must be at least 1 (the first attempt counts)",
                self.name
            ));
        }
        self.backoff.validate().map_err(|e| {
            format!("step '{}': {e}", self.name)
        })?;
        let mut seen = std::collections::HashSet::new();
        for entry in &self.errors {
            entry.validate()?;
            if !seen.insert(entry.class.as_str()) {
                return Err(format!(
                    "step '{}': duplicate classification for error class '{}'",
                    self.name, entry.class
                ));
            }
        }
        Ok(())
    }
}

fn default_retry_limit() -> u32 {
    1
}

/// Exponential backoff policy between a failed attempt and its replay
///
/// A fixed backoff is the degenerate case `multiplier = 1.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Initial wait before the first replay, in milliseconds
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,

    /// Wait multiplier per subsequent replay (>= 1.0)
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,

    /// Cap on the wait, in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            multiplier: default_backoff_multiplier(),
            max_ms: default_backoff_max_ms(),
        }
    }
}

impl BackoffConfig {
    /// A backoff policy that never waits; useful in tests
    pub fn none() -> Self {
        Self {
            initial_ms: 0,
            multiplier: 1.0,
            max_ms: 0,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.multiplier < 1.0 {
            return Err(format!(
                "backoff multiplier must be >= 1.0, got {}",
                self.multiplier
            ));
        }
        if self.max_ms < self.initial_ms {
            return Err(format!(
                "backoff max_ms ({}) must be >= initial_ms ({})",
                self.max_ms, self.initial_ms
            ));
        }
        Ok(())
    }
}

fn default_backoff_initial_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_max_ms() -> u64 {
    10_000
}

/// One row of the error classification table
///
/// Flags combine freely: a class can be retryable and skippable (retries are
/// exhausted first, then skip takes over), and a skippable class marked
/// `no_rollback` is excluded without forcing a chunk-wide rollback.
/// `no_rollback` without `skippable` has no effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationEntry {
    /// Error class this entry applies to
    pub class: String,

    /// Transient failure; replay up to the retry limit
    #[serde(default)]
    pub retryable: bool,

    /// Permanently bad item; exclude it up to the skip limit
    #[serde(default)]
    pub skippable: bool,

    /// Suppress chunk-wide rollback when skipping this class
    #[serde(default)]
    pub no_rollback: bool,

    /// Per-class override of the step retry limit
    #[serde(default)]
    pub retry_limit: Option<u32>,
}

impl ClassificationEntry {
    /// Create an entry with all flags off
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            retryable: false,
            skippable: false,
            no_rollback: false,
            retry_limit: None,
        }
    }

    /// Mark the class retryable
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// Mark the class skippable
    pub fn skippable(mut self) -> Self {
        self.skippable = true;
        self
    }

    /// Mark the class rollback-suppressing
    pub fn no_rollback(mut self) -> Self {
        self.no_rollback = true;
        self
    }

    /// Override the step retry limit for this class
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = Some(limit);
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.class.trim().is_empty() {
            return Err("classification class cannot be empty".to_string());
        }
        if let Some(0) = self.retry_limit {
            return Err(format!(
                "classification '{}': retry_limit override must be at least 1",
                self.class
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Directory for local log files
    #[serde(default = "default_log_path")]
    pub local_path: String,

    /// Rotation policy: daily or hourly
    #[serde(default = "default_log_rotation")]
    pub local_rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            local_enabled: false,
            local_path: default_log_path(),
            local_rotation: default_log_rotation(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(format!(
                "Invalid logging level '{}'. Must be one of: {}",
                self.level,
                valid_levels.join(", ")
            ));
        }
        let valid_rotations = ["daily", "hourly"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_path() -> String {
    "logs".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}
