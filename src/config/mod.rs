//! Configuration management for Gristmill.
//!
//! This module provides TOML-based configuration loading, parsing, and
//! validation for the batch engine.
//!
//! # Overview
//!
//! Gristmill uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - Default values for optional settings
//! - Comprehensive validation before any run starts
//! - Type-safe configuration structs
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gristmill::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("gristmill.toml")?;
//!
//! println!("Job: {}", config.job.name);
//! for step in &config.steps {
//!     println!("Step {}: chunks of {}", step.name, step.commit_interval);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```toml
//! [job]
//! name = "nightly-export"
//!
//! [job.parameters]
//! run_date = "2025-07-01"
//!
//! [[steps]]
//! name = "load-orders"
//! commit_interval = 100
//! retry_limit = 3
//! skip_limit = 5
//!
//! [steps.backoff]
//! initial_ms = 1000
//! multiplier = 2.0
//! max_ms = 10000
//!
//! [[steps.errors]]
//! class = "TransientIoError"
//! retryable = true
//!
//! [[steps.errors]]
//! class = "MalformedRecord"
//! skippable = true
//! no_rollback = true
//! ```
//!
//! # Validation
//!
//! Configuration is validated on load: `commit_interval > 0`,
//! `retry_limit >= 1`, backoff `multiplier >= 1.0`, unique step names,
//! unique classification classes, and required job parameters present.

pub mod loader;
pub mod schema;

// Re-export commonly used types
pub use loader::{load_config, load_config_str};
pub use schema::{
    BackoffConfig, ClassificationEntry, GristmillConfig, JobConfig, LoggingConfig, StepConfig,
};
