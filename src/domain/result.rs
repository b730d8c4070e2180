//! Crate-wide result alias
//!
//! Fallible engine operations return [`Result<T>`] with [`BatchError`] as
//! the error type. Item-level failures travel as `ItemError` between the
//! collaborators and the fault tolerance policy, and only surface here once
//! the policy has escalated them.

use super::errors::BatchError;

/// Result of a fallible engine operation
///
/// # Examples
///
/// ```
/// use gristmill::config::load_config_str;
/// use gristmill::domain::errors::BatchError;
/// use gristmill::domain::result::Result;
///
/// fn commit_interval(toml: &str, step: &str) -> Result<usize> {
///     let config = load_config_str(toml)?;
///     config
///         .step(step)
///         .map(|s| s.commit_interval)
///         .ok_or_else(|| BatchError::Validation(format!("no step named '{step}'")))
/// }
/// ```
pub type Result<T> = std::result::Result<T, BatchError>;
