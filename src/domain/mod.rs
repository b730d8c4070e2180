//! Domain models and types for Gristmill.
//!
//! This module contains the core domain types shared by the engine:
//!
//! - **Strongly-typed identifiers** ([`JobExecutionId`], [`StepExecutionId`])
//! - **Execution records** ([`StepExecutionResult`], [`JobExecutionResult`])
//! - **Error types** ([`BatchError`], [`ItemError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible engine operations return [`Result<T, BatchError>`]. Failures
//! raised by sources, transforms, and sinks are [`ItemError`]s: classifiable
//! errors that the fault tolerance policy maps to retry, skip, rollback, or
//! fatal decisions. An `ItemError` only surfaces as a `BatchError` once the
//! policy has escalated it to fatal.

pub mod errors;
pub mod execution;
pub mod ids;
pub mod result;

// Re-export commonly used types for convenience
pub use errors::{BatchError, ItemError};
pub use execution::{JobExecutionResult, JobStatus, StepExecutionResult, StepStatus};
pub use ids::{JobExecutionId, StepExecutionId};
pub use result::Result;
