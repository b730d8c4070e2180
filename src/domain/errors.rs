//! Domain error types
//!
//! This module defines the error hierarchy for Gristmill. The engine-level
//! error type covers configuration, validation, and infrastructure failures;
//! item-level failures raised by sources, transforms, and sinks are carried
//! by [`ItemError`] so they can be classified by the fault tolerance policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main Gristmill error type
///
/// This is the primary error type used throughout the engine.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Execution context errors
    #[error("Execution context error: {0}")]
    Context(String),

    /// Transaction boundary errors (begin/commit/rollback failed)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A job or step execution with this identity already completed
    #[error("Duplicate execution: {0} already completed")]
    DuplicateExecution(String),

    /// Item-level failure that escalated to fatal
    #[error("Item error: {0}")]
    Item(#[from] ItemError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Classifiable failure raised by a source, transform, or sink
///
/// The `class` field keys into the step's error classification table; classes
/// that are not listed there are treated as fatal. Sinks that can attribute a
/// chunk-write failure to a single item may set `item_index` (the position of
/// the failing item within the written chunk) so the engine can skip exactly
/// that item without a chunk-wide rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    class: String,
    message: String,
    item_index: Option<usize>,
}

impl ItemError {
    /// Creates a new item error with the given classification class
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            item_index: None,
        }
    }

    /// Attributes this error to the item at `index` within the written chunk
    pub fn with_item_index(mut self, index: usize) -> Self {
        self.item_index = Some(index);
        self
    }

    /// Returns the classification class of this error
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the index of the failing item within the written chunk, if known
    pub fn item_index(&self) -> Option<usize> {
        self.item_index
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.class, self.message)
    }
}

impl std::error::Error for ItemError {}

// Conversion from std::io::Error
impl From<std::io::Error> for BatchError {
    fn from(err: std::io::Error) -> Self {
        BatchError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for BatchError {
    fn from(err: serde_json::Error) -> Self {
        BatchError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for BatchError {
    fn from(err: toml::de::Error) -> Self {
        BatchError::Configuration(format!("TOML parse error: {err}"))
    }
}
