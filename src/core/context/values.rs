//! Execution context values
//!
//! An execution context is a flat string-keyed map used to persist progress
//! markers for restart and to hand values between lifecycle hooks. Values
//! are deliberately restricted to strings, numbers, and datetimes (no nested
//! structures) so they can be persisted and restored verbatim across process
//! restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single context value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextValue {
    /// String value
    String(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// UTC timestamp value
    DateTime(DateTime<Utc>),
}

/// Flat key/value execution context
///
/// One instance exists per job execution (visible to every step of that job
/// execution) and one per step execution (private to that step execution).
///
/// # Examples
///
/// ```
/// use gristmill::core::context::ExecutionContext;
///
/// let mut ctx = ExecutionContext::new();
/// ctx.put_i64("source.position", 42);
/// assert_eq!(ctx.get_i64("source.position"), Some(42));
/// assert!(ctx.contains_key("source.position"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    values: BTreeMap<String, ContextValue>,
}

impl ExecutionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw context value
    pub fn put(&mut self, key: impl Into<String>, value: ContextValue) {
        self.values.insert(key.into(), value);
    }

    /// Store a string value
    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.put(key, ContextValue::String(value.into()));
    }

    /// Store an integer value
    pub fn put_i64(&mut self, key: impl Into<String>, value: i64) {
        self.put(key, ContextValue::Integer(value));
    }

    /// Store a floating point value
    pub fn put_f64(&mut self, key: impl Into<String>, value: f64) {
        self.put(key, ContextValue::Float(value));
    }

    /// Store a timestamp value
    pub fn put_datetime(&mut self, key: impl Into<String>, value: DateTime<Utc>) {
        self.put(key, ContextValue::DateTime(value));
    }

    /// Fetch a raw context value
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    /// Fetch a string value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(ContextValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Fetch an integer value
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(ContextValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    /// Fetch a floating point value
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(ContextValue::Float(n)) => Some(*n),
            _ => None,
        }
    }

    /// Fetch a timestamp value
    pub fn get_datetime(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.values.get(key) {
            Some(ContextValue::DateTime(t)) => Some(*t),
            _ => None,
        }
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> Option<ContextValue> {
        self.values.remove(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the context holds no entries
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ContextValue)> {
        self.values.iter()
    }
}
