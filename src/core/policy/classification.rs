//! Error classification table
//!
//! Maps error classes to recovery flags. Unclassified classes are fatal by
//! default.

use crate::config::ClassificationEntry;
use std::collections::HashMap;

/// Recovery flags for one error class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationFlags {
    /// Transient failure; replay up to the retry limit
    pub retryable: bool,
    /// Permanently bad item; exclude it up to the skip limit
    pub skippable: bool,
    /// Suppress chunk-wide rollback when skipping
    pub no_rollback: bool,
}

/// Lookup table from error class to recovery flags
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    table: HashMap<String, (ClassificationFlags, Option<u32>)>,
}

impl ErrorClassifier {
    /// Build a classifier from configuration entries
    pub fn from_entries(entries: &[ClassificationEntry]) -> Self {
        let mut table = HashMap::new();
        for entry in entries {
            let flags = ClassificationFlags {
                retryable: entry.retryable,
                skippable: entry.skippable,
                no_rollback: entry.no_rollback,
            };
            table.insert(entry.class.clone(), (flags, entry.retry_limit));
        }
        Self { table }
    }

    /// Look up the flags for an error class; `None` means unclassified
    pub fn classify(&self, class: &str) -> Option<ClassificationFlags> {
        self.table.get(class).map(|(flags, _)| *flags)
    }

    /// Per-class retry limit override, if configured
    pub fn retry_limit_override(&self, class: &str) -> Option<u32> {
        self.table.get(class).and_then(|(_, limit)| *limit)
    }
}
