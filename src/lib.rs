//! # Gristmill
//!
//! A fault-tolerant, chunk-oriented batch processing engine. Items are
//! pulled from a source, transformed one at a time, and written out in
//! fixed-size chunks under transactional semantics. Runtime failures are
//! classified into retryable, skippable, rollback-suppressing, or fatal,
//! and the engine recovers without losing or duplicating data.
//!
//! ## Architecture
//!
//! - [`domain`] — error taxonomy, execution ids, and execution records
//! - [`config`] — TOML configuration with validation and env overrides
//! - [`core`] — the engine: chunk orchestrator, fault tolerance policy,
//!   backoff, execution contexts, listeners, and the job runner
//! - [`adapters`] — in-memory reference implementations of the collaborator
//!   interfaces
//! - [`logging`] — structured logging setup
//!
//! ## Example
//!
//! ```no_run
//! use gristmill::adapters::{transactional_vec_sink, VecSource};
//! use gristmill::config::{ClassificationEntry, JobConfig, StepConfig};
//! use gristmill::core::chunk::ChunkOrchestrator;
//! use gristmill::core::context::ExecutionContextStore;
//! use gristmill::core::job::{ChunkStep, JobRunner, Step};
//! use gristmill::domain::{ItemError, Result};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let step_config = StepConfig::new("double", 10)
//!         .with_retry_limit(3)
//!         .with_classification(ClassificationEntry::new("TransientIoError").retryable());
//!
//!     let source = VecSource::new((1..=25).collect::<Vec<i64>>());
//!     let (sink, txn, output) = transactional_vec_sink::<i64>();
//!     let transform = |n: &i64| -> std::result::Result<Option<i64>, ItemError> {
//!         Ok(Some(n * 2))
//!     };
//!
//!     let mut steps: Vec<Box<dyn Step>> = vec![Box::new(ChunkStep::new(
//!         ChunkOrchestrator::new(step_config)?,
//!         source,
//!         transform,
//!         sink,
//!         txn,
//!     ))];
//!
//!     let store = Arc::new(ExecutionContextStore::new());
//!     let mut runner = JobRunner::new(JobConfig::new("doubler"), store);
//!     let result = runner.run(&mut steps).await?;
//!
//!     println!("wrote {} items", result.total_written());
//!     assert_eq!(output.committed_items().len(), 25);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
