//! Job execution
//!
//! A job is an ordered sequence of steps sharing one job-scoped execution
//! context. The runner validates job parameters, refuses to re-run an
//! identity that already completed, skips individual steps that completed in
//! an earlier run of the same identity, and derives the job status from the
//! step results.

use crate::config::JobConfig;
use crate::core::chunk::ChunkOrchestrator;
use crate::core::context::ExecutionContextStore;
use crate::core::listener::{BatchEvent, ListenerDispatcher};
use crate::core::step::{ItemSink, ItemSource, ItemTransform, TransactionManager};
use crate::domain::errors::BatchError;
use crate::domain::execution::{JobExecutionResult, JobStatus, StepExecutionResult};
use crate::domain::ids::{JobExecutionId, StepExecutionId};
use crate::domain::result::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Identity of a job run: name plus flat string parameters
///
/// Two runs with the same identity are the same logical job instance; once
/// one completes, later runs with that identity must fail fast instead of
/// re-processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIdentity {
    name: String,
    parameters: BTreeMap<String, String>,
}

impl JobIdentity {
    /// Identity with no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Identity taken from a job configuration
    pub fn from_config(config: &JobConfig) -> Self {
        Self {
            name: config.name.clone(),
            parameters: config.parameters.clone(),
        }
    }

    /// Add a parameter
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Job name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter lookup
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Stable registry key for this identity
    ///
    /// Parameters are in a BTreeMap, so the rendering is deterministic.
    pub fn key(&self) -> String {
        if self.parameters.is_empty() {
            return self.name.clone();
        }
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("{}?{}", self.name, params.join("&"))
    }
}

/// Per-execution handles a step needs from its surrounding job
pub struct StepRun<'a> {
    /// Shared context store
    pub store: &'a ExecutionContextStore,
    /// Registry key of the owning job identity
    pub identity_key: &'a str,
    /// Id of the owning job execution
    pub job_execution_id: JobExecutionId,
    /// Id of this step execution
    pub step_execution_id: StepExecutionId,
}

/// One unit of work inside a job
#[async_trait]
pub trait Step: Send {
    /// Step name, unique within the job
    fn name(&self) -> &str;

    /// Execute the step to a terminal status
    async fn execute(&mut self, run: &StepRun<'_>) -> Result<StepExecutionResult>;
}

/// Chunk-oriented step: a [`ChunkOrchestrator`] wired to its collaborators
pub struct ChunkStep<I, O, S, T, K, X> {
    orchestrator: ChunkOrchestrator,
    source: S,
    transform: T,
    sink: K,
    txn: X,
    _items: PhantomData<fn(I) -> O>,
}

impl<I, O, S, T, K, X> ChunkStep<I, O, S, T, K, X>
where
    I: Send + Sync,
    O: Send + Sync,
    S: ItemSource<I> + Sync,
    T: ItemTransform<I, O>,
    K: ItemSink<O>,
    X: TransactionManager,
{
    /// Wire an orchestrator to its source, transform, sink, and transaction
    /// manager
    pub fn new(orchestrator: ChunkOrchestrator, source: S, transform: T, sink: K, txn: X) -> Self {
        Self {
            orchestrator,
            source,
            transform,
            sink,
            txn,
            _items: PhantomData,
        }
    }
}

#[async_trait]
impl<I, O, S, T, K, X> Step for ChunkStep<I, O, S, T, K, X>
where
    I: Send + Sync,
    O: Send + Sync,
    S: ItemSource<I> + Sync,
    T: ItemTransform<I, O>,
    K: ItemSink<O>,
    X: TransactionManager,
{
    fn name(&self) -> &str {
        self.orchestrator.step_name()
    }

    async fn execute(&mut self, run: &StepRun<'_>) -> Result<StepExecutionResult> {
        self.orchestrator
            .run_step(
                run.store,
                run.identity_key,
                &run.job_execution_id,
                &run.step_execution_id,
                &mut self.source,
                &mut self.transform,
                &mut self.sink,
                &mut self.txn,
            )
            .await
    }
}

/// Runs the steps of a job in order
pub struct JobRunner {
    config: JobConfig,
    store: Arc<ExecutionContextStore>,
    listeners: ListenerDispatcher,
}

impl JobRunner {
    /// Create a runner over a shared context store
    pub fn new(config: JobConfig, store: Arc<ExecutionContextStore>) -> Self {
        Self {
            config,
            store,
            listeners: ListenerDispatcher::new(),
        }
    }

    /// Attach job-level lifecycle hooks
    pub fn with_listeners(mut self, listeners: ListenerDispatcher) -> Self {
        self.listeners = listeners;
        self
    }

    /// Identity of the runs this runner launches
    pub fn identity(&self) -> JobIdentity {
        JobIdentity::from_config(&self.config)
    }

    /// Run every step in order
    ///
    /// Fails fast with [`BatchError::DuplicateExecution`] when this job
    /// identity already completed. Steps that completed in an earlier run of
    /// the same identity are skipped; a failed step stops the job and the
    /// remaining steps do not run.
    pub async fn run(&mut self, steps: &mut [Box<dyn Step>]) -> Result<JobExecutionResult> {
        self.config.validate().map_err(BatchError::Validation)?;

        let identity = self.identity();
        let identity_key = identity.key();
        if self.store.is_job_complete(&identity_key) {
            return Err(BatchError::DuplicateExecution(format!("job '{identity_key}'")));
        }

        let job_execution_id = JobExecutionId::new();
        tracing::info!(
            job = %self.config.name,
            identity = %identity_key,
            job_execution_id = %job_execution_id,
            steps = steps.len(),
            "Starting job execution"
        );
        self.listeners.dispatch(&BatchEvent::BeforeJob { job: &self.config.name });

        let mut result = JobExecutionResult::new(&self.config.name);
        for step in steps.iter_mut() {
            if self.store.is_step_complete(&identity_key, step.name()) {
                tracing::info!(
                    job = %self.config.name,
                    step = %step.name(),
                    "Step already completed for this identity; skipping"
                );
                continue;
            }

            let run = StepRun {
                store: &self.store,
                identity_key: &identity_key,
                job_execution_id,
                step_execution_id: StepExecutionId::new(),
            };
            let step_result = step.execute(&run).await?;
            let failed = step_result.is_failed();
            result.push_step(step_result);
            if failed {
                tracing::error!(
                    job = %self.config.name,
                    step = %step.name(),
                    "Step failed; remaining steps will not run"
                );
                break;
            }
        }

        result.finish();
        if result.status == JobStatus::Completed {
            self.store.mark_job_complete(&identity_key);
        }
        result.log_summary();
        self.listeners.dispatch(&BatchEvent::AfterJob {
            job: &self.config.name,
            failed: result.status == JobStatus::Failed,
        });
        Ok(result)
    }
}
