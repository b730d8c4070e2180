//! The chunk orchestrator
//!
//! Drives a step execution: read up to `commit_interval` items, transform
//! each one, write the surviving chunk inside a single transaction, and
//! consult the fault tolerance policy whenever the transform or the sink
//! fails. A chunk is never partially committed: either its transaction
//! commits with every surviving item, or the chunk rolls back and is
//! resolved in scan mode with one item per transaction.

use crate::config::StepConfig;
use crate::core::backoff::ExponentialBackoff;
use crate::core::context::ExecutionContextStore;
use crate::core::listener::{BatchEvent, ListenerDispatcher};
use crate::core::policy::{Decision, FailureRole, FaultTolerancePolicy, RetryState, SkipState};
use crate::core::step::{ItemSink, ItemSource, ItemTransform, TransactionManager};
use crate::domain::errors::{BatchError, ItemError};
use crate::domain::execution::{StepExecutionResult, StepStatus};
use crate::domain::ids::{JobExecutionId, StepExecutionId};
use crate::domain::result::Result;
use std::collections::HashSet;

/// How a chunk ended
enum ChunkOutcome {
    /// Every surviving item committed (in one transaction or via scan mode)
    Resolved,
    /// An unrecoverable failure; the step must abort
    Fatal(ItemError),
}

/// Per-chunk recovery bookkeeping
///
/// `excluded` holds positions the skip policy removed; `filtered` holds
/// positions the transform removed. Both survive chunk replays so an item is
/// never skipped or filter-counted twice. `pending_class` carries the error
/// class of a chunk write failure the sink could not attribute to one item;
/// the first scan-mode failure of that class identifies the poison item
/// without consulting the policy a second time.
#[derive(Debug, Default)]
struct ChunkRecovery {
    excluded: HashSet<usize>,
    filtered: HashSet<usize>,
    pending_class: Option<String>,
}

/// Drives chunk-oriented step executions
///
/// Built from a validated [`StepConfig`]; the classification table, retry
/// and skip limits, and backoff policy all come from there. Lifecycle hooks
/// are registered up front and observe every phase of the run.
pub struct ChunkOrchestrator {
    config: StepConfig,
    policy: FaultTolerancePolicy,
    backoff: ExponentialBackoff,
    listeners: ListenerDispatcher,
}

impl ChunkOrchestrator {
    /// Create an orchestrator for one step
    ///
    /// # Errors
    ///
    /// Returns a validation error if the step configuration is invalid.
    pub fn new(config: StepConfig) -> Result<Self> {
        config.validate().map_err(BatchError::Validation)?;
        let policy = FaultTolerancePolicy::from_config(&config);
        let backoff = ExponentialBackoff::from_config(&config.backoff);
        Ok(Self {
            config,
            policy,
            backoff,
            listeners: ListenerDispatcher::new(),
        })
    }

    /// Attach lifecycle hooks
    pub fn with_listeners(mut self, listeners: ListenerDispatcher) -> Self {
        self.listeners = listeners;
        self
    }

    /// Step name from configuration
    pub fn step_name(&self) -> &str {
        &self.config.name
    }

    /// Run the step to completion or failure
    ///
    /// Fails fast with [`BatchError::DuplicateExecution`] when this step
    /// already completed for the given job identity, without touching the
    /// source. A fatal item failure does not surface as `Err`: it is carried
    /// inside the returned record with status `Failed`. `Err` is reserved
    /// for infrastructure failures (transaction boundary, duplicate run).
    #[allow(clippy::too_many_arguments)]
    pub async fn run_step<I, O, S, T, K, X>(
        &mut self,
        store: &ExecutionContextStore,
        identity_key: &str,
        job_execution_id: &JobExecutionId,
        step_execution_id: &StepExecutionId,
        source: &mut S,
        transform: &mut T,
        sink: &mut K,
        txn: &mut X,
    ) -> Result<StepExecutionResult>
    where
        I: Send + Sync,
        O: Send + Sync,
        S: ItemSource<I>,
        T: ItemTransform<I, O>,
        K: ItemSink<O>,
        X: TransactionManager,
    {
        let step_name = self.config.name.clone();
        if store.is_step_complete(identity_key, &step_name) {
            return Err(BatchError::DuplicateExecution(format!(
                "step '{step_name}' of job '{identity_key}'"
            )));
        }

        tracing::info!(
            step = %step_name,
            job_execution_id = %job_execution_id,
            step_execution_id = %step_execution_id,
            commit_interval = self.config.commit_interval,
            "Starting step execution"
        );

        let mut result = StepExecutionResult::new(&step_name);
        self.listeners.dispatch(&BatchEvent::BeforeStep { step: &step_name });

        source.open(&store.step_scope(step_execution_id));
        result.mark_running();

        let mut retry = RetryState::new();
        let mut skip = SkipState::new();
        let mut eof = false;

        while !eof {
            let mut chunk: Vec<I> = Vec::with_capacity(self.config.commit_interval);
            while chunk.len() < self.config.commit_interval {
                self.listeners.dispatch(&BatchEvent::BeforeRead);
                match source.next().await {
                    Ok(Some(item)) => {
                        self.listeners.dispatch(&BatchEvent::AfterRead);
                        result.read_count += 1;
                        chunk.push(item);
                    }
                    Ok(None) => {
                        eof = true;
                        break;
                    }
                    Err(e) => {
                        self.listeners.dispatch(&BatchEvent::OnReadError { error: &e });
                        tracing::error!(step = %step_name, class = e.class(), "Source failed; aborting step");
                        result.skip_count = skip.count();
                        result.mark_failed(e);
                        self.listeners
                            .dispatch(&BatchEvent::AfterStep { step: &step_name, failed: true });
                        return Ok(result);
                    }
                }
            }

            if chunk.is_empty() {
                break;
            }

            self.listeners.dispatch(&BatchEvent::BeforeChunk { step: &step_name });
            let outcome = self
                .drive_chunk(
                    &chunk,
                    source,
                    transform,
                    sink,
                    txn,
                    store,
                    step_execution_id,
                    &mut retry,
                    &mut skip,
                    &mut result,
                )
                .await?;
            result.skip_count = skip.count();

            match outcome {
                ChunkOutcome::Resolved => {
                    self.listeners.dispatch(&BatchEvent::AfterChunk { step: &step_name });
                }
                ChunkOutcome::Fatal(cause) => {
                    tracing::error!(
                        step = %step_name,
                        class = cause.class(),
                        message = cause.message(),
                        "Fatal failure; aborting step"
                    );
                    result.mark_failed(cause);
                    self.listeners
                        .dispatch(&BatchEvent::AfterStep { step: &step_name, failed: true });
                    return Ok(result);
                }
            }
        }

        result.mark_completed();
        store.mark_step_complete(identity_key, &step_name);
        tracing::info!(
            step = %step_name,
            read = result.read_count,
            written = result.write_count,
            filtered = result.filter_count,
            skipped = result.skip_count,
            commits = result.commit_count,
            rollbacks = result.rollback_count,
            "Step execution completed"
        );
        self.listeners
            .dispatch(&BatchEvent::AfterStep { step: &step_name, failed: false });
        Ok(result)
    }

    /// Resolve one chunk: transform, write, commit
    ///
    /// Retry decisions for the `Write` role roll back and replay the whole
    /// chunk from the transform; retry decisions for the `Process` role
    /// replay only the failing item in place. Rollback-demanding skips hand
    /// the chunk to scan mode.
    #[allow(clippy::too_many_arguments)]
    async fn drive_chunk<I, O, S, T, K, X>(
        &mut self,
        items: &[I],
        source: &S,
        transform: &mut T,
        sink: &mut K,
        txn: &mut X,
        store: &ExecutionContextStore,
        step_execution_id: &StepExecutionId,
        retry: &mut RetryState,
        skip: &mut SkipState,
        result: &mut StepExecutionResult,
    ) -> Result<ChunkOutcome>
    where
        I: Send + Sync,
        O: Send + Sync,
        S: ItemSource<I>,
        T: ItemTransform<I, O>,
        K: ItemSink<O>,
        X: TransactionManager,
    {
        let mut recovery = ChunkRecovery::default();

        'chunk: loop {
            txn.begin().await?;

            let mut outputs: Vec<O> = Vec::new();
            let mut output_positions: Vec<usize> = Vec::new();

            for (idx, item) in items.iter().enumerate() {
                if recovery.excluded.contains(&idx) || recovery.filtered.contains(&idx) {
                    continue;
                }
                'item: loop {
                    self.listeners.dispatch(&BatchEvent::BeforeProcess);
                    match transform.apply(item) {
                        Ok(Some(output)) => {
                            self.listeners.dispatch(&BatchEvent::AfterProcess { filtered: false });
                            outputs.push(output);
                            output_positions.push(idx);
                            break 'item;
                        }
                        Ok(None) => {
                            if recovery.filtered.insert(idx) {
                                result.filter_count += 1;
                            }
                            self.listeners.dispatch(&BatchEvent::AfterProcess { filtered: true });
                            break 'item;
                        }
                        Err(e) => {
                            self.listeners.dispatch(&BatchEvent::OnProcessError { error: &e });
                            match self.policy.on_failure(&e, FailureRole::Process, retry, skip) {
                                Decision::Retry { attempt } => {
                                    result.status = StepStatus::Retrying;
                                    self.backoff.wait(attempt).await;
                                    continue 'item;
                                }
                                Decision::SkipAndContinue | Decision::SkipItem => {
                                    result.status = StepStatus::Skipping;
                                    recovery.excluded.insert(idx);
                                    break 'item;
                                }
                                Decision::RollbackChunk => {
                                    result.status = StepStatus::Skipping;
                                    txn.rollback().await?;
                                    result.rollback_count += 1;
                                    recovery.excluded.insert(idx);
                                    return self
                                        .scan_chunk(
                                            items,
                                            source,
                                            transform,
                                            sink,
                                            txn,
                                            store,
                                            step_execution_id,
                                            retry,
                                            skip,
                                            result,
                                            &mut recovery,
                                        )
                                        .await;
                                }
                                Decision::Fatal => {
                                    txn.rollback().await?;
                                    result.rollback_count += 1;
                                    return Ok(ChunkOutcome::Fatal(e));
                                }
                            }
                        }
                    }
                }
            }

            'write: loop {
                if outputs.is_empty() {
                    // Every buffered item was filtered or skipped; the
                    // transaction still closes so the boundary stays aligned
                    // with the chunk.
                    self.checkpoint(store, step_execution_id, source);
                    txn.commit().await?;
                    result.commit_count += 1;
                    result.status = StepStatus::Running;
                    return Ok(ChunkOutcome::Resolved);
                }

                self.listeners.dispatch(&BatchEvent::BeforeWrite { count: outputs.len() });
                match sink.write(&outputs).await {
                    Ok(()) => {
                        self.listeners.dispatch(&BatchEvent::AfterWrite { count: outputs.len() });
                        self.checkpoint(store, step_execution_id, source);
                        txn.commit().await?;
                        result.commit_count += 1;
                        result.write_count += outputs.len();
                        result.status = StepStatus::Running;
                        return Ok(ChunkOutcome::Resolved);
                    }
                    Err(e) => {
                        self.listeners.dispatch(&BatchEvent::OnWriteError { error: &e });
                        match self.policy.on_failure(&e, FailureRole::Write, retry, skip) {
                            Decision::Retry { attempt } => {
                                result.status = StepStatus::Retrying;
                                txn.rollback().await?;
                                result.rollback_count += 1;
                                self.backoff.wait(attempt).await;
                                continue 'chunk;
                            }
                            Decision::SkipAndContinue => {
                                result.status = StepStatus::Skipping;
                                if let Some(i) = e.item_index().filter(|i| *i < outputs.len()) {
                                    // The sink named the poison item; drop it
                                    // and rewrite the remainder in the same
                                    // transaction.
                                    recovery.excluded.insert(output_positions[i]);
                                    outputs.remove(i);
                                    output_positions.remove(i);
                                    continue 'write;
                                }
                                // Unattributed failure: the no-rollback
                                // request cannot be honored, so fall back to
                                // rollback and scan.
                                txn.rollback().await?;
                                result.rollback_count += 1;
                                recovery.pending_class = Some(e.class().to_string());
                                return self
                                    .scan_chunk(
                                        items,
                                        source,
                                        transform,
                                        sink,
                                        txn,
                                        store,
                                        step_execution_id,
                                        retry,
                                        skip,
                                        result,
                                        &mut recovery,
                                    )
                                    .await;
                            }
                            Decision::RollbackChunk | Decision::SkipItem => {
                                result.status = StepStatus::Skipping;
                                txn.rollback().await?;
                                result.rollback_count += 1;
                                if let Some(i) = e.item_index().filter(|i| *i < outputs.len()) {
                                    recovery.excluded.insert(output_positions[i]);
                                } else {
                                    recovery.pending_class = Some(e.class().to_string());
                                }
                                return self
                                    .scan_chunk(
                                        items,
                                        source,
                                        transform,
                                        sink,
                                        txn,
                                        store,
                                        step_execution_id,
                                        retry,
                                        skip,
                                        result,
                                        &mut recovery,
                                    )
                                    .await;
                            }
                            Decision::Fatal => {
                                txn.rollback().await?;
                                result.rollback_count += 1;
                                return Ok(ChunkOutcome::Fatal(e));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Resolve a rolled-back chunk one item per transaction
    ///
    /// Items already excluded or filtered are passed over without consulting
    /// the policy again, which is what keeps the poison item from being skip
    /// counted twice.
    #[allow(clippy::too_many_arguments)]
    async fn scan_chunk<I, O, S, T, K, X>(
        &mut self,
        items: &[I],
        source: &S,
        transform: &mut T,
        sink: &mut K,
        txn: &mut X,
        store: &ExecutionContextStore,
        step_execution_id: &StepExecutionId,
        retry: &mut RetryState,
        skip: &mut SkipState,
        result: &mut StepExecutionResult,
        recovery: &mut ChunkRecovery,
    ) -> Result<ChunkOutcome>
    where
        I: Send + Sync,
        O: Send + Sync,
        S: ItemSource<I>,
        T: ItemTransform<I, O>,
        K: ItemSink<O>,
        X: TransactionManager,
    {
        tracing::info!(step = %self.config.name, chunk_size = items.len(), "Entering scan mode");
        result.status = StepStatus::Skipping;

        'scan: for (idx, item) in items.iter().enumerate() {
            if recovery.excluded.contains(&idx) || recovery.filtered.contains(&idx) {
                continue;
            }
            txn.begin().await?;

            let output = 'item: loop {
                self.listeners.dispatch(&BatchEvent::BeforeProcess);
                match transform.apply(item) {
                    Ok(Some(output)) => {
                        self.listeners.dispatch(&BatchEvent::AfterProcess { filtered: false });
                        break 'item Some(output);
                    }
                    Ok(None) => {
                        if recovery.filtered.insert(idx) {
                            result.filter_count += 1;
                        }
                        self.listeners.dispatch(&BatchEvent::AfterProcess { filtered: true });
                        break 'item None;
                    }
                    Err(e) => {
                        self.listeners.dispatch(&BatchEvent::OnProcessError { error: &e });
                        if recovery.pending_class.as_deref() == Some(e.class()) {
                            // This is the failure that forced the rollback;
                            // its skip was already counted.
                            recovery.pending_class = None;
                            recovery.excluded.insert(idx);
                            txn.rollback().await?;
                            result.rollback_count += 1;
                            continue 'scan;
                        }
                        match self.policy.on_scan_failure(&e, FailureRole::Process, retry, skip) {
                            Decision::Retry { attempt } => {
                                self.backoff.wait(attempt).await;
                                continue 'item;
                            }
                            Decision::Fatal => {
                                txn.rollback().await?;
                                result.rollback_count += 1;
                                return Ok(ChunkOutcome::Fatal(e));
                            }
                            _ => {
                                recovery.excluded.insert(idx);
                                txn.rollback().await?;
                                result.rollback_count += 1;
                                continue 'scan;
                            }
                        }
                    }
                }
            };

            let Some(output) = output else {
                // Filtered in scan mode; the single-item transaction closes
                // empty.
                txn.commit().await?;
                result.commit_count += 1;
                continue 'scan;
            };

            'write: loop {
                self.listeners.dispatch(&BatchEvent::BeforeWrite { count: 1 });
                match sink.write(std::slice::from_ref(&output)).await {
                    Ok(()) => {
                        self.listeners.dispatch(&BatchEvent::AfterWrite { count: 1 });
                        self.checkpoint(store, step_execution_id, source);
                        txn.commit().await?;
                        result.commit_count += 1;
                        result.write_count += 1;
                        continue 'scan;
                    }
                    Err(e) => {
                        self.listeners.dispatch(&BatchEvent::OnWriteError { error: &e });
                        if recovery.pending_class.as_deref() == Some(e.class()) {
                            recovery.pending_class = None;
                            recovery.excluded.insert(idx);
                            txn.rollback().await?;
                            result.rollback_count += 1;
                            continue 'scan;
                        }
                        match self.policy.on_scan_failure(&e, FailureRole::Write, retry, skip) {
                            Decision::Retry { attempt } => {
                                self.backoff.wait(attempt).await;
                                continue 'write;
                            }
                            Decision::Fatal => {
                                txn.rollback().await?;
                                result.rollback_count += 1;
                                return Ok(ChunkOutcome::Fatal(e));
                            }
                            _ => {
                                recovery.excluded.insert(idx);
                                txn.rollback().await?;
                                result.rollback_count += 1;
                                continue 'scan;
                            }
                        }
                    }
                }
            }
        }

        tracing::info!(step = %self.config.name, "Scan mode resolved the chunk");
        result.status = StepStatus::Running;
        Ok(ChunkOutcome::Resolved)
    }

    /// Record the source position into the step scope, just before a commit
    fn checkpoint<I, S: ItemSource<I>>(
        &self,
        store: &ExecutionContextStore,
        step_execution_id: &StepExecutionId,
        source: &S,
    ) {
        store.update_step_scope(step_execution_id, |ctx| source.checkpoint(ctx));
    }
}
