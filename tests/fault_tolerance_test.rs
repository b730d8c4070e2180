//! Integration tests for retry, skip, scan-mode, and fatal recovery paths

use async_trait::async_trait;
use gristmill::adapters::{transactional_vec_sink, TransactionalVecSink, VecSource, VecTransaction};
use gristmill::config::{BackoffConfig, ClassificationEntry, StepConfig};
use gristmill::core::chunk::ChunkOrchestrator;
use gristmill::core::context::ExecutionContextStore;
use gristmill::core::step::{ItemSink, ItemTransform};
use gristmill::domain::{ItemError, StepExecutionResult, StepStatus};
use gristmill::domain::ids::{JobExecutionId, StepExecutionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Transform that doubles items and fails scripted values
struct FlakyTransform {
    calls: Arc<Mutex<Vec<i64>>>,
    // remaining failures per value; usize::MAX means always fail
    failures: HashMap<i64, usize>,
    class: &'static str,
}

impl FlakyTransform {
    fn new(class: &'static str, failures: &[(i64, usize)]) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: failures.iter().copied().collect(),
            class,
        }
    }

    fn call_log(&self) -> Arc<Mutex<Vec<i64>>> {
        Arc::clone(&self.calls)
    }
}

impl ItemTransform<i64, i64> for FlakyTransform {
    fn apply(&mut self, item: &i64) -> Result<Option<i64>, ItemError> {
        self.calls.lock().unwrap().push(*item);
        if let Some(remaining) = self.failures.get_mut(item) {
            if *remaining > 0 {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                return Err(ItemError::new(self.class, format!("cannot process {item}")));
            }
        }
        Ok(Some(item * 2))
    }
}

/// Sink that fails whenever the written batch contains a poison value
struct PoisonSink {
    inner: TransactionalVecSink<i64>,
    poison: i64,
    class: &'static str,
    remaining_failures: usize,
    attribute_index: bool,
    write_calls: Arc<Mutex<usize>>,
}

impl PoisonSink {
    fn new(inner: TransactionalVecSink<i64>, poison: i64, class: &'static str) -> Self {
        Self {
            inner,
            poison,
            class,
            remaining_failures: usize::MAX,
            attribute_index: false,
            write_calls: Arc::new(Mutex::new(0)),
        }
    }

    fn failing_times(mut self, times: usize) -> Self {
        self.remaining_failures = times;
        self
    }

    fn attributing_index(mut self) -> Self {
        self.attribute_index = true;
        self
    }

    fn call_counter(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.write_calls)
    }
}

#[async_trait]
impl ItemSink<i64> for PoisonSink {
    async fn write(&mut self, items: &[i64]) -> Result<(), ItemError> {
        *self.write_calls.lock().unwrap() += 1;
        if self.remaining_failures > 0 {
            if let Some(pos) = items.iter().position(|n| *n == self.poison) {
                if self.remaining_failures != usize::MAX {
                    self.remaining_failures -= 1;
                }
                let mut error = ItemError::new(self.class, format!("cannot write {}", self.poison));
                if self.attribute_index {
                    error = error.with_item_index(pos);
                }
                return Err(error);
            }
        }
        self.inner.write(items).await
    }
}

async fn run_step<T, K>(
    config: StepConfig,
    items: Vec<i64>,
    transform: T,
    sink: K,
    txn: VecTransaction<i64>,
) -> StepExecutionResult
where
    T: ItemTransform<i64, i64>,
    K: ItemSink<i64>,
{
    let mut orchestrator = ChunkOrchestrator::new(config).unwrap();
    let store = ExecutionContextStore::new();
    let mut source = VecSource::new(items);
    let mut transform = transform;
    let mut sink = sink;
    let mut txn = txn;
    orchestrator
        .run_step(
            &store,
            "test-job",
            &JobExecutionId::new(),
            &StepExecutionId::new(),
            &mut source,
            &mut transform,
            &mut sink,
            &mut txn,
        )
        .await
        .unwrap()
}

fn step_config() -> StepConfig {
    StepConfig::new("load", 10).with_backoff(BackoffConfig::none())
}

#[tokio::test]
async fn test_transient_process_failure_is_retried_in_place() {
    let config = step_config()
        .with_retry_limit(3)
        .with_classification(ClassificationEntry::new("TransientError").retryable());
    let transform = FlakyTransform::new("TransientError", &[(7, 2)]);
    let calls = transform.call_log();
    let (sink, txn, output) = transactional_vec_sink();

    let result = run_step(config, (1..=10).collect(), transform, sink, txn).await;

    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.read_count, 10);
    assert_eq!(result.write_count, 10);
    assert_eq!(result.commit_count, 1);
    assert_eq!(result.rollback_count, 0);
    assert_eq!(result.skip_count, 0);

    // Item 7 was submitted three times; nothing else was replayed
    let calls = calls.lock().unwrap();
    assert_eq!(calls.iter().filter(|n| **n == 7).count(), 3);
    assert_eq!(calls.len(), 12);

    assert_eq!(output.committed_items(), (1..=10).map(|n| n * 2).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_transient_write_failure_replays_whole_chunk() {
    let config = step_config()
        .with_retry_limit(3)
        .with_classification(ClassificationEntry::new("TransientError").retryable());
    let transform = FlakyTransform::new("TransientError", &[]);
    let calls = transform.call_log();
    let (inner, txn, output) = transactional_vec_sink();
    let sink = PoisonSink::new(inner, 2, "TransientError").failing_times(2);
    let writes = sink.call_counter();

    let result = run_step(config, (1..=10).collect(), transform, sink, txn).await;

    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.write_count, 10);
    assert_eq!(result.commit_count, 1);
    assert_eq!(result.rollback_count, 2);
    assert_eq!(*writes.lock().unwrap(), 3);
    // Each replay re-ran the transform over the full chunk
    assert_eq!(calls.lock().unwrap().len(), 30);
    assert_eq!(output.committed_items().len(), 10);
}

#[tokio::test]
async fn test_skippable_process_failures_resolve_in_scan_mode() {
    let config = step_config()
        .with_skip_limit(2)
        .with_classification(ClassificationEntry::new("BadRecord").skippable());
    let transform = FlakyTransform::new("BadRecord", &[(3, usize::MAX), (7, usize::MAX)]);
    let (sink, txn, output) = transactional_vec_sink();

    let result = run_step(config, (1..=10).collect(), transform, sink, txn).await;

    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.read_count, 10);
    assert_eq!(result.write_count, 8);
    assert_eq!(result.skip_count, 2);
    // First poison item rolled the chunk back; second was discarded from its
    // own single-item transaction in scan mode
    assert_eq!(result.rollback_count, 2);
    assert_eq!(result.commit_count, 8);

    let expected: Vec<i64> = (1..=10).filter(|n| *n != 3 && *n != 7).map(|n| n * 2).collect();
    assert_eq!(output.committed_items(), expected);
}

#[tokio::test]
async fn test_skip_limit_exhaustion_aborts_and_freezes_counters() {
    let config = StepConfig::new("load", 2)
        .with_backoff(BackoffConfig::none())
        .with_skip_limit(2)
        .with_classification(ClassificationEntry::new("BadRecord").skippable());
    let transform = FlakyTransform::new(
        "BadRecord",
        &[(3, usize::MAX), (5, usize::MAX), (7, usize::MAX)],
    );
    let (sink, txn, output) = transactional_vec_sink();

    let result = run_step(config, (1..=8).collect(), transform, sink, txn).await;

    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.skip_count, 2);
    assert_eq!(result.failure.as_ref().unwrap().class(), "BadRecord");
    // Chunks committed before the abort stay committed
    assert_eq!(output.committed_items(), vec![2, 4, 8, 12]);
    assert_eq!(result.write_count, 4);
    assert_eq!(result.commit_count, 3);
    assert_eq!(result.rollback_count, 3);
}

#[tokio::test]
async fn test_skip_limit_exhaustion_mid_scan_is_fatal() {
    let config = step_config()
        .with_skip_limit(2)
        .with_classification(ClassificationEntry::new("BadRecord").skippable());
    let transform = FlakyTransform::new(
        "BadRecord",
        &[(3, usize::MAX), (5, usize::MAX), (7, usize::MAX)],
    );
    let (sink, txn, output) = transactional_vec_sink();

    let result = run_step(config, (1..=10).collect(), transform, sink, txn).await;

    // Item 3 rolled the chunk back, item 5 was discarded from its own
    // scan-mode transaction, and item 7 found the limit exhausted while the
    // scan was still running
    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.skip_count, 2);
    assert_eq!(result.failure.as_ref().unwrap().class(), "BadRecord");
    // Single-item commits made before the abort stay committed
    assert_eq!(output.committed_items(), vec![2, 4, 8, 12]);
    assert_eq!(result.write_count, 4);
    assert_eq!(result.commit_count, 4);
    assert_eq!(result.rollback_count, 3);
}

#[tokio::test]
async fn test_no_rollback_process_skip_keeps_the_chunk_transaction() {
    let config = StepConfig::new("load", 8)
        .with_backoff(BackoffConfig::none())
        .with_skip_limit(1)
        .with_classification(ClassificationEntry::new("BadRecord").skippable().no_rollback());
    let transform = FlakyTransform::new("BadRecord", &[(5, usize::MAX)]);
    let (sink, txn, output) = transactional_vec_sink();

    let result = run_step(config, (1..=8).collect(), transform, sink, txn).await;

    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.write_count, 7);
    assert_eq!(result.skip_count, 1);
    assert_eq!(result.commit_count, 1);
    assert_eq!(result.rollback_count, 0);
    assert_eq!(output.commits(), 1);
    let expected: Vec<i64> = (1..=8).filter(|n| *n != 5).map(|n| n * 2).collect();
    assert_eq!(output.committed_items(), expected);
}

#[tokio::test]
async fn test_no_rollback_write_skip_with_attributed_index() {
    let config = StepConfig::new("load", 8)
        .with_backoff(BackoffConfig::none())
        .with_skip_limit(1)
        .with_classification(ClassificationEntry::new("BadRecord").skippable().no_rollback());
    let transform = FlakyTransform::new("BadRecord", &[]);
    let (inner, txn, output) = transactional_vec_sink();
    // Transform doubles, so poison value 10 is item 5 after transform
    let sink = PoisonSink::new(inner, 10, "BadRecord").attributing_index();
    let writes = sink.call_counter();

    let result = run_step(config, (1..=8).collect(), transform, sink, txn).await;

    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.write_count, 7);
    assert_eq!(result.skip_count, 1);
    assert_eq!(result.commit_count, 1);
    assert_eq!(result.rollback_count, 0);
    // One failing write, one rewrite of the remainder in the same transaction
    assert_eq!(*writes.lock().unwrap(), 2);
    let expected: Vec<i64> = (1..=8).filter(|n| *n != 5).map(|n| n * 2).collect();
    assert_eq!(output.committed_items(), expected);
}

#[tokio::test]
async fn test_unattributed_write_skip_falls_back_to_scan_mode() {
    let config = StepConfig::new("load", 8)
        .with_backoff(BackoffConfig::none())
        .with_skip_limit(1)
        .with_classification(ClassificationEntry::new("BadRecord").skippable().no_rollback());
    let transform = FlakyTransform::new("BadRecord", &[]);
    let (inner, txn, output) = transactional_vec_sink();
    let sink = PoisonSink::new(inner, 10, "BadRecord");
    let writes = sink.call_counter();

    let result = run_step(config, (1..=8).collect(), transform, sink, txn).await;

    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.write_count, 7);
    // The poison item was skip counted exactly once even though it failed in
    // both the chunk write and the scan replay
    assert_eq!(result.skip_count, 1);
    assert_eq!(result.commit_count, 7);
    assert_eq!(result.rollback_count, 2);
    // 1 chunk write + 8 scan writes
    assert_eq!(*writes.lock().unwrap(), 9);
    let expected: Vec<i64> = (1..=8).filter(|n| *n != 5).map(|n| n * 2).collect();
    assert_eq!(output.committed_items(), expected);
}

#[tokio::test]
async fn test_exhausted_retries_fall_through_to_skip() {
    let config = StepConfig::new("load", 6)
        .with_backoff(BackoffConfig::none())
        .with_retry_limit(2)
        .with_skip_limit(1)
        .with_classification(ClassificationEntry::new("BadRecord").retryable().skippable());
    let transform = FlakyTransform::new("BadRecord", &[(4, usize::MAX)]);
    let calls = transform.call_log();
    let (sink, txn, output) = transactional_vec_sink();

    let result = run_step(config, (1..=6).collect(), transform, sink, txn).await;

    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.write_count, 5);
    assert_eq!(result.skip_count, 1);
    assert_eq!(result.rollback_count, 1);
    assert_eq!(result.commit_count, 5);
    // retry_limit 2: the first attempt plus one replay, then the skip
    assert_eq!(calls.lock().unwrap().iter().filter(|n| **n == 4).count(), 2);
    assert_eq!(output.committed_items(), vec![2, 4, 6, 10, 12]);
}

#[tokio::test]
async fn test_unclassified_failure_is_fatal() {
    let config = step_config()
        .with_retry_limit(3)
        .with_skip_limit(5)
        .with_classification(ClassificationEntry::new("KnownError").retryable().skippable());
    let transform = FlakyTransform::new("SurpriseError", &[(2, usize::MAX)]);
    let (sink, txn, output) = transactional_vec_sink();

    let result = run_step(config, (1..=10).collect(), transform, sink, txn).await;

    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.failure.as_ref().unwrap().class(), "SurpriseError");
    assert_eq!(result.rollback_count, 1);
    assert_eq!(result.skip_count, 0);
    assert!(output.committed_items().is_empty());
}

#[tokio::test]
async fn test_concurrent_step_executions_keep_independent_counters() {
    let store = Arc::new(ExecutionContextStore::new());

    let mut handles = Vec::new();
    for (identity, poison) in [("night-job", 4), ("day-job", 7)] {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let config = step_config()
                .with_skip_limit(1)
                .with_classification(
                    ClassificationEntry::new("BadRecord").skippable().no_rollback(),
                );
            let mut orchestrator = ChunkOrchestrator::new(config).unwrap();
            let mut source = VecSource::new((1..=10).collect::<Vec<i64>>());
            let mut transform = FlakyTransform::new("BadRecord", &[(poison, usize::MAX)]);
            let (mut sink, mut txn, output) = transactional_vec_sink();
            let result = orchestrator
                .run_step(
                    &store,
                    identity,
                    &JobExecutionId::new(),
                    &StepExecutionId::new(),
                    &mut source,
                    &mut transform,
                    &mut sink,
                    &mut txn,
                )
                .await
                .unwrap();
            (poison, result, output.committed_items())
        }));
    }

    // Each execution skipped exactly its own poison item; neither saw the
    // sibling's skip counter or output
    for handle in handles {
        let (poison, result, committed) = handle.await.unwrap();
        assert_eq!(result.status, StepStatus::Completed);
        assert_eq!(result.skip_count, 1);
        assert_eq!(result.write_count, 9);
        let expected: Vec<i64> = (1..=10).filter(|n| *n != poison).map(|n| n * 2).collect();
        assert_eq!(committed, expected);
    }
}

#[tokio::test]
async fn test_per_class_retry_limit_override() {
    let config = step_config()
        .with_retry_limit(1)
        .with_classification(
            ClassificationEntry::new("ThrottledError").retryable().with_retry_limit(3),
        );
    let transform = FlakyTransform::new("ThrottledError", &[(6, 2)]);
    let calls = transform.call_log();
    let (sink, txn, output) = transactional_vec_sink();

    let result = run_step(config, (1..=10).collect(), transform, sink, txn).await;

    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.write_count, 10);
    assert_eq!(calls.lock().unwrap().iter().filter(|n| **n == 6).count(), 3);
    assert_eq!(output.committed_items().len(), 10);
}
