//! In-memory source, sink, and transaction manager
//!
//! The sink and transaction manager share staging state: writes go to a
//! staging buffer and only move to the committed log on commit, so rollback
//! and scan-mode behavior is observable from tests exactly as a database
//! sink would exhibit it.

use crate::core::context::ExecutionContext;
use crate::core::step::{ItemSink, ItemSource, TransactionManager};
use crate::domain::errors::ItemError;
use crate::domain::result::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Context key under which [`VecSource`] checkpoints its position
pub const SOURCE_POSITION_KEY: &str = "source.position";

/// Source backed by a vector of items
///
/// Supports resumption: `open` restores the position from the step scope and
/// `checkpoint` records it back.
#[derive(Debug)]
pub struct VecSource<T> {
    items: Vec<T>,
    position: usize,
}

impl<T> VecSource<T> {
    /// Source over the given items, starting at the beginning
    pub fn new(items: Vec<T>) -> Self {
        Self { items, position: 0 }
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.position
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> ItemSource<T> for VecSource<T> {
    async fn next(&mut self) -> std::result::Result<Option<T>, ItemError> {
        let item = self.items.get(self.position).cloned();
        if item.is_some() {
            self.position += 1;
        }
        Ok(item)
    }

    fn open(&mut self, ctx: &ExecutionContext) {
        if let Some(position) = ctx.get_i64(SOURCE_POSITION_KEY) {
            self.position = position as usize;
            tracing::info!(position = self.position, "Source resuming from checkpoint");
        }
    }

    fn checkpoint(&self, ctx: &mut ExecutionContext) {
        ctx.put_i64(SOURCE_POSITION_KEY, self.position as i64);
    }
}

#[derive(Debug)]
struct SinkState<T> {
    staged: Vec<T>,
    committed: Vec<Vec<T>>,
    open: bool,
}

impl<T> Default for SinkState<T> {
    fn default() -> Self {
        Self {
            staged: Vec::new(),
            committed: Vec::new(),
            open: false,
        }
    }
}

/// Observer handle over the shared sink state
///
/// Cheap to clone; tests keep one to assert on committed output after the
/// run.
#[derive(Debug)]
pub struct SinkHandle<T> {
    state: Arc<Mutex<SinkState<T>>>,
}

impl<T> Clone for SinkHandle<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone> SinkHandle<T> {
    /// Committed batches in commit order
    pub fn committed_batches(&self) -> Vec<Vec<T>> {
        self.state.lock().expect("sink state lock poisoned").committed.clone()
    }

    /// Committed items flattened across batches, in commit order
    pub fn committed_items(&self) -> Vec<T> {
        self.state
            .lock()
            .expect("sink state lock poisoned")
            .committed
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Number of non-empty committed batches
    pub fn commits(&self) -> usize {
        self.state
            .lock()
            .expect("sink state lock poisoned")
            .committed
            .iter()
            .filter(|batch| !batch.is_empty())
            .count()
    }
}

/// Sink that stages writes until the paired transaction commits
#[derive(Debug)]
pub struct TransactionalVecSink<T> {
    state: Arc<Mutex<SinkState<T>>>,
}

#[async_trait]
impl<T: Clone + Send + Sync> ItemSink<T> for TransactionalVecSink<T> {
    async fn write(&mut self, items: &[T]) -> std::result::Result<(), ItemError> {
        let mut state = self.state.lock().expect("sink state lock poisoned");
        state.staged.extend_from_slice(items);
        Ok(())
    }
}

/// Transaction manager over the shared sink state
#[derive(Debug)]
pub struct VecTransaction<T> {
    state: Arc<Mutex<SinkState<T>>>,
}

#[async_trait]
impl<T: Send + Sync> TransactionManager for VecTransaction<T> {
    async fn begin(&mut self) -> Result<()> {
        let mut state = self.state.lock().expect("sink state lock poisoned");
        state.staged.clear();
        state.open = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.state.lock().expect("sink state lock poisoned");
        state.open = false;
        let batch = std::mem::take(&mut state.staged);
        state.committed.push(batch);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut state = self.state.lock().expect("sink state lock poisoned");
        state.open = false;
        state.staged.clear();
        Ok(())
    }
}

/// Build a sink, its transaction manager, and an observer handle over one
/// shared staging buffer
pub fn transactional_vec_sink<T>() -> (TransactionalVecSink<T>, VecTransaction<T>, SinkHandle<T>) {
    let state = Arc::new(Mutex::new(SinkState::default()));
    (
        TransactionalVecSink {
            state: Arc::clone(&state),
        },
        VecTransaction {
            state: Arc::clone(&state),
        },
        SinkHandle { state },
    )
}
