//! Collaborator interfaces for chunk steps
//!
//! A chunk step is wired from four narrow interfaces: an [`ItemSource`] the
//! engine pulls from, an [`ItemTransform`] applied to every buffered item, an
//! [`ItemSink`] that receives whole chunks, and a [`TransactionManager`] that
//! owns the commit boundary. Sources and sinks are I/O shaped and therefore
//! async; transforms are pure per-item functions and stay synchronous.
//!
//! Failures that collaborators raise are [`ItemError`]s: the error class is
//! what the step's classification table keys on, so a connector decides what
//! a failure is called and configuration decides what happens to it.

use crate::core::context::ExecutionContext;
use crate::domain::errors::ItemError;
use crate::domain::result::Result;
use async_trait::async_trait;

/// Pulls items one at a time from an external source
///
/// `next` returning `Ok(None)` means end of stream and must stay `None` on
/// every later call. Sources that support resumption read their position
/// from the step scope in `open` and record it in `checkpoint`, which the
/// engine calls just before every chunk commit.
#[async_trait]
pub trait ItemSource<T>: Send {
    /// Pull the next item, or `None` at end of stream
    async fn next(&mut self) -> std::result::Result<Option<T>, ItemError>;

    /// Restore position from a previously checkpointed step scope
    fn open(&mut self, _ctx: &ExecutionContext) {}

    /// Record the current position into the step scope
    fn checkpoint(&self, _ctx: &mut ExecutionContext) {}
}

/// Per-item transformation applied between read and write
///
/// Returning `Ok(None)` filters the item: it is excluded from the chunk and
/// counted separately from skips. Returning `Err` hands the failure to the
/// fault tolerance policy under the `Process` role.
pub trait ItemTransform<I, O>: Send {
    /// Transform one item, filter it, or fail
    fn apply(&mut self, item: &I) -> std::result::Result<Option<O>, ItemError>;
}

impl<I, O, F> ItemTransform<I, O> for F
where
    F: FnMut(&I) -> std::result::Result<Option<O>, ItemError> + Send,
{
    fn apply(&mut self, item: &I) -> std::result::Result<Option<O>, ItemError> {
        self(item)
    }
}

/// Transform that passes items through a validation check
///
/// Items the check rejects are either filtered out of the chunk (when
/// `filtering` is set) or raised as classifiable failures for the policy to
/// handle.
pub struct ValidatingTransform<F> {
    check: F,
    filtering: bool,
}

impl<F> ValidatingTransform<F> {
    /// Validator that raises rejected items as failures
    pub fn new(check: F) -> Self {
        Self {
            check,
            filtering: false,
        }
    }

    /// Validator that silently filters rejected items
    pub fn filtering(check: F) -> Self {
        Self {
            check,
            filtering: true,
        }
    }
}

impl<T, F> ItemTransform<T, T> for ValidatingTransform<F>
where
    T: Clone + Send + Sync,
    F: FnMut(&T) -> std::result::Result<(), ItemError> + Send,
{
    fn apply(&mut self, item: &T) -> std::result::Result<Option<T>, ItemError> {
        match (self.check)(item) {
            Ok(()) => Ok(Some(item.clone())),
            Err(_) if self.filtering => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Receives chunks of transformed items
///
/// A call either accepts every item or fails as a whole. Sinks that can
/// attribute a failure to one item should set `ItemError::with_item_index`
/// with the item's position in the written slice, which lets the engine
/// exclude exactly that item instead of scanning the whole chunk.
#[async_trait]
pub trait ItemSink<O>: Send {
    /// Write one chunk; all-or-nothing per call
    async fn write(&mut self, items: &[O]) -> std::result::Result<(), ItemError>;
}

/// Owns the transaction under every chunk write
///
/// The engine drives the boundary: `begin` before the chunk is transformed,
/// `commit` after a successful write, `rollback` when the policy demands it.
/// Failures here are infrastructure failures, not item failures, and abort
/// the step directly.
#[async_trait]
pub trait TransactionManager: Send {
    /// Open a transaction
    async fn begin(&mut self) -> Result<()>;

    /// Commit the open transaction
    async fn commit(&mut self) -> Result<()>;

    /// Discard the open transaction
    async fn rollback(&mut self) -> Result<()>;
}
