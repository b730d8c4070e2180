//! Lifecycle event dispatch
//!
//! Callers register named hooks that observe the batch lifecycle: job, step,
//! and chunk boundaries plus the read, process, and write phases of each
//! item. Hooks run in registration order. A hook that fails is logged and
//! never changes what the engine does next.

use crate::domain::errors::ItemError;

/// Lifecycle event handed to registered hooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent<'a> {
    /// Job execution is about to start
    BeforeJob { job: &'a str },
    /// Job execution finished (any status)
    AfterJob { job: &'a str, failed: bool },
    /// Step execution is about to start
    BeforeStep { step: &'a str },
    /// Step execution reached a terminal status
    AfterStep { step: &'a str, failed: bool },
    /// A chunk is about to be driven
    BeforeChunk { step: &'a str },
    /// A chunk fully resolved (committed or scanned out)
    AfterChunk { step: &'a str },
    /// The source is about to be polled
    BeforeRead,
    /// The source produced an item
    AfterRead,
    /// The source failed
    OnReadError { error: &'a ItemError },
    /// An item is about to be transformed
    BeforeProcess,
    /// The transform produced an item, or filtered it
    AfterProcess { filtered: bool },
    /// The transform failed
    OnProcessError { error: &'a ItemError },
    /// A chunk is about to be written
    BeforeWrite { count: usize },
    /// The sink accepted a chunk
    AfterWrite { count: usize },
    /// The sink failed
    OnWriteError { error: &'a ItemError },
}

type Hook = Box<dyn FnMut(&BatchEvent<'_>) -> std::result::Result<(), String> + Send>;

/// Ordered registry of lifecycle hooks
///
/// Dispatch is synchronous and in registration order; hook failures are
/// isolated from the run.
#[derive(Default)]
pub struct ListenerDispatcher {
    hooks: Vec<(String, Hook)>,
}

impl std::fmt::Debug for ListenerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerDispatcher")
            .field("hooks", &self.hooks.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

impl ListenerDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named hook; hooks fire in registration order
    pub fn register(
        &mut self,
        name: impl Into<String>,
        hook: impl FnMut(&BatchEvent<'_>) -> std::result::Result<(), String> + Send + 'static,
    ) {
        self.hooks.push((name.into(), Box::new(hook)));
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether any hooks are registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Fire an event at every hook in order
    pub fn dispatch(&mut self, event: &BatchEvent<'_>) {
        for (name, hook) in &mut self.hooks {
            if let Err(reason) = hook(event) {
                tracing::warn!(listener = %name, ?event, %reason, "Listener hook failed");
            }
        }
    }
}
