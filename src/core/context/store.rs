//! Execution context store
//!
//! Keeps one context per job execution and one per step execution, plus the
//! completion registry used for restart idempotence. Scopes are fully
//! isolated: a step scope is never visible to sibling step executions of the
//! same job, and contexts for distinct executions share no state.

use crate::core::context::values::ExecutionContext;
use crate::domain::ids::{JobExecutionId, StepExecutionId};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct StoreInner {
    job_scopes: HashMap<JobExecutionId, ExecutionContext>,
    step_scopes: HashMap<StepExecutionId, ExecutionContext>,
    completed_steps: HashSet<(String, String)>,
    completed_jobs: HashSet<String>,
}

/// Store of job-scoped and step-scoped execution contexts
///
/// Shared between the job runner and the chunk orchestrator; interior
/// mutability keeps the call sites free of lock plumbing. Persistence of the
/// contexts themselves is external: callers snapshot scopes with the
/// accessors here and restore them by seeding a fresh execution's scope.
#[derive(Debug, Default)]
pub struct ExecutionContextStore {
    inner: Mutex<StoreInner>,
}

impl ExecutionContextStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the job scope for an execution (empty if never written)
    pub fn job_scope(&self, id: &JobExecutionId) -> ExecutionContext {
        let inner = self.inner.lock().expect("context store lock poisoned");
        inner.job_scopes.get(id).cloned().unwrap_or_default()
    }

    /// Snapshot the step scope for an execution (empty if never written)
    pub fn step_scope(&self, id: &StepExecutionId) -> ExecutionContext {
        let inner = self.inner.lock().expect("context store lock poisoned");
        inner.step_scopes.get(id).cloned().unwrap_or_default()
    }

    /// Mutate the job scope for an execution in place
    pub fn update_job_scope(&self, id: &JobExecutionId, f: impl FnOnce(&mut ExecutionContext)) {
        let mut inner = self.inner.lock().expect("context store lock poisoned");
        f(inner.job_scopes.entry(*id).or_default());
    }

    /// Mutate the step scope for an execution in place
    pub fn update_step_scope(&self, id: &StepExecutionId, f: impl FnOnce(&mut ExecutionContext)) {
        let mut inner = self.inner.lock().expect("context store lock poisoned");
        f(inner.step_scopes.entry(*id).or_default());
    }

    /// Seed the step scope for a fresh execution, typically with a context
    /// persisted by a previous run so the source can resume at the last
    /// committed position
    pub fn seed_step_scope(&self, id: &StepExecutionId, ctx: ExecutionContext) {
        let mut inner = self.inner.lock().expect("context store lock poisoned");
        inner.step_scopes.insert(*id, ctx);
    }

    /// Remove and return the step scope once the owning execution ends
    pub fn take_step_scope(&self, id: &StepExecutionId) -> ExecutionContext {
        let mut inner = self.inner.lock().expect("context store lock poisoned");
        inner.step_scopes.remove(id).unwrap_or_default()
    }

    /// Remove and return the job scope once the owning execution ends
    pub fn take_job_scope(&self, id: &JobExecutionId) -> ExecutionContext {
        let mut inner = self.inner.lock().expect("context store lock poisoned");
        inner.job_scopes.remove(id).unwrap_or_default()
    }

    /// Record that a step completed for a job identity
    pub fn mark_step_complete(&self, identity_key: &str, step_name: &str) {
        let mut inner = self.inner.lock().expect("context store lock poisoned");
        inner
            .completed_steps
            .insert((identity_key.to_string(), step_name.to_string()));
    }

    /// Check whether a step already completed for a job identity
    pub fn is_step_complete(&self, identity_key: &str, step_name: &str) -> bool {
        let inner = self.inner.lock().expect("context store lock poisoned");
        inner
            .completed_steps
            .contains(&(identity_key.to_string(), step_name.to_string()))
    }

    /// Record that a job identity completed
    pub fn mark_job_complete(&self, identity_key: &str) {
        let mut inner = self.inner.lock().expect("context store lock poisoned");
        inner.completed_jobs.insert(identity_key.to_string());
    }

    /// Check whether a job identity already completed
    pub fn is_job_complete(&self, identity_key: &str) -> bool {
        let inner = self.inner.lock().expect("context store lock poisoned");
        inner.completed_jobs.contains(identity_key)
    }
}
