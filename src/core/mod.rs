//! The batch engine
//!
//! Everything between configuration and the collaborator interfaces lives
//! here: the chunk orchestrator, the fault tolerance policy, backoff,
//! execution contexts, lifecycle listeners, and the job runner.

pub mod backoff;
pub mod chunk;
pub mod context;
pub mod job;
pub mod listener;
pub mod policy;
pub mod step;
