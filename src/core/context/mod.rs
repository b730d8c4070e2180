//! Hierarchical execution context: job scope and step scope

pub mod store;
pub mod values;

pub use store::ExecutionContextStore;
pub use values::{ContextValue, ExecutionContext};
