//! Chunk-oriented step execution
//!
//! The orchestrator in this module owns the read/transform/write cycle and
//! the transaction boundary around every chunk.

pub mod orchestrator;

pub use orchestrator::ChunkOrchestrator;
