//! Reference implementations of the collaborator interfaces
//!
//! The in-memory source, sink, and transaction manager here back the test
//! suite and show what a connector is expected to do at each interface.

pub mod memory;

pub use memory::{
    transactional_vec_sink, SinkHandle, TransactionalVecSink, VecSource, VecTransaction,
    SOURCE_POSITION_KEY,
};
