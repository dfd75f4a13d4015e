//! Application layer - the bulk detail fetch engine
//!
//! The scheduler owns the run state and drives the retry controller, which
//! drives the worker pool. Collaborators that touch the network or storage
//! come in through the infrastructure traits.

pub mod chunk_scheduler;
pub mod retry_controller;
pub mod worker_pool;

// Re-export commonly used items
pub use chunk_scheduler::ChunkScheduler;
pub use retry_controller::{NoCheckpoint, Resolution, RetryController, RoundCheckpoint, RoundOutcome};
pub use worker_pool::{BatchOutcome, FetchWorkerPool};
