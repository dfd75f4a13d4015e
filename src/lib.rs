//! Coretax Fetch - resilient bulk detail fetching for the Coretax tax portal
//!
//! Given the ordered record identifiers of a list/search call, the engine
//! pulls every record's detail payload with bounded concurrency, retries
//! transient failures under a fixed budget, keeps the portal session alive
//! and persists its progress so a run can be suspended and resumed across
//! process restarts.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod test_utils;

// Re-export the engine entry points for easier access
pub use application::{ChunkScheduler, FetchWorkerPool, RetryController};
pub use domain::{
    CompletionStatus, Credential, DocumentCollection, EngineError, FetchContext, FetchError,
    FetchLimits, Progress, RecordId, RunIdentity, RunReport, RunState, TaxPeriod,
};
