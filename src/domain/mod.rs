//! Domain layer
//!
//! Plain value types shared by the engine and its collaborators. Nothing in
//! here performs I/O.

pub mod collection;
pub mod errors;
pub mod fetch_context;
pub mod record;
pub mod run_state;

pub use collection::{DocumentCollection, TaxPeriod};
pub use errors::{EngineError, FetchError};
pub use fetch_context::{FetchContext, FetchLimits};
pub use record::{Credential, DetailPayload, RecordId};
pub use run_state::{CompletionStatus, Progress, RunIdentity, RunReport, RunState};
