//! Infrastructure layer for the portal client, persistence and process setup
//!
//! This module provides the authenticated HTTP client, the detail and
//! keep-alive calls built on it, run state stores, configuration and logging.

pub mod config; // Layered configuration and defaults
pub mod logging; // Logging infrastructure
pub mod http_client;
pub mod detail_fetcher;
pub mod session_keeper;
pub mod run_state_store;
pub mod sqlite_run_state_store;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager, defaults};
pub use detail_fetcher::{DetailFetcher, HttpDetailFetcher};
pub use http_client::{CoretaxClient, CoretaxClientConfig};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use run_state_store::{MemoryRunStateStore, RunStateStore};
pub use session_keeper::{HttpSessionKeeper, KeepAliveOutcome, SessionKeeper};
pub use sqlite_run_state_store::SqliteRunStateStore;
