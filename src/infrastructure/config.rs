//! Configuration infrastructure
//!
//! Settings are layered in this order, later sources winning:
//! 1. Built-in defaults (see [`defaults`])
//! 2. An optional JSON or TOML file
//! 3. Environment variables prefixed with `CORETAX__` (`CORETAX__FETCH__CHUNK_SIZE=100`)
//!
//! Session credentials are deliberately absent; they are supplied per run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::domain::FetchLimits;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub portal: PortalConfig,
    pub fetch: FetchConfig,
    pub http: HttpConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Remote portal addresses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,
    pub keepalive_path: String,
}

/// Detail fetch engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum concurrent detail requests
    pub max_workers: usize,

    /// Retry rounds after the first attempt
    pub max_retries: u32,

    /// Identifiers per chunk
    pub chunk_size: usize,

    /// Fixed delay before each retry round, in milliseconds
    pub retry_delay_ms: u64,

    /// Keep-alive ping interval, in completed fetches
    pub keepalive_every: usize,

    /// Chunks processed per invocation before suspending
    pub chunks_per_invocation: usize,
}

/// HTTP transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_seconds: u64,

    /// Upper bound for a whole detail request; the portal is slow under load
    pub read_timeout_seconds: u64,

    pub keepalive_timeout_seconds: u64,

    /// Pause before each keep-alive ping, in milliseconds
    pub keepalive_delay_ms: u64,

    /// Request pacing on top of the worker bound; 0 disables pacing
    pub max_requests_per_second: u32,

    pub user_agent: String,
}

/// Run state persistence settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// sqlx SQLite URL, e.g. `sqlite:/var/lib/coretax-fetch/runs.db`
    pub database_url: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted console logs
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Directory for log files; defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    /// Base name of the daily rolling log file
    pub file_name: String,

    /// Module-specific log level filters (e.g., "sqlx": "warn", "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::PORTAL_BASE_URL.to_string(),
            keepalive_path: defaults::KEEPALIVE_PATH.to_string(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_workers: defaults::MAX_WORKERS,
            max_retries: defaults::MAX_RETRIES,
            chunk_size: defaults::CHUNK_SIZE,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
            keepalive_every: defaults::KEEPALIVE_EVERY,
            chunks_per_invocation: defaults::CHUNKS_PER_INVOCATION,
        }
    }
}

impl FetchConfig {
    pub fn to_limits(&self) -> FetchLimits {
        FetchLimits {
            max_workers: self.max_workers,
            max_retries: self.max_retries,
            chunk_size: self.chunk_size,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            keepalive_every: self.keepalive_every,
            chunks_per_invocation: self.chunks_per_invocation,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: defaults::CONNECT_TIMEOUT_SECONDS,
            read_timeout_seconds: defaults::READ_TIMEOUT_SECONDS,
            keepalive_timeout_seconds: defaults::KEEPALIVE_TIMEOUT_SECONDS,
            keepalive_delay_ms: defaults::KEEPALIVE_DELAY_MS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            user_agent: defaults::USER_AGENT.to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let database_url = ConfigManager::get_app_data_dir().map_or_else(
            |_| format!("sqlite:{}", defaults::DATABASE_FILE),
            |dir| format!("sqlite:{}", dir.join(defaults::DATABASE_FILE).display()),
        );
        Self { database_url }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("tokio".to_string(), "info".to_string());
                filters
            },
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Uses `path` if given, otherwise `<config dir>/coretax-fetch/config.json`
    /// when that file exists, otherwise defaults and environment only.
    pub fn new(path: Option<&Path>) -> Self {
        let config_path = path.map(Path::to_path_buf).or_else(|| {
            Self::get_config_dir()
                .ok()
                .map(|dir| dir.join(defaults::CONFIG_FILE))
                .filter(|p| p.exists())
        });
        Self { config_path }
    }

    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);
        Ok(config_dir)
    }

    /// Get the application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .context("Failed to get user data directory")?
            .join(defaults::APP_DIR_NAME);
        Ok(data_dir)
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let defaults = config::Config::try_from(&AppConfig::default())
            .context("Failed to encode default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = &self.config_path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(defaults::ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to assemble configuration sources")?
            .try_deserialize::<AppConfig>()
            .context("Failed to parse configuration")
    }

    /// Write `config` as pretty JSON to the managed path.
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => Self::get_config_dir()?.join(defaults::CONFIG_FILE),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write configuration to {}", path.display()))?;

        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Default values
pub mod defaults {
    pub const APP_DIR_NAME: &str = "coretax-fetch";
    pub const CONFIG_FILE: &str = "config.json";
    pub const DATABASE_FILE: &str = "runs.db";
    pub const ENV_PREFIX: &str = "CORETAX";

    pub const PORTAL_BASE_URL: &str = "https://coretaxdjp.pajak.go.id";
    pub const KEEPALIVE_PATH: &str = "/identityproviderportal/api/Account/SessionKeepAlive";

    /// The portal penalises bursts, keep this small
    pub const MAX_WORKERS: usize = 3;
    pub const MAX_RETRIES: u32 = 3;
    pub const CHUNK_SIZE: usize = 200;
    pub const RETRY_DELAY_MS: u64 = 1000;
    pub const KEEPALIVE_EVERY: usize = 500;
    pub const CHUNKS_PER_INVOCATION: usize = 1;

    pub const CONNECT_TIMEOUT_SECONDS: u64 = 10;
    pub const READ_TIMEOUT_SECONDS: u64 = 180;
    pub const KEEPALIVE_TIMEOUT_SECONDS: u64 = 10;
    pub const KEEPALIVE_DELAY_MS: u64 = 500;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 0;
    pub const USER_AGENT: &str = "coretax-fetch/0.1";

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_NAME: &str = "coretax-fetch.log";
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_engine_limits() {
        let config = AppConfig::default();
        let limits = config.fetch.to_limits();
        assert_eq!(limits, FetchLimits::default());
        assert_eq!(config.http.read_timeout_seconds, 180);
        assert!(config.store.database_url.starts_with("sqlite:"));
    }

    #[test]
    fn file_values_override_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("coretax.json");
        std::fs::write(
            &path,
            r#"{ "fetch": { "chunk_size": 50, "max_workers": 5 }, "portal": { "base_url": "http://localhost:9000" } }"#,
        )?;

        let config = ConfigManager::new(Some(&path)).load()?;
        assert_eq!(config.fetch.chunk_size, 50);
        assert_eq!(config.fetch.max_workers, 5);
        assert_eq!(config.fetch.max_retries, defaults::MAX_RETRIES);
        assert_eq!(config.portal.base_url, "http://localhost:9000");
        assert_eq!(config.portal.keepalive_path, defaults::KEEPALIVE_PATH);
        Ok(())
    }

    #[tokio::test]
    async fn saved_config_loads_back() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("config.json");
        let manager = ConfigManager::new(Some(&path));

        let mut config = AppConfig::default();
        config.fetch.retry_delay_ms = 10;
        config.http.max_requests_per_second = 4;
        manager.save_config(&config).await?;

        let loaded = manager.load()?;
        assert_eq!(loaded.fetch.retry_delay_ms, 10);
        assert_eq!(loaded.http.max_requests_per_second, 4);
        Ok(())
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(ConfigManager::new(Some(&path)).load().is_err());
    }
}
