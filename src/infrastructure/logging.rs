//! Logging system configuration and initialization
//!
//! - Console output, plain or JSON
//! - Daily rolling log file next to the executable (or in `log_dir`)
//! - Level and per-module filters from [`LoggingConfig`], overridable with `RUST_LOG`
//!
//! ```bash
//! # Show every SQLite statement and HTTP detail
//! RUST_LOG="debug,sqlx=debug,reqwest=debug" coretax-fetch ...
//! ```

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use anyhow::{Result, anyhow};
use tracing::info;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use crate::infrastructure::config::LoggingConfig;

/// Keeps the non-blocking file writers alive for the whole process.
static LOG_GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(std::path::Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Builds the filter: `RUST_LOG` when set, otherwise the configured level
/// plus module directives. Module directives are skipped at TRACE so that
/// everything is shown.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    if !config.level.eq_ignore_ascii_case("trace") {
        let mut modules: Vec<_> = config.module_filters.iter().collect();
        modules.sort();
        for (module, level) in modules {
            let directive = format!("{module}={level}")
                .parse::<Directive>()
                .map_err(|e| anyhow!("Invalid log filter '{}={}': {}", module, level, e))?;
            filter = filter.add_directive(directive);
        }
    }

    Ok(filter)
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(config)?;
    let registry = Registry::default().with(env_filter);

    let log_dir = config.log_dir.clone().unwrap_or_else(get_log_directory);

    let installed = match (config.file_output, config.console_output) {
        (true, console) => {
            std::fs::create_dir_all(&log_dir)
                .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

            let file_appender = rolling::daily(&log_dir, &config.file_name);
            let (file_writer, file_guard) = non_blocking(file_appender);
            LOG_GUARDS
                .get_or_init(|| Mutex::new(Vec::new()))
                .lock()
                .map_err(|_| anyhow!("Log guard registry poisoned"))?
                .push(file_guard);

            let file_layer = fmt::Layer::new()
                .with_writer(file_writer)
                .with_target(true)
                .with_ansi(false);

            match (console, config.json_format) {
                (true, true) => registry
                    .with(file_layer)
                    .with(fmt::Layer::new().json().with_writer(std::io::stdout))
                    .try_init(),
                (true, false) => registry
                    .with(file_layer)
                    .with(fmt::Layer::new().with_writer(std::io::stdout).with_target(false))
                    .try_init(),
                (false, _) => registry.with(file_layer).try_init(),
            }
        }
        (false, true) => {
            if config.json_format {
                registry
                    .with(fmt::Layer::new().json().with_writer(std::io::stdout))
                    .try_init()
            } else {
                registry
                    .with(fmt::Layer::new().with_writer(std::io::stdout).with_target(false))
                    .try_init()
            }
        }
        (false, false) => return Err(anyhow!("No logging output configured")),
    };
    installed.map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!(
        level = %config.level,
        json = config.json_format,
        file_output = config.file_output,
        log_dir = %log_dir.display(),
        "Logging system initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_output);
        assert_eq!(config.module_filters.get("sqlx").map(String::as_str), Some("warn"));
    }

    #[test]
    fn filter_accepts_configured_directives() {
        let config = LoggingConfig::default();
        assert!(build_env_filter(&config).is_ok());
    }

    #[test]
    fn no_output_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(&config).is_err());
    }
}
