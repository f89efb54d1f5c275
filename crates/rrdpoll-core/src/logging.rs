//! Logging and tracing setup
//!
//! Structured logging via the `tracing` ecosystem: env-filterable level,
//! pretty/compact/json output, optional daily-rolling log file.

use crate::error::{Error, Result};
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Logging configuration for the binaries
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Output format: "pretty", "compact" or "json"
    pub format: String,
    /// Optional log file path (daily rotation)
    pub file: Option<String>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            file: None,
        }
    }
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(options: &LoggingOptions) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.level))
        .map_err(|e| {
            Error::config_with_source(format!("invalid log level '{}'", options.level), e)
        })?;

    match (options.format.as_str(), &options.file) {
        ("json", Some(file_path)) => {
            let appender = create_file_appender(file_path)?;
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_target(true).with_writer(appender))
                .init();
        }
        ("json", None) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_target(true))
                .init();
        }
        ("pretty", Some(file_path)) => {
            let appender = create_file_appender(file_path)?;
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(appender))
                .init();
        }
        ("pretty", None) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
        (_, Some(file_path)) => {
            let appender = create_file_appender(file_path)?;
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(appender),
                )
                .init();
        }
        (_, None) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_target(false))
                .init();
        }
    }

    Ok(())
}

/// Create a daily-rolling file appender, creating parent directories
fn create_file_appender(file_path: &str) -> Result<tracing_appender::rolling::RollingFileAppender> {
    let path = Path::new(file_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::io(
                parent.display().to_string(),
                "failed to create log directory",
                e,
            )
        })?;
    }

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("rrdpoll.log");
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    Ok(tracing_appender::rolling::daily(dir, file_name))
}

/// Validate a log level string
pub fn validate_log_level(level: &str) -> Result<()> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(Error::config(format!(
            "log level '{level}' must be one of: trace, debug, info, warn, error"
        ))),
    }
}

/// Validate a log format string
pub fn validate_log_format(format: &str) -> Result<()> {
    match format {
        "json" | "pretty" | "compact" => Ok(()),
        _ => Err(Error::config(format!(
            "log format '{format}' must be one of: json, pretty, compact"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_log_level() {
        assert!(validate_log_level("trace").is_ok());
        assert!(validate_log_level("INFO").is_ok());
        assert!(validate_log_level("loud").is_err());
    }

    #[test]
    fn test_validate_log_format() {
        assert!(validate_log_format("json").is_ok());
        assert!(validate_log_format("pretty").is_ok());
        assert!(validate_log_format("compact").is_ok());
        assert!(validate_log_format("xml").is_err());
    }

    #[test]
    fn test_file_appender_creation() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("logs/rrdpoll.log");
        let result = create_file_appender(file_path.to_str().unwrap());
        assert!(result.is_ok());
        assert!(file_path.parent().unwrap().is_dir());
    }
}
