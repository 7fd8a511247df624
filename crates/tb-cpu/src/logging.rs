//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence and accepts full filter directives. Otherwise
//! `TB_LOG_LEVEL` selects a single level (error, warn, info, debug, trace),
//! defaulting to `info`.

use std::env;
use std::sync::OnceLock;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable holding a simple log level.
pub const LOG_LEVEL_ENV: &str = "TB_LOG_LEVEL";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(s: &str) -> Result<Self, LoggingError> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLogLevel(s.to_string())),
        }
    }

    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn filter_from_env() -> Result<EnvFilter, LoggingError> {
    if let Ok(directives) = env::var("RUST_LOG") {
        if !directives.trim().is_empty() {
            return EnvFilter::try_new(&directives)
                .map_err(|e| LoggingError::InvalidFilter(e.to_string()));
        }
    }
    let level = match env::var(LOG_LEVEL_ENV) {
        Ok(value) if !value.trim().is_empty() => LogLevel::parse(&value)?,
        _ => LogLevel::parse(DEFAULT_LOG_LEVEL)?,
    };
    Ok(EnvFilter::new(level.as_filter_str()))
}

/// Installs a global fmt subscriber configured from the environment.
///
/// Idempotent: only the first successful call installs a subscriber. If
/// another subscriber is already set globally, this is a no-op.
pub fn init() -> Result<(), LoggingError> {
    if TRACING_INITIALIZED.get().is_some() {
        return Ok(());
    }
    let filter = filter_from_env()?;
    TRACING_INITIALIZED.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
    Ok(())
}

/// Installs a global fmt subscriber at a fixed level.
pub fn init_with_level(level: LogLevel) {
    TRACING_INITIALIZED.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(level.as_filter_str()))
            .with_target(true)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels() {
        assert_eq!(LogLevel::parse("ERROR").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::parse("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::parse(" debug ").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert!(matches!(
            LogLevel::parse("loud"),
            Err(LoggingError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_with_level(LogLevel::Warn);
        init_with_level(LogLevel::Trace);
        assert!(init().is_ok());
    }
}
