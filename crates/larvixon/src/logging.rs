//! Subscriber setup for the binary. Library code logs through `log` and
//! opens `tracing` spans; both end up in the same subscriber.

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log level '{level}': {reason}")]
    InvalidLevel { level: String, reason: String },

    #[error("Failed to install logger: {0}")]
    Install(String),
}

/// `RUST_LOG` when set and valid, else the configured level.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidLevel {
        level: config.level.clone(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber and bridges `log` records into it.
/// Call once, early in `main`.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;

    LogTracer::init().map_err(|e| LoggingError::Install(e.to_string()))?;

    let registry = Registry::default().with(filter);
    let result = match config.format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr).with_target(true)),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true),
            ),
        ),
    };
    result.map_err(|e| LoggingError::Install(e.to_string()))
}
