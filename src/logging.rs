/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::ServiceConfig;
use crate::error::ConfigError;

/// Crates whose events are shown by default
const LOG_TARGETS: [&str; 3] = [
    "product_service",
    "product_connect",
    "product_core_resilience",
];

/// Default filter directive, e.g. `product_service=info,product_connect=info,...`
pub fn default_directive(level: Level) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level.as_str().to_lowercase()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Effective level: `verbose` forces debug
pub fn effective_level(config: &ServiceConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        config.log_level.to_tracing_level()
    }
}

/// Where log events are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDestination<'a> {
    /// Compact text on stderr; stdout carries command output
    Stderr,
    /// JSON lines in a file
    File(&'a Path),
}

pub fn destination(config: &ServiceConfig) -> LogDestination<'_> {
    match config.log_file {
        Some(ref path) => LogDestination::File(path),
        None => LogDestination::Stderr,
    }
}

/// Initialize structured logging based on configuration
pub fn init_logging(config: &ServiceConfig) -> Result<(), ConfigError> {
    let directive = default_directive(effective_level(config));

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .map_err(|e| ConfigError::Invalid(format!("Failed to create log filter: {}", e)))?;

    match destination(config) {
        LogDestination::File(path) => init_file_logging(path, env_filter)?,
        LogDestination::Stderr => init_stderr_logging(env_filter),
    }

    Ok(())
}

/// Initialize compact logging to stderr
fn init_stderr_logging(env_filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Initialize JSON logging to a file
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<(), ConfigError> {
    let file = File::create(log_path).map_err(|source| ConfigError::Io {
        path: log_path.to_path_buf(),
        source,
    })?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false) // No ANSI colors in file
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
