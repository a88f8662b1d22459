//! Structured logging setup built on the `tracing` crate.
//!
//! Hosts call [`init_logging`] once at startup; the library itself only
//! emits `tracing` events. `STRATA_LOG` overrides the configured filter the
//! same way `RUST_LOG` conventionally would.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format: "text" or "json".
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: "stdout" or "stderr".
    #[serde(default = "default_output")]
    pub output: String,

    /// Colored output (text format only).
    #[serde(default = "default_color")]
    pub color: bool,

    /// Module-specific level overrides, e.g. `strata::store` → `debug`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            output: default_output(),
            color: default_color(),
            modules: HashMap::new(),
        }
    }
}

/// Errors raised while building the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log directive '{0}'")]
    InvalidDirective(String),

    #[error("invalid log format '{0}' (must be 'text' or 'json')")]
    InvalidFormat(String),

    #[error("invalid log output '{0}' (must be 'stdout' or 'stderr')")]
    InvalidOutput(String),
}

/// Install the global tracing subscriber.
///
/// Filter priority: `STRATA_LOG` environment variable, then the config's
/// level and per-module overrides, then "info".
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), LoggingError> {
    let filter = build_env_filter(config)?;
    let base = Registry::default().with(filter);

    let format = config.map(|c| c.format.as_str()).unwrap_or("text");
    let output = config.map(|c| c.output.as_str()).unwrap_or("stderr");
    let color = config.map(|c| c.color).unwrap_or(true);

    match (format, output) {
        ("json", "stdout") => base
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stdout),
            )
            .init(),
        ("json", "stderr") => base
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .init(),
        ("text", "stdout") => base
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(color)
                    .with_writer(std::io::stdout),
            )
            .init(),
        ("text", "stderr") => base
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(color)
                    .with_writer(std::io::stderr),
            )
            .init(),
        ("json" | "text", other) => return Err(LoggingError::InvalidOutput(other.to_string())),
        (other, _) => return Err(LoggingError::InvalidFormat(other.to_string())),
    }

    Ok(())
}

fn build_env_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_env("STRATA_LOG") {
        return Ok(filter);
    }

    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    let mut filter = EnvFilter::new(level);

    if let Some(config) = config {
        for (module, module_level) in &config.modules {
            let directive = format!("{module}={module_level}");
            filter = filter.add_directive(
                directive
                    .parse()
                    .map_err(|_| LoggingError::InvalidDirective(directive.clone()))?,
            );
        }
    }

    Ok(filter)
}
