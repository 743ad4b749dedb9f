//! Structured logging infrastructure.
//!
//! Uses `tracing` and `tracing-subscriber` for async-aware structured
//! logging with environment-based filtering. The `RUST_LOG` variable, when
//! set, overrides the configured level.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed with colors, for development.
    Pretty,
    /// Compact single lines, for production.
    Compact,
    /// JSON, for log aggregation.
    Json,
}

/// Initialize the global subscriber. Call once at startup; a second call
/// fails.
pub fn init(level: &str, format: OutputFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow!("invalid log level \"{level}\": {e}"))?;

    let fmt_layer = match format {
        OutputFormat::Pretty => fmt::layer().pretty().boxed(),
        OutputFormat::Compact => fmt::layer().compact().with_ansi(false).boxed(),
        OutputFormat::Json => fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize tracing: {e}"))?;
    Ok(())
}
