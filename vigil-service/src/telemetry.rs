//! Tracing subscriber initialization.
//!
//! `VIGIL_LOG` (falling back to `RUST_LOG`) selects the filter; the default
//! is `info`. `VIGIL_LOG_FORMAT=json` switches from human-readable output to
//! one JSON object per line.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Parse a format name; anything other than `json` is pretty.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives
    pub filter: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        let filter = std::env::var("VIGIL_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string());
        let format = std::env::var("VIGIL_LOG_FORMAT")
            .map(|v| LogFormat::parse(&v))
            .unwrap_or_default();
        Self { filter, format }
    }
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed, so calling it twice is
/// harmless. Invalid filter directives fall back to `info`.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init()?,
    }

    tracing::info!(
        filter = %config.filter,
        format = ?config.format,
        "Telemetry initialized"
    );
    Ok(())
}
