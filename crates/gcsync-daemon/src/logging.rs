//! Logger initialization
//!
//! Builds the global `tracing` subscriber from the `--log-level` and
//! `--log-format` flags. `RUST_LOG`, when set, takes precedence over the
//! flag so individual modules can be turned up without a restart script.

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Timestamp layout for every log line
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Output encoding of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human readable, one event per line
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Maps a level name to a [`Level`]
///
/// Case-insensitive; `warning` is accepted for `warn`. Anything else falls
/// back to `info`, reported through the second tuple field.
pub fn parse_level(name: &str) -> (Level, bool) {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => (Level::TRACE, true),
        "debug" => (Level::DEBUG, true),
        "info" => (Level::INFO, true),
        "warn" | "warning" => (Level::WARN, true),
        "error" => (Level::ERROR, true),
        _ => (Level::INFO, false),
    }
}

/// Installs the global subscriber
pub fn init(level_name: &str, format: LogFormat) {
    let (level, recognized) = parse_level(level_name);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }

    if !recognized {
        tracing::warn!(level = level_name, "Unknown log level, using info");
    }
}
