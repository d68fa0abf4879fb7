//! gcs-sync - keeps local directories in sync with Google Cloud Storage
//!
//! Loads the YAML rule file, starts one scheduler per enabled rule and
//! blocks until SIGINT or SIGTERM, then stops every rule within the
//! shutdown deadline.
//!
//! # Exit status
//!
//! Non-zero when the configuration cannot be loaded or validated, when a
//! rule fails to start, or when shutdown exceeds its deadline.

mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use gcsync_core::config::{parse_duration, Config};
use gcsync_sync::gsutil::{GsutilInvoker, DEFAULT_PROGRAM};
use gcsync_sync::Supervisor;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::logging::LogFormat;

/// Config location inside the container image
const DEFAULT_CONFIG_PATH: &str = "/app/settings/config.yaml";

#[derive(Debug, Parser)]
#[command(
    name = "gcs-sync",
    version,
    about = "Bi-directional Google Cloud Storage synchronizer"
)]
struct Cli {
    /// Path to the YAML configuration
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace|debug|info|warn|error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log line encoding
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// How long to wait for running transfers on shutdown
    #[arg(long, default_value = "15s", value_parser = parse_duration)]
    shutdown_timeout: Duration,

    /// gsutil executable
    #[arg(long, default_value = DEFAULT_PROGRAM)]
    gsutil: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

/// Loads the configuration and rejects it if any enabled rule is invalid
fn load_config(path: &Path) -> Result<Config> {
    let config =
        Config::load(path).with_context(|| format!("Failed to load config {}", path.display()))?;

    let errors = config.validate();
    if !errors.is_empty() {
        for err in &errors {
            error!(field = %err.field, "{}", err.message);
        }
        bail!(
            "{} has {} invalid setting(s): {}",
            path.display(),
            errors.len(),
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        );
    }
    Ok(config)
}

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
///
/// If a handler cannot be installed, that signal is simply not awaited.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;

    if cli.check {
        let enabled = config.enabled_rules().count();
        println!(
            "{}: OK ({} rule(s), {} enabled)",
            cli.config.display(),
            config.sync.len(),
            enabled
        );
        return Ok(());
    }

    let transfer = Arc::new(GsutilInvoker::with_program(&cli.gsutil));
    let supervisor = Supervisor::start_all(&config.sync, transfer)?;
    if supervisor.running() == 0 {
        warn!("No enabled sync rules; waiting for shutdown signal");
    }

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    shutdown_token.cancelled().await;
    supervisor.shutdown(cli.shutdown_timeout).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "gcs-sync starting"
    );

    let result = run(cli).await;

    match &result {
        Ok(()) => info!("gcs-sync shut down gracefully"),
        Err(e) => error!(error = %format!("{e:#}"), "gcs-sync exiting with error"),
    }

    result
}
