//! Logging initialization

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::Args;

/// Build the log filter; `RUST_LOG` takes precedence over `--log-level`
pub fn build_filter(log_level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .context("Failed to create environment filter")
}

/// Install the global subscriber
pub fn init_telemetry(args: &Args) -> Result<()> {
    let env_filter = build_filter(&args.log_level)?;

    if args.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .context("Failed to install JSON log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    Ok(())
}
