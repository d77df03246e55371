//! Startup error types

use thiserror::Error;

/// Errors raised while resolving the exporter configuration.
///
/// Every variant is fatal: the exporter refuses to start the polling loop.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required option: --{0}")]
    Missing(&'static str),

    #[error("invalid interval {input:?}: {reason}")]
    InvalidInterval { input: String, reason: String },

    #[error("invalid metric name {0:?}: must match [a-zA-Z_:][a-zA-Z0-9_:]*")]
    InvalidMetricName(String),

    #[error("invalid table name {0:?}: expected an identifier, optionally schema-qualified")]
    InvalidTableName(String),

    #[error("failed to load configuration file: {0}")]
    Load(#[from] ::config::ConfigError),
}

impl ConfigError {
    pub fn interval(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInterval {
            input: input.into(),
            reason: reason.into(),
        }
    }
}
