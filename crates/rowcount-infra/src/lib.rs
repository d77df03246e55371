pub mod database;
pub mod poller;
pub mod sink;

use std::path::PathBuf;

pub use database::{count_query, parse_dsn, PgRowSource, RowSource};
pub use poller::Poller;
pub use sink::{
    pushgateway::{grouping_url, PushgatewaySink},
    textfile::TextfileSink,
    MetricSink,
};

#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Pushgateway rejected push ({status}): {body}")]
    PushRejected { status: u16, body: String },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, InfraError>;
