//! Application wiring

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rowcount_core::{ConfigOptions, ExporterConfig, SinkConfig};
use rowcount_infra::{MetricSink, PgRowSource, Poller, PushgatewaySink, TextfileSink};

use crate::cli::Args;

/// Merge the config file (if any) under the command-line options and validate
pub fn resolve_config(args: &Args) -> Result<ExporterConfig> {
    let base = match &args.config {
        Some(path) => ConfigOptions::from_file(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?,
        None => ConfigOptions::default(),
    };

    base.merge(args.options())
        .resolve()
        .context("Invalid configuration")
}

/// Build the sink selected by the configuration
pub fn build_sink(config: &ExporterConfig) -> Result<Box<dyn MetricSink>> {
    let sink: Box<dyn MetricSink> = match &config.sink {
        SinkConfig::Textfile { output_dir, .. } => Box::new(TextfileSink::new(
            output_dir,
            config.metric.clone(),
            config.sink.labels(),
        )),
        SinkConfig::Pushgateway { address, .. } => Box::new(
            PushgatewaySink::new(
                address,
                config.metric.clone(),
                config.help_text(),
                &config.sink.labels(),
            )
            .context("Failed to set up Pushgateway client")?,
        ),
    };
    Ok(sink)
}

/// Main application
pub struct App {
    poller: Poller,
}

impl App {
    /// Resolve configuration and set up the database handle and sink.
    ///
    /// Every failure here is fatal and happens before the first cycle.
    pub fn build(args: &Args) -> Result<Self> {
        let config = resolve_config(args)?;

        let source = PgRowSource::connect_lazy(&config.dsn, config.table.clone())
            .context("Failed to prepare database connection")?;
        let sink = build_sink(&config)?;

        info!(
            table = %config.table,
            metric = %config.metric,
            sink = %sink.describe(),
            interval = ?config.interval,
            "Exporter configured"
        );

        Ok(Self {
            poller: Poller::new(Box::new(source), sink, config.interval),
        })
    }

    /// Poll until SIGINT or SIGTERM
    pub async fn run(self) -> Result<()> {
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            trigger.cancel();
        });

        self.poller.run(cancel).await;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["rowcount-exporter"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_resolve_config_from_flags() {
        let args = parse(&[
            "--dsn",
            "postgres://localhost/app",
            "--table",
            "orders",
            "--metric",
            "orders_rows",
            "--output-dir",
            "/tmp/prom",
            "--instance",
            "db-1",
        ]);

        let config = resolve_config(&args).unwrap();
        assert_eq!(
            config.sink,
            SinkConfig::Textfile {
                output_dir: PathBuf::from("/tmp/prom"),
                job: "postgres_monitor".to_string(),
                instance: "db-1".to_string(),
            }
        );
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "dsn = \"postgres://localhost/app\"\n\
             table = \"orders\"\n\
             metric = \"orders_rows\"\n\
             interval = \"5m\"\n\
             pushgateway = \"gateway:9091\""
        )
        .unwrap();

        let path = file.path().to_string_lossy().into_owned();
        let args = parse(&["--config", &path, "--interval", "10s", "--job", "nightly"]);

        let config = resolve_config(&args).unwrap();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(
            config.sink,
            SinkConfig::Pushgateway {
                address: "gateway:9091".to_string(),
                job: "nightly".to_string(),
                instance: "localhost".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_dsn_is_fatal() {
        let args = parse(&["--table", "orders", "--metric", "orders_rows"]);
        let err = resolve_config(&args).unwrap_err();
        assert!(format!("{:#}", err).contains("--dsn"));
    }

    #[test]
    fn test_build_sink_selects_mode() {
        let args = parse(&[
            "--dsn",
            "postgres://localhost/app",
            "--table",
            "orders",
            "--metric",
            "orders_rows",
            "--pushgateway",
            "http://gateway:9091",
        ]);
        let config = resolve_config(&args).unwrap();
        let sink = build_sink(&config).unwrap();
        assert_eq!(
            sink.describe(),
            "pushgateway http://gateway:9091/metrics/job/postgres_monitor/instance/localhost"
        );

        let args = parse(&[
            "--dsn",
            "postgres://localhost/app",
            "--table",
            "orders",
            "--metric",
            "orders_rows",
            "--output-dir",
            "/tmp/prom",
        ]);
        let config = resolve_config(&args).unwrap();
        let sink = build_sink(&config).unwrap();
        assert_eq!(sink.describe(), "file /tmp/prom/orders_rows.prom");
    }

    #[tokio::test]
    async fn test_build_rejects_bad_dsn() {
        let args = parse(&[
            "--dsn",
            "definitely not a dsn",
            "--table",
            "orders",
            "--metric",
            "orders_rows",
        ]);
        assert!(App::build(&args).is_err());
    }
}
