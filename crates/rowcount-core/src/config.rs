use ::config::{Config, File};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::interval::parse_interval;
use crate::metric::{LabelSet, MetricName};

pub const DEFAULT_INTERVAL: &str = "1m";
pub const DEFAULT_OUTPUT_DIR: &str = "/opt/node-exporter/prom";
pub const DEFAULT_JOB: &str = "postgres_monitor";
pub const DEFAULT_INSTANCE: &str = "localhost";

// Each part is either unquoted (`orders`, `заказы`) or double-quoted with
// `""` for a literal quote (`"Orders"`).
static TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    const PART: &str = r#"(?:"(?:[^"\x00]|"")+"|[\p{L}_][\p{L}\p{N}_$]*)"#;
    Regex::new(&format!(r"^{PART}(?:\.{PART})?$")).expect("valid table name regex")
});

/// Raw, possibly incomplete options from one configuration layer.
///
/// Layers are merged with [`ConfigOptions::merge`] and validated once with
/// [`ConfigOptions::resolve`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOptions {
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub dsn: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default, alias = "output-dir")]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub job: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub pushgateway: Option<String>,
}

impl ConfigOptions {
    /// Load options from a TOML, YAML or JSON file (format inferred from the extension)
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Overlay `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(self, overrides: ConfigOptions) -> Self {
        Self {
            interval: overrides.interval.or(self.interval),
            dsn: overrides.dsn.or(self.dsn),
            table: overrides.table.or(self.table),
            metric: overrides.metric.or(self.metric),
            output_dir: overrides.output_dir.or(self.output_dir),
            job: overrides.job.or(self.job),
            instance: overrides.instance.or(self.instance),
            pushgateway: overrides.pushgateway.or(self.pushgateway),
        }
    }

    /// Apply defaults and validate into an immutable [`ExporterConfig`].
    ///
    /// An option that is present but empty is treated as missing.
    pub fn resolve(self) -> Result<ExporterConfig, ConfigError> {
        let dsn = required(self.dsn, "dsn")?;
        let table = TableName::parse(&required(self.table, "table")?)?;
        let metric = MetricName::parse(&required(self.metric, "metric")?)?;

        let interval_text = with_default(self.interval, DEFAULT_INTERVAL, "interval")?;
        let interval = parse_interval(&interval_text)?;

        let job = with_default(self.job, DEFAULT_JOB, "job")?;
        let instance = with_default(self.instance, DEFAULT_INSTANCE, "instance")?;

        let sink = match self.pushgateway {
            Some(address) => SinkConfig::Pushgateway {
                address: non_empty(address, "pushgateway")?,
                job,
                instance,
            },
            None => {
                let output_dir = self
                    .output_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
                if output_dir.as_os_str().is_empty() {
                    return Err(ConfigError::Missing("output-dir"));
                }
                SinkConfig::Textfile {
                    output_dir,
                    job,
                    instance,
                }
            }
        };

        Ok(ExporterConfig {
            interval,
            dsn,
            table,
            metric,
            sink,
        })
    }
}

fn non_empty(value: String, name: &'static str) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing(name))
    } else {
        Ok(value)
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .ok_or(ConfigError::Missing(name))
        .and_then(|v| non_empty(v, name))
}

fn with_default(
    value: Option<String>,
    default: &str,
    name: &'static str,
) -> Result<String, ConfigError> {
    non_empty(value.unwrap_or_else(|| default.to_string()), name)
}

/// A SQL identifier, optionally qualified by a schema.
///
/// Quoted parts are kept verbatim so the count query preserves their case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        if TABLE_NAME_RE.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(ConfigError::InvalidTableName(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where each sample is published
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkConfig {
    /// `<output_dir>/<metric>.prom` for the node exporter textfile collector
    Textfile {
        output_dir: PathBuf,
        job: String,
        instance: String,
    },
    /// Push to a Pushgateway under the given grouping key
    Pushgateway {
        address: String,
        job: String,
        instance: String,
    },
}

impl SinkConfig {
    pub fn job(&self) -> &str {
        match self {
            SinkConfig::Textfile { job, .. } | SinkConfig::Pushgateway { job, .. } => job,
        }
    }

    pub fn instance(&self) -> &str {
        match self {
            SinkConfig::Textfile { instance, .. } | SinkConfig::Pushgateway { instance, .. } => {
                instance
            }
        }
    }

    /// `instance` and `job` labels, in exposition order
    pub fn labels(&self) -> LabelSet {
        LabelSet::new()
            .with("instance", self.instance())
            .with("job", self.job())
    }

    pub fn is_push(&self) -> bool {
        matches!(self, SinkConfig::Pushgateway { .. })
    }
}

/// Fully resolved exporter configuration
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub interval: Duration,
    pub dsn: String,
    pub table: TableName,
    pub metric: MetricName,
    pub sink: SinkConfig,
}

impl ExporterConfig {
    /// Help text attached to the pushed gauge
    pub fn help_text(&self) -> String {
        format!("Row count for table {}", self.table)
    }
}
