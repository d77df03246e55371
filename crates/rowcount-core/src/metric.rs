//! Metric model and Prometheus text exposition
//!
//! Rendering is done by hand; there is no metric registry.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigError;

/// Value reported when the row count query fails.
pub const FAILURE_SENTINEL: i64 = -1;

/// Content type of the text exposition format, as expected by the Pushgateway.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

static METRIC_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("valid metric name regex"));

/// A validated Prometheus metric name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricName(String);

impl MetricName {
    /// Validate a metric name; a rejected name is a registration failure.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        if METRIC_NAME_RE.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(ConfigError::InvalidMetricName(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered label pairs attached to the sample
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<(String, String)>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a label, replacing an existing one with the same name
    pub fn with(mut self, name: &str, value: &str) -> Self {
        match self.labels.iter().position(|(n, _)| n == name) {
            Some(idx) => self.labels[idx].1 = value.to_string(),
            None => self.labels.push((name.to_string(), value.to_string())),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Render as `name="value",...` without the surrounding braces
    pub fn render(&self) -> String {
        self.labels
            .iter()
            .map(|(name, value)| format!("{}=\"{}\"", name, escape_label_value(value)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Escape a label value for the text exposition format.
pub fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// One observation of the table's row count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    count: Option<i64>,
    captured_at: DateTime<Utc>,
}

impl Sample {
    /// A successful count
    pub fn count(count: i64) -> Self {
        Self {
            count: Some(count),
            captured_at: Utc::now(),
        }
    }

    /// A failed query, reported as [`FAILURE_SENTINEL`]
    pub fn failed() -> Self {
        Self {
            count: None,
            captured_at: Utc::now(),
        }
    }

    /// The value to publish
    pub fn value(&self) -> i64 {
        self.count.unwrap_or(FAILURE_SENTINEL)
    }

    pub fn is_failure(&self) -> bool {
        self.count.is_none()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Gauge metric
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }
}

/// Render the single sample line written to the textfile collector.
///
/// Produces `metric{instance="...",job="..."} value\n`.
pub fn render_sample_line(name: &MetricName, labels: &LabelSet, value: i64) -> String {
    if labels.is_empty() {
        format!("{} {}\n", name, value)
    } else {
        format!("{}{{{}}} {}\n", name, labels.render(), value)
    }
}

/// Render the gauge payload pushed to a Pushgateway.
///
/// Grouping labels travel in the URL, so the sample itself is unlabelled.
pub fn render_push_body(name: &MetricName, help: &str, value: f64) -> String {
    format!(
        "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}\n",
        name = name,
        help = escape_help(help),
        value = value
    )
}
