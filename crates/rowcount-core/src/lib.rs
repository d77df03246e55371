pub mod config;
pub mod error;
pub mod interval;
pub mod metric;

pub use config::{ConfigOptions, ExporterConfig, SinkConfig, TableName};
pub use error::ConfigError;
pub use interval::parse_interval;
pub use metric::{
    escape_label_value, render_push_body, render_sample_line, Gauge, LabelSet, MetricName,
    Sample, EXPOSITION_CONTENT_TYPE, FAILURE_SENTINEL,
};
