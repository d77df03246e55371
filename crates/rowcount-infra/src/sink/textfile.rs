use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use rowcount_core::{render_sample_line, LabelSet, MetricName, Sample};

use super::MetricSink;
use crate::{InfraError, Result};

/// Writes `<output_dir>/<metric>.prom` for the node exporter textfile collector.
///
/// The file is truncated and rewritten on every emit, so it always holds
/// exactly one sample line.
#[derive(Debug, Clone)]
pub struct TextfileSink {
    path: PathBuf,
    metric: MetricName,
    labels: LabelSet,
}

impl TextfileSink {
    pub fn new(output_dir: impl AsRef<Path>, metric: MetricName, labels: LabelSet) -> Self {
        let path = output_dir.as_ref().join(format!("{}.prom", metric));
        Self {
            path,
            metric,
            labels,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetricSink for TextfileSink {
    async fn emit(&self, sample: &Sample) -> Result<()> {
        let line = render_sample_line(&self.metric, &self.labels, sample.value());
        debug!(path = %self.path.display(), "Writing metric file");

        tokio::fs::write(&self.path, line)
            .await
            .map_err(|source| InfraError::Io {
                path: self.path.clone(),
                source,
            })
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_in(dir: &Path) -> TextfileSink {
        TextfileSink::new(
            dir,
            MetricName::parse("orders_rows").unwrap(),
            LabelSet::new()
                .with("instance", "db-1")
                .with("job", "postgres_monitor"),
        )
    }

    #[test]
    fn test_path_is_metric_name() {
        let sink = sink_in(Path::new("/opt/node-exporter/prom"));
        assert_eq!(
            sink.path(),
            Path::new("/opt/node-exporter/prom/orders_rows.prom")
        );
    }

    #[tokio::test]
    async fn test_emit_writes_single_line() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path());

        sink.emit(&Sample::count(42)).await.unwrap();

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(
            contents,
            "orders_rows{instance=\"db-1\",job=\"postgres_monitor\"} 42\n"
        );
    }

    #[tokio::test]
    async fn test_emit_overwrites_previous_sample() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path());
        std::fs::write(sink.path(), "stale line one\nstale line two that is longer\n").unwrap();

        sink.emit(&Sample::count(1000)).await.unwrap();
        sink.emit(&Sample::failed()).await.unwrap();

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert_eq!(
            contents,
            "orders_rows{instance=\"db-1\",job=\"postgres_monitor\"} -1\n"
        );
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(&dir.path().join("absent"));

        let err = sink.emit(&Sample::count(1)).await.unwrap_err();
        assert!(matches!(err, InfraError::Io { .. }));
        assert!(err.to_string().contains("orders_rows.prom"));
    }
}
