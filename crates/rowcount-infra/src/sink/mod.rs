//! Metric sinks
//!
//! A sink publishes one [`Sample`] per polling cycle, either to the node
//! exporter textfile directory or to a Pushgateway.

pub mod pushgateway;
pub mod textfile;

use async_trait::async_trait;

use rowcount_core::Sample;

use crate::Result;

/// Destination for each cycle's sample
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Publish the sample; failures are logged by the poller and retried next cycle
    async fn emit(&self, sample: &Sample) -> Result<()>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}
