//! Polling loop
//!
//! Each cycle counts rows, publishes the sample, then sleeps for the
//! configured interval. Per-cycle failures are logged and never stop the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rowcount_core::Sample;

use crate::database::RowSource;
use crate::sink::MetricSink;

pub struct Poller {
    source: Box<dyn RowSource>,
    sink: Box<dyn MetricSink>,
    interval: Duration,
    cycles: AtomicU64,
}

impl Poller {
    pub fn new(source: Box<dyn RowSource>, sink: Box<dyn MetricSink>, interval: Duration) -> Self {
        Self {
            source,
            sink,
            interval,
            cycles: AtomicU64::new(0),
        }
    }

    /// Number of completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Run a single cycle. A failed query is published as the failure sentinel.
    pub async fn poll_once(&self) -> Sample {
        let sample = match self.source.count_rows().await {
            Ok(count) => Sample::count(count),
            Err(e) => {
                warn!(
                    source = %self.source.describe(),
                    error = %e,
                    "Row count query failed, reporting sentinel"
                );
                Sample::failed()
            }
        };

        match self.sink.emit(&sample).await {
            Ok(()) => info!(
                sink = %self.sink.describe(),
                value = sample.value(),
                captured_at = %sample.captured_at(),
                "Metric published"
            ),
            Err(e) => error!(
                sink = %self.sink.describe(),
                error = %e,
                "Failed to publish metric"
            ),
        }

        self.cycles.fetch_add(1, Ordering::Relaxed);
        sample
    }

    /// Poll until `cancel` fires. Cancellation interrupts the sleep but lets
    /// an in-flight cycle finish.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval = ?self.interval,
            source = %self.source.describe(),
            sink = %self.sink.describe(),
            "Starting monitoring"
        );

        while !cancel.is_cancelled() {
            self.poll_once().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(cycles = self.cycles(), "Monitoring stopped");
    }
}
