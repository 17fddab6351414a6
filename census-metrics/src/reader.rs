use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use census_system::{AsyncResponse, FromMessage, Interface, Receiver, Sender, Service};
use tokio::time::MissedTickBehavior;

use crate::{Metric, ProducerRegistry};

/// The default interval in which an [`IntervalReader`] exports metrics.
pub const DEFAULT_READ_INTERVAL: Duration = Duration::from_secs(60);

/// The error type returned by [`MetricExporter`]s.
pub type ExportError = Box<dyn Error + Send + Sync>;

/// A backend receiving batches of metrics.
#[async_trait]
pub trait MetricExporter: Send + Sync {
    /// Exports one batch of metrics read from all producers.
    async fn export_metrics(&self, metrics: Vec<Metric>) -> Result<(), ExportError>;
}

/// Reads and exports all producers immediately.
#[derive(Debug)]
pub struct FlushMetrics;

/// Exports one last time and stops the reader.
#[derive(Debug)]
pub struct StopReader;

/// Messages of the [`IntervalReader`] service.
#[derive(Debug)]
pub enum MetricReader {
    /// Reads and exports immediately.
    Flush(FlushMetrics, Sender<()>),
    /// Stops the reader after a final export.
    Stop(StopReader, Sender<()>),
}

impl MetricReader {
    fn variant(&self) -> &'static str {
        match self {
            MetricReader::Flush(..) => "Flush",
            MetricReader::Stop(..) => "Stop",
        }
    }
}

impl Interface for MetricReader {}

impl FromMessage<FlushMetrics> for MetricReader {
    type Response = AsyncResponse<()>;

    fn from_message(message: FlushMetrics, sender: Sender<()>) -> Self {
        Self::Flush(message, sender)
    }
}

impl FromMessage<StopReader> for MetricReader {
    type Response = AsyncResponse<()>;

    fn from_message(message: StopReader, sender: Sender<()>) -> Self {
        Self::Stop(message, sender)
    }
}

/// Service that periodically reads all registered producers and exports their metrics.
///
/// Failed exports are logged and do not stop the reader. The first export happens one full
/// interval after the service has started.
pub struct IntervalReader {
    producers: Arc<ProducerRegistry>,
    exporter: Arc<dyn MetricExporter>,
    interval: Duration,
}

impl IntervalReader {
    /// Creates a reader exporting in the [default interval](DEFAULT_READ_INTERVAL).
    pub fn new(producers: Arc<ProducerRegistry>, exporter: Arc<dyn MetricExporter>) -> Self {
        Self {
            producers,
            exporter,
            interval: DEFAULT_READ_INTERVAL,
        }
    }

    /// Sets the export interval. A zero interval restores the default.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = if interval.is_zero() {
            DEFAULT_READ_INTERVAL
        } else {
            interval
        };
        self
    }

    async fn export(&self) {
        let metrics = self.producers.read_all().await;
        if metrics.is_empty() {
            return;
        }

        census_log::trace!("exporting {} metrics", metrics.len());
        if let Err(error) = self.exporter.export_metrics(metrics).await {
            census_log::error!(error = &*error as &dyn Error, "failed to export metrics");
        }
    }
}

impl Service for IntervalReader {
    type Interface = MetricReader;

    fn spawn_handler(self, mut rx: Receiver<Self::Interface>) {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            census_log::info!("metric reader started");

            loop {
                tokio::select! {
                    biased;

                    _ = ticker.tick() => self.export().await,
                    message = rx.recv() => {
                        let Some(message) = message else {
                            census_log::debug!("all metric reader handles dropped");
                            break;
                        };
                        census_log::trace!("metric reader received {}", message.variant());
                        match message {
                            MetricReader::Flush(_, sender) => {
                                self.export().await;
                                sender.send(());
                            }
                            MetricReader::Stop(_, sender) => {
                                self.export().await;
                                rx.close();
                                sender.send(());
                                break;
                            }
                        }
                    },
                }
            }

            census_log::info!("metric reader stopped");
        });
    }
}
