use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use census_metrics::{Attachments, Metric, Producer, Resource};
use census_system::{Addr, Service};
use census_tags::{Mutator, TagMap};
use chrono::{DateTime, Utc};

use crate::service::{
    FindView, ReadMetrics, Record, RegisterMeasure, RegisterViews, RetrieveData, SetReportingPeriod,
    SetResource, Stats, StatsService, Stop, Subscribe, UnregisterMeasure, UnregisterViews,
    Unsubscribe,
};
use crate::{Measure, Measurement, Row, StatsError, View};

/// Options for [`StatsHandle::record_with_options`].
#[derive(Clone, Debug, Default)]
pub struct RecordOptions {
    tags: TagMap,
    mutators: Vec<Mutator>,
    measurements: Vec<Measurement>,
    attachments: Attachments,
    timestamp: Option<DateTime<Utc>>,
}

impl RecordOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base tags of the record.
    pub fn with_tags(mut self, tags: TagMap) -> Self {
        self.tags = tags;
        self
    }

    /// Adds mutators applied on top of the base tags.
    pub fn with_mutators(mut self, mutators: impl IntoIterator<Item = Mutator>) -> Self {
        self.mutators.extend(mutators);
        self
    }

    /// Adds measurements to record.
    pub fn with_measurements(mut self, measurements: impl IntoIterator<Item = Measurement>) -> Self {
        self.measurements.extend(measurements);
        self
    }

    /// Adds attachments, which are kept in distribution exemplars.
    pub fn with_attachments(mut self, attachments: impl IntoIterator<Item = (String, String)>) -> Self {
        self.attachments.extend(attachments);
        self
    }

    /// Sets the time of the measurements. Defaults to the time of recording.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A cloneable handle to a running [`StatsService`].
///
/// Recording never blocks and never fails. All other operations are requests that wait for the
/// service to respond, and fail with [`StatsError::Stopped`] once the service has stopped.
#[derive(Clone, Debug)]
pub struct StatsHandle {
    addr: Addr<Stats>,
}

impl StatsHandle {
    /// Creates a handle for the service at `addr`.
    pub fn new(addr: Addr<Stats>) -> Self {
        Self { addr }
    }

    /// Starts the service in the current runtime and returns a handle to it.
    pub fn start(service: StatsService) -> Self {
        Self::new(service.start())
    }

    /// Returns the address of the service.
    pub fn addr(&self) -> &Addr<Stats> {
        &self.addr
    }

    /// Registers a measure.
    pub async fn register_measure(&self, measure: Measure) -> Result<(), StatsError> {
        self.addr.send(RegisterMeasure(measure)).await?
    }

    /// Removes a measure that is no longer used by any view.
    pub async fn unregister_measure(&self, name: impl Into<String>) -> Result<(), StatsError> {
        self.addr.send(UnregisterMeasure(name.into())).await?
    }

    /// Registers and subscribes views. See [`RegisterViews`] for the rules.
    pub async fn register_views(
        &self,
        views: impl IntoIterator<Item = View>,
    ) -> Result<(), StatsError> {
        let views = views.into_iter().collect();
        self.addr.send(RegisterViews(views)).await?
    }

    /// Removes views by name.
    pub async fn unregister_views(
        &self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<(), StatsError> {
        let names = names.into_iter().map(Into::into).collect();
        Ok(self.addr.send(UnregisterViews(names)).await?)
    }

    /// Resumes collecting data for a view.
    pub async fn subscribe(&self, name: impl Into<String>) -> Result<(), StatsError> {
        self.addr.send(Subscribe(name.into())).await?
    }

    /// Stops collecting data for a view and discards its rows.
    pub async fn unsubscribe(&self, name: impl Into<String>) -> Result<(), StatsError> {
        self.addr.send(Unsubscribe(name.into())).await?
    }

    /// Returns the definition of a registered view.
    pub async fn find_view(&self, name: impl Into<String>) -> Result<Option<View>, StatsError> {
        Ok(self.addr.send(FindView(name.into())).await?)
    }

    /// Returns a copy of all rows of a subscribed view.
    pub async fn retrieve_data(&self, name: impl Into<String>) -> Result<Vec<Row>, StatsError> {
        self.addr.send(RetrieveData(name.into())).await?
    }

    /// Records measurements with the given tags.
    pub fn record(&self, tags: &TagMap, measurements: impl IntoIterator<Item = Measurement>) {
        self.record_with_options(
            RecordOptions::new()
                .with_tags(tags.clone())
                .with_measurements(measurements),
        );
    }

    /// Records measurements with mutated tags, attachments or an explicit timestamp.
    ///
    /// If a mutator carries an invalid tag value, the measurements are dropped.
    pub fn record_with_options(&self, options: RecordOptions) {
        let RecordOptions {
            tags,
            mutators,
            measurements,
            attachments,
            timestamp,
        } = options;

        if measurements.is_empty() {
            return;
        }

        let tags = if mutators.is_empty() {
            tags
        } else {
            match tags.derive(mutators) {
                Ok(tags) => tags,
                Err(error) => {
                    census_log::debug!(
                        error = &error as &dyn Error,
                        "dropping measurements with invalid tags"
                    );
                    return;
                }
            }
        };

        self.addr.send(Record {
            tags,
            measurements,
            attachments,
            timestamp: timestamp.unwrap_or_else(Utc::now),
        });
    }

    /// Changes the export interval. A zero duration restores the default.
    pub async fn set_reporting_period(&self, period: Duration) -> Result<(), StatsError> {
        Ok(self.addr.send(SetReportingPeriod(period)).await?)
    }

    /// Sets the resource attached to produced metrics.
    pub fn set_resource(&self, resource: Option<Resource>) {
        self.addr.send(SetResource(resource));
    }

    /// Returns all subscribed views as metrics.
    pub async fn read_metrics(&self) -> Result<Vec<Metric>, StatsError> {
        Ok(self.addr.send(ReadMetrics).await?)
    }

    /// Exports all views a final time and stops the service.
    pub async fn stop(&self) -> Result<(), StatsError> {
        Ok(self.addr.send(Stop).await?)
    }

    /// Returns a [`Producer`] reading metrics from this service.
    pub fn producer(&self) -> StatsProducer {
        StatsProducer {
            handle: self.clone(),
        }
    }
}

/// Exposes the views of a [`StatsService`] as a metric [`Producer`].
#[derive(Clone, Debug)]
pub struct StatsProducer {
    handle: StatsHandle,
}

#[async_trait]
impl Producer for StatsProducer {
    async fn read(&self) -> Vec<Metric> {
        match self.handle.read_metrics().await {
            Ok(metrics) => metrics,
            Err(error) => {
                census_log::debug!(error = &error as &dyn Error, "cannot read stats metrics");
                Vec::new()
            }
        }
    }
}
