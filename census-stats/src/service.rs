use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use census_metrics::{Attachments, Metric, Resource};
use census_system::{AsyncResponse, FromMessage, Interface, NoResponse, Receiver, Sender, Service};
use census_tags::TagMap;
use chrono::{DateTime, Utc};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::StatsError;
use crate::config::{StatsConfig, reporting_period};
use crate::export::{ExporterRegistry, ViewData};
use crate::measure::{Measure, Measurement};
use crate::metrics::view_to_metric;
use crate::view::{RegisteredView, Row, View};

/// Registers a measure.
///
/// Fails with [`StatsError::MeasureAlreadyRegistered`] if a measure with the same name exists.
#[derive(Debug)]
pub struct RegisterMeasure(pub Measure);

/// Removes a measure that is not referenced by any view.
#[derive(Debug)]
pub struct UnregisterMeasure(pub String);

/// Registers and subscribes a batch of views.
///
/// Registering a view with the same name and an equivalent definition again succeeds and
/// re-subscribes it. Measures of new views are registered automatically. If any view in the
/// batch is invalid or conflicts, no view is registered.
#[derive(Debug)]
pub struct RegisterViews(pub Vec<View>);

/// Removes views and discards their data. Unknown names are ignored.
#[derive(Debug)]
pub struct UnregisterViews(pub Vec<String>);

/// Resumes collecting data for a registered view.
#[derive(Debug)]
pub struct Subscribe(pub String);

/// Stops collecting data for a registered view and discards its rows.
#[derive(Debug)]
pub struct Unsubscribe(pub String);

/// Records measurements with a common set of tags.
#[derive(Debug)]
pub struct Record {
    /// Tags applied to all measurements.
    pub tags: TagMap,
    /// The recorded values.
    pub measurements: Vec<Measurement>,
    /// Context stored in distribution exemplars.
    pub attachments: Attachments,
    /// The time of the measurements.
    pub timestamp: DateTime<Utc>,
}

/// Returns a copy of all rows of a subscribed view.
#[derive(Debug)]
pub struct RetrieveData(pub String);

/// Returns the definition of a registered view.
#[derive(Debug)]
pub struct FindView(pub String);

/// Changes the export interval. A zero duration restores the default of 10 seconds.
#[derive(Debug)]
pub struct SetReportingPeriod(pub Duration);

/// Sets the resource attached to produced metrics.
#[derive(Debug)]
pub struct SetResource(pub Option<Resource>);

/// Returns all subscribed views as metrics.
#[derive(Debug)]
pub struct ReadMetrics;

/// Exports all views a final time and stops the service.
#[derive(Debug)]
pub struct Stop;

/// Aggregates recorded measurements into views.
///
/// All state is owned by a single [`StatsService`], which processes messages in the order they
/// were sent. A [`RetrieveData`] sent after a [`Record`] therefore always observes the recorded
/// values.
///
/// Subscribed views are exported to the [`ExporterRegistry`] every reporting period. Views keep
/// accumulating across exports until they are unsubscribed.
#[derive(Debug)]
pub enum Stats {
    /// See [`RegisterMeasure`].
    RegisterMeasure(RegisterMeasure, Sender<Result<(), StatsError>>),
    /// See [`UnregisterMeasure`].
    UnregisterMeasure(UnregisterMeasure, Sender<Result<(), StatsError>>),
    /// See [`RegisterViews`].
    RegisterViews(RegisterViews, Sender<Result<(), StatsError>>),
    /// See [`UnregisterViews`].
    UnregisterViews(UnregisterViews, Sender<()>),
    /// See [`Subscribe`].
    Subscribe(Subscribe, Sender<Result<(), StatsError>>),
    /// See [`Unsubscribe`].
    Unsubscribe(Unsubscribe, Sender<Result<(), StatsError>>),
    /// See [`Record`].
    Record(Record),
    /// See [`RetrieveData`].
    RetrieveData(RetrieveData, Sender<Result<Vec<Row>, StatsError>>),
    /// See [`FindView`].
    FindView(FindView, Sender<Option<View>>),
    /// See [`SetReportingPeriod`].
    SetReportingPeriod(SetReportingPeriod, Sender<()>),
    /// See [`SetResource`].
    SetResource(SetResource),
    /// See [`ReadMetrics`].
    ReadMetrics(ReadMetrics, Sender<Vec<Metric>>),
    /// See [`Stop`].
    Stop(Stop, Sender<()>),
}

impl Stats {
    /// Returns the name of the message variant.
    fn variant(&self) -> &'static str {
        match self {
            Stats::RegisterMeasure(..) => "RegisterMeasure",
            Stats::UnregisterMeasure(..) => "UnregisterMeasure",
            Stats::RegisterViews(..) => "RegisterViews",
            Stats::UnregisterViews(..) => "UnregisterViews",
            Stats::Subscribe(..) => "Subscribe",
            Stats::Unsubscribe(..) => "Unsubscribe",
            Stats::Record(_) => "Record",
            Stats::RetrieveData(..) => "RetrieveData",
            Stats::FindView(..) => "FindView",
            Stats::SetReportingPeriod(..) => "SetReportingPeriod",
            Stats::SetResource(_) => "SetResource",
            Stats::ReadMetrics(..) => "ReadMetrics",
            Stats::Stop(..) => "Stop",
        }
    }
}

impl Interface for Stats {}

impl FromMessage<RegisterMeasure> for Stats {
    type Response = AsyncResponse<Result<(), StatsError>>;
    fn from_message(message: RegisterMeasure, sender: Sender<Result<(), StatsError>>) -> Self {
        Self::RegisterMeasure(message, sender)
    }
}

impl FromMessage<UnregisterMeasure> for Stats {
    type Response = AsyncResponse<Result<(), StatsError>>;
    fn from_message(message: UnregisterMeasure, sender: Sender<Result<(), StatsError>>) -> Self {
        Self::UnregisterMeasure(message, sender)
    }
}

impl FromMessage<RegisterViews> for Stats {
    type Response = AsyncResponse<Result<(), StatsError>>;
    fn from_message(message: RegisterViews, sender: Sender<Result<(), StatsError>>) -> Self {
        Self::RegisterViews(message, sender)
    }
}

impl FromMessage<UnregisterViews> for Stats {
    type Response = AsyncResponse<()>;
    fn from_message(message: UnregisterViews, sender: Sender<()>) -> Self {
        Self::UnregisterViews(message, sender)
    }
}

impl FromMessage<Subscribe> for Stats {
    type Response = AsyncResponse<Result<(), StatsError>>;
    fn from_message(message: Subscribe, sender: Sender<Result<(), StatsError>>) -> Self {
        Self::Subscribe(message, sender)
    }
}

impl FromMessage<Unsubscribe> for Stats {
    type Response = AsyncResponse<Result<(), StatsError>>;
    fn from_message(message: Unsubscribe, sender: Sender<Result<(), StatsError>>) -> Self {
        Self::Unsubscribe(message, sender)
    }
}

impl FromMessage<Record> for Stats {
    type Response = NoResponse;
    fn from_message(message: Record, _: ()) -> Self {
        Self::Record(message)
    }
}

impl FromMessage<RetrieveData> for Stats {
    type Response = AsyncResponse<Result<Vec<Row>, StatsError>>;
    fn from_message(message: RetrieveData, sender: Sender<Result<Vec<Row>, StatsError>>) -> Self {
        Self::RetrieveData(message, sender)
    }
}

impl FromMessage<FindView> for Stats {
    type Response = AsyncResponse<Option<View>>;
    fn from_message(message: FindView, sender: Sender<Option<View>>) -> Self {
        Self::FindView(message, sender)
    }
}

impl FromMessage<SetReportingPeriod> for Stats {
    type Response = AsyncResponse<()>;
    fn from_message(message: SetReportingPeriod, sender: Sender<()>) -> Self {
        Self::SetReportingPeriod(message, sender)
    }
}

impl FromMessage<SetResource> for Stats {
    type Response = NoResponse;
    fn from_message(message: SetResource, _: ()) -> Self {
        Self::SetResource(message)
    }
}

impl FromMessage<ReadMetrics> for Stats {
    type Response = AsyncResponse<Vec<Metric>>;
    fn from_message(message: ReadMetrics, sender: Sender<Vec<Metric>>) -> Self {
        Self::ReadMetrics(message, sender)
    }
}

impl FromMessage<Stop> for Stats {
    type Response = AsyncResponse<()>;
    fn from_message(message: Stop, sender: Sender<()>) -> Self {
        Self::Stop(message, sender)
    }
}

enum StatsState {
    Running,
    Stopped,
}

/// Service implementing the [`Stats`] interface.
pub struct StatsService {
    measures: BTreeMap<String, Measure>,
    /// Names of the views registered for each measure.
    subscriptions: BTreeMap<String, BTreeSet<String>>,
    views: BTreeMap<String, RegisteredView>,
    exporters: Arc<ExporterRegistry>,
    resource: Option<Resource>,
    reporting_period: Duration,
    state: StatsState,
}

impl StatsService {
    /// Creates a new stats service without measures and views.
    pub fn new(config: &StatsConfig) -> Self {
        Self {
            measures: BTreeMap::new(),
            subscriptions: BTreeMap::new(),
            views: BTreeMap::new(),
            exporters: Arc::new(ExporterRegistry::new()),
            resource: None,
            reporting_period: config.reporting_period(),
            state: StatsState::Running,
        }
    }

    /// Exports to the given registry instead of a private one.
    pub fn with_exporters(mut self, exporters: Arc<ExporterRegistry>) -> Self {
        self.exporters = exporters;
        self
    }

    /// Returns the registry this service exports to.
    ///
    /// Exporters can be added and removed at any time, including while the service is running.
    pub fn exporters(&self) -> Arc<ExporterRegistry> {
        self.exporters.clone()
    }

    fn handle_register_measure(&mut self, measure: Measure) -> Result<(), StatsError> {
        if self.measures.contains_key(measure.name()) {
            return Err(StatsError::MeasureAlreadyRegistered(
                measure.name().to_owned(),
            ));
        }

        census_log::debug!("registered measure {}", measure.name());
        self.measures.insert(measure.name().to_owned(), measure);
        Ok(())
    }

    fn handle_unregister_measure(&mut self, name: String) -> Result<(), StatsError> {
        if !self.measures.contains_key(&name) {
            return Err(StatsError::MeasureNotFound(name));
        }

        if self.subscriptions.contains_key(&name) {
            return Err(StatsError::MeasureInUse(name));
        }

        self.measures.remove(&name);
        Ok(())
    }

    fn handle_register_views(&mut self, views: Vec<View>) -> Result<(), StatsError> {
        let mut resubscribe = Vec::new();
        let mut pending: Vec<View> = Vec::new();

        for mut view in views {
            view.canonicalize()?;

            if let Some(existing) = self.views.get(&view.name) {
                if !existing.view().same_as(&view) {
                    return Err(StatsError::ViewConflict(view.name));
                }
                resubscribe.push(view.name);
                continue;
            }

            if let Some(other) = pending.iter().find(|other| other.name == view.name) {
                if !other.same_as(&view) {
                    return Err(StatsError::ViewConflict(view.name));
                }
                continue;
            }

            let name = view.measure.name();
            let measure = self
                .measures
                .get(name)
                .or_else(|| pending.iter().map(|v| &v.measure).find(|m| m.name() == name));
            if measure.is_some_and(|measure| *measure != view.measure) {
                return Err(StatsError::MeasureAlreadyRegistered(name.to_owned()));
            }

            pending.push(view);
        }

        let now = Utc::now();
        for name in resubscribe {
            if let Some(view) = self.views.get_mut(&name) {
                view.subscribe(now);
            }
        }

        for view in pending {
            let measure = view.measure.name().to_owned();
            self.measures
                .entry(measure.clone())
                .or_insert_with(|| view.measure.clone());
            self.subscriptions
                .entry(measure)
                .or_default()
                .insert(view.name.clone());

            census_log::debug!("registered view {}", view.name);
            self.views
                .insert(view.name.clone(), RegisteredView::new(view, now));
        }

        Ok(())
    }

    fn handle_unregister_views(&mut self, names: Vec<String>) {
        for name in names {
            let Some(mut registered) = self.views.remove(&name) else {
                continue;
            };

            registered.unsubscribe();

            let measure = registered.view().measure.name();
            let Some(views) = self.subscriptions.get_mut(measure) else {
                panic!("view {name:?} is missing from the index of measure {measure:?}");
            };

            views.remove(&name);
            if views.is_empty() {
                self.subscriptions.remove(measure);
            }

            census_log::debug!("unregistered view {name}");
        }
    }

    fn handle_subscribe(&mut self, name: String) -> Result<(), StatsError> {
        match self.views.get_mut(&name) {
            Some(view) => {
                if view.subscribe(Utc::now()) {
                    census_log::debug!("subscribed view {name}");
                }
                Ok(())
            }
            None => Err(StatsError::ViewNotFound(name)),
        }
    }

    fn handle_unsubscribe(&mut self, name: String) -> Result<(), StatsError> {
        match self.views.get_mut(&name) {
            Some(view) => {
                view.unsubscribe();
                Ok(())
            }
            None => Err(StatsError::ViewNotFound(name)),
        }
    }

    fn handle_record(&mut self, record: Record) {
        let Record {
            tags,
            measurements,
            attachments,
            timestamp,
        } = record;

        for measurement in measurements {
            let measure = measurement.measure().name();
            let Some(names) = self.subscriptions.get(measure) else {
                census_log::trace!("dropping measurement of {measure} without views");
                continue;
            };

            for name in names {
                let Some(view) = self.views.get_mut(name) else {
                    panic!("measure {measure:?} refers to unknown view {name:?}");
                };
                view.add_sample(&tags, measurement.value(), &attachments, timestamp);
            }
        }
    }

    fn handle_retrieve_data(&self, name: String) -> Result<Vec<Row>, StatsError> {
        match self.views.get(&name) {
            Some(view) if view.is_subscribed() => Ok(view.snapshot_rows()),
            Some(_) => Err(StatsError::NotSubscribed(name)),
            None => Err(StatsError::ViewNotFound(name)),
        }
    }

    fn handle_read_metrics(&self) -> Vec<Metric> {
        let now = Utc::now();
        self.views
            .values()
            .filter(|view| view.is_subscribed())
            .map(|view| view_to_metric(view, now, self.resource.as_ref()))
            .collect()
    }

    /// Hands a snapshot of every subscribed view to the exporters.
    fn export_views(&self) {
        if self.exporters.is_empty() {
            return;
        }

        let end = Utc::now();
        for view in self.views.values().filter(|view| view.is_subscribed()) {
            let data = ViewData {
                view: view.view().clone(),
                start: view.start(),
                end,
                rows: view.snapshot_rows(),
            };
            self.exporters.dispatch(&data);
        }
    }

    fn handle_message(&mut self, message: Stats) {
        census_log::trace!("stats service received {}", message.variant());

        match message {
            Stats::RegisterMeasure(RegisterMeasure(measure), sender) => {
                sender.send(self.handle_register_measure(measure))
            }
            Stats::UnregisterMeasure(UnregisterMeasure(name), sender) => {
                sender.send(self.handle_unregister_measure(name))
            }
            Stats::RegisterViews(RegisterViews(views), sender) => {
                sender.send(self.handle_register_views(views))
            }
            Stats::UnregisterViews(UnregisterViews(names), sender) => {
                self.handle_unregister_views(names);
                sender.send(())
            }
            Stats::Subscribe(Subscribe(name), sender) => sender.send(self.handle_subscribe(name)),
            Stats::Unsubscribe(Unsubscribe(name), sender) => {
                sender.send(self.handle_unsubscribe(name))
            }
            Stats::Record(record) => self.handle_record(record),
            Stats::RetrieveData(RetrieveData(name), sender) => {
                sender.send(self.handle_retrieve_data(name))
            }
            Stats::FindView(FindView(name), sender) => {
                sender.send(self.views.get(&name).map(|view| view.view().clone()))
            }
            Stats::SetReportingPeriod(SetReportingPeriod(period), sender) => {
                self.reporting_period = reporting_period(period);
                sender.send(())
            }
            Stats::SetResource(SetResource(resource)) => self.resource = resource,
            Stats::ReadMetrics(_, sender) => sender.send(self.handle_read_metrics()),
            Stats::Stop(_, sender) => {
                self.export_views();
                self.state = StatsState::Stopped;
                sender.send(())
            }
        }
    }
}

fn reporting_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl Service for StatsService {
    type Interface = Stats;

    fn spawn_handler(mut self, mut rx: Receiver<Self::Interface>) {
        tokio::spawn(async move {
            let mut ticker = reporting_ticker(self.reporting_period);
            census_log::info!("stats service started");

            loop {
                tokio::select! {
                    biased;

                    _ = ticker.tick() => self.export_views(),
                    message = rx.recv() => match message {
                        Some(message) => self.handle_message(message),
                        None => {
                            census_log::debug!("all stats handles dropped");
                            self.export_views();
                            break;
                        }
                    },
                }

                if let StatsState::Stopped = self.state {
                    break;
                }

                if ticker.period() != self.reporting_period {
                    ticker = reporting_ticker(self.reporting_period);
                }
            }

            rx.close();
            census_log::info!("stats service stopped");
        });
    }
}

impl Drop for StatsService {
    fn drop(&mut self) {
        let rows: usize = self.views.values().map(RegisteredView::row_count).sum();
        if rows > 0 {
            census_log::debug!("stats service dropping {rows} rows");
        }
    }
}

#[cfg(test)]
mod tests {
    use census_metrics::Value;
    use census_tags::{Key, Mutator, Tag};
    use parking_lot::Mutex;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::aggregation::{Aggregation, AggregationData, CountData, SumData};
    use crate::export::Exporter;
    use crate::handle::{RecordOptions, StatsHandle};
    use crate::measure::{UNIT_BYTES, UNIT_MILLISECONDS};

    fn latency() -> Measure {
        Measure::float64("latency", "Request latency", UNIT_MILLISECONDS).unwrap()
    }

    fn key(name: &str) -> Key {
        Key::new(name).unwrap()
    }

    fn tags(pairs: &[(&str, &str)]) -> TagMap {
        TagMap::new(
            pairs
                .iter()
                .map(|(name, value)| Mutator::upsert(key(name), *value)),
        )
        .unwrap()
    }

    fn start() -> StatsHandle {
        StatsHandle::start(StatsService::new(&StatsConfig::default()))
    }

    #[derive(Default)]
    struct Capture(Mutex<Vec<ViewData>>);

    impl Exporter for Capture {
        fn export_view(&self, data: &ViewData) {
            self.0.lock().push(data.clone());
        }
    }

    #[tokio::test]
    async fn test_register_views_idempotent() {
        census_test::setup();
        let stats = start();

        let view = View::new("latency_count", latency(), Aggregation::Count)
            .with_tag_keys([key("b"), key("a")]);
        let same = View::new("latency_count", latency(), Aggregation::Count)
            .with_tag_keys([key("a"), key("b"), key("a")]);

        stats.register_views([view]).await.unwrap();
        stats.register_views([same]).await.unwrap();

        let found = stats.find_view("latency_count").await.unwrap().unwrap();
        assert_eq!(found.tag_keys, vec![key("a"), key("b")]);
        assert_eq!(found.description, "Request latency");
    }

    #[tokio::test]
    async fn test_register_views_conflict() {
        census_test::setup();
        let stats = start();

        stats
            .register_views([View::new("v", latency(), Aggregation::Count)])
            .await
            .unwrap();

        let result = stats
            .register_views([View::new("v", latency(), Aggregation::Sum)])
            .await;
        assert_eq!(result, Err(StatsError::ViewConflict("v".to_owned())));

        let found = stats.find_view("v").await.unwrap().unwrap();
        assert_eq!(found.aggregation, Aggregation::Count);
    }

    #[tokio::test]
    async fn test_register_views_all_or_nothing() {
        census_test::setup();
        let stats = start();

        let result = stats
            .register_views([
                View::new("good", latency(), Aggregation::Count),
                View::new("bad", latency(), Aggregation::distribution([2.0, 1.0])),
            ])
            .await;

        assert!(matches!(
            result,
            Err(StatsError::InvalidAggregation { ref view, .. }) if view == "bad"
        ));
        assert_eq!(stats.find_view("good").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_measure_registration() {
        census_test::setup();
        let stats = start();

        stats.register_measure(latency()).await.unwrap();
        assert_eq!(
            stats.register_measure(latency()).await,
            Err(StatsError::MeasureAlreadyRegistered("latency".to_owned()))
        );

        // A different measure under an existing name cannot be used in views.
        let other = Measure::int64("latency", "", UNIT_BYTES).unwrap();
        let result = stats
            .register_views([View::new("v", other, Aggregation::Count)])
            .await;
        assert_eq!(
            result,
            Err(StatsError::MeasureAlreadyRegistered("latency".to_owned()))
        );

        stats
            .register_views([View::new("v", latency(), Aggregation::Count)])
            .await
            .unwrap();
        assert_eq!(
            stats.unregister_measure("latency").await,
            Err(StatsError::MeasureInUse("latency".to_owned()))
        );

        stats.unregister_views(["v"]).await.unwrap();
        stats.unregister_measure("latency").await.unwrap();
        assert_eq!(
            stats.unregister_measure("latency").await,
            Err(StatsError::MeasureNotFound("latency".to_owned()))
        );
    }

    #[tokio::test]
    async fn test_read_after_write_grouped() {
        census_test::setup();
        let stats = start();
        let measure = latency();

        stats
            .register_views([View::new("latency_sum", measure.clone(), Aggregation::Sum)
                .with_tag_keys([key("method")])])
            .await
            .unwrap();

        stats.record(&tags(&[("method", "GET")]), [measure.m(1.0)]);
        stats.record(&tags(&[("method", "GET"), ("route", "/")]), [measure.m(2.0)]);
        stats.record(&tags(&[("method", "POST")]), [measure.m(4.0)]);
        stats.record(&TagMap::empty(), [measure.m(8.0)]);

        let rows = stats.retrieve_data("latency_sum").await.unwrap();
        assert_eq!(
            rows,
            vec![
                Row {
                    tags: vec![],
                    data: AggregationData::Sum(SumData { value: 8.0 }),
                },
                Row {
                    tags: vec![Tag::new(key("method"), "GET")],
                    data: AggregationData::Sum(SumData { value: 3.0 }),
                },
                Row {
                    tags: vec![Tag::new(key("method"), "POST")],
                    data: AggregationData::Sum(SumData { value: 4.0 }),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_group_by_multiple_keys() {
        census_test::setup();
        let stats = start();
        let measure = latency();

        stats
            .register_views([
                View::new("by_method", measure.clone(), Aggregation::Count)
                    .with_tag_keys([key("method")]),
                View::new("by_method_route", measure.clone(), Aggregation::Count)
                    .with_tag_keys([key("route"), key("method")]),
            ])
            .await
            .unwrap();

        stats.record(&tags(&[("method", "GET")]), [measure.m(1.0)]);
        stats.record(&tags(&[("method", "GET"), ("route", "/")]), [measure.m(1.0)]);

        let rows = stats.retrieve_data("by_method").await.unwrap();
        assert_eq!(
            rows,
            vec![Row {
                tags: vec![Tag::new(key("method"), "GET")],
                data: AggregationData::Count(CountData { value: 2 }),
            }]
        );

        let rows = stats.retrieve_data("by_method_route").await.unwrap();
        assert_eq!(
            rows,
            vec![
                Row {
                    tags: vec![Tag::new(key("method"), "GET")],
                    data: AggregationData::Count(CountData { value: 1 }),
                },
                Row {
                    tags: vec![
                        Tag::new(key("method"), "GET"),
                        Tag::new(key("route"), "/"),
                    ],
                    data: AggregationData::Count(CountData { value: 1 }),
                },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_recording() {
        census_test::setup();
        let stats = start();
        let measure = latency();

        stats
            .register_views([View::new("count", measure.clone(), Aggregation::Count)])
            .await
            .unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                let measure = measure.clone();
                tokio::spawn(async move {
                    for _ in 0..1_000 {
                        stats.record(&TagMap::empty(), [measure.m(1.0)]);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let rows = stats.retrieve_data("count").await.unwrap();
        assert_eq!(
            rows[0].data,
            AggregationData::Count(CountData { value: 8_000 })
        );
    }

    #[tokio::test]
    async fn test_distribution_scenario() {
        census_test::setup();
        let stats = start();
        let measure = latency();

        stats
            .register_views([
                View::new("dist", measure.clone(), Aggregation::distribution([2.0])),
                View::new("sum", measure.clone(), Aggregation::Sum),
                View::new("count", measure.clone(), Aggregation::Count),
            ])
            .await
            .unwrap();

        stats.record(&TagMap::empty(), [measure.m(1.0)]);
        stats.record(&TagMap::empty(), [measure.m(5.0)]);

        let rows = stats.retrieve_data("dist").await.unwrap();
        let AggregationData::Distribution(data) = &rows[0].data else {
            panic!("expected distribution");
        };
        assert_eq!(data.count, 2);
        assert_eq!(data.min, 1.0);
        assert_eq!(data.max, 5.0);
        assert_eq!(data.mean, 3.0);
        assert_eq!(data.count_per_bucket, vec![1, 1]);

        let rows = stats.retrieve_data("sum").await.unwrap();
        assert_eq!(rows[0].data, AggregationData::Sum(SumData { value: 6.0 }));

        let rows = stats.retrieve_data("count").await.unwrap();
        assert_eq!(rows[0].data, AggregationData::Count(CountData { value: 2 }));
    }

    #[tokio::test]
    async fn test_unsubscribed_view_collects_nothing() {
        census_test::setup();
        let stats = start();
        let measure = latency();

        stats
            .register_views([View::new("count", measure.clone(), Aggregation::Count)])
            .await
            .unwrap();
        stats.record(&TagMap::empty(), [measure.m(1.0)]);
        stats.unsubscribe("count").await.unwrap();
        stats.record(&TagMap::empty(), [measure.m(1.0)]);

        assert_eq!(
            stats.retrieve_data("count").await,
            Err(StatsError::NotSubscribed("count".to_owned()))
        );

        stats.subscribe("count").await.unwrap();
        assert_eq!(stats.retrieve_data("count").await, Ok(vec![]));

        stats.record(&TagMap::empty(), [measure.m(1.0)]);
        let rows = stats.retrieve_data("count").await.unwrap();
        assert_eq!(rows[0].data, AggregationData::Count(CountData { value: 1 }));
    }

    #[tokio::test]
    async fn test_retrieved_rows_are_snapshots() {
        census_test::setup();
        let stats = start();
        let measure = latency();

        stats
            .register_views([View::new("count", measure.clone(), Aggregation::Count)])
            .await
            .unwrap();

        stats.record(&TagMap::empty(), [measure.m(1.0)]);
        let before = stats.retrieve_data("count").await.unwrap();
        stats.record(&TagMap::empty(), [measure.m(1.0)]);
        let after = stats.retrieve_data("count").await.unwrap();

        assert_eq!(before[0].data, AggregationData::Count(CountData { value: 1 }));
        assert_eq!(after[0].data, AggregationData::Count(CountData { value: 2 }));
    }

    #[tokio::test]
    async fn test_dropped_measurements() {
        census_test::setup();
        let stats = start();
        let registered = latency();
        let unknown = Measure::int64("unknown", "", UNIT_BYTES).unwrap();

        stats
            .register_views([View::new("count", registered.clone(), Aggregation::Count)])
            .await
            .unwrap();

        stats.record(&TagMap::empty(), [unknown.m_int(1), registered.m(1.0)]);
        let rows = stats.retrieve_data("count").await.unwrap();
        assert_eq!(rows[0].data, AggregationData::Count(CountData { value: 1 }));
    }

    #[tokio::test]
    async fn test_unknown_view() {
        census_test::setup();
        let stats = start();

        assert_eq!(
            stats.retrieve_data("missing").await,
            Err(StatsError::ViewNotFound("missing".to_owned()))
        );
        assert_eq!(
            stats.subscribe("missing").await,
            Err(StatsError::ViewNotFound("missing".to_owned()))
        );
        assert_eq!(stats.find_view("missing").await, Ok(None));

        // Unknown names are ignored when unregistering.
        stats.unregister_views(["missing"]).await.unwrap();
    }

    #[tokio::test]
    async fn test_unregister_discards_data() {
        census_test::setup();
        let stats = start();
        let measure = latency();
        let view = View::new("count", measure.clone(), Aggregation::Count);

        stats.register_views([view.clone()]).await.unwrap();
        stats.record(&TagMap::empty(), [measure.m(1.0)]);
        stats.unregister_views(["count"]).await.unwrap();

        assert_eq!(
            stats.retrieve_data("count").await,
            Err(StatsError::ViewNotFound("count".to_owned()))
        );

        stats.register_views([view]).await.unwrap();
        assert_eq!(stats.retrieve_data("count").await, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_resubscribe_resets_start_time() {
        census_test::setup();
        let stats = start();
        let measure = latency();

        stats
            .register_views([View::new("count", measure.clone(), Aggregation::Count)])
            .await
            .unwrap();
        stats.record(&TagMap::empty(), [measure.m(1.0)]);
        let metrics = stats.read_metrics().await.unwrap();
        let first = metrics[0].time_series[0].start_time.unwrap();

        stats.unsubscribe("count").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        stats.subscribe("count").await.unwrap();

        stats.record(&TagMap::empty(), [measure.m(1.0)]);
        let metrics = stats.read_metrics().await.unwrap();
        let series = &metrics[0].time_series[0];
        assert!(series.start_time.unwrap() > first);
        assert_eq!(series.points[0].value, Value::Int64(1));
    }

    #[tokio::test]
    async fn test_record_options() {
        census_test::setup();
        let stats = start();
        let measure = latency();

        stats
            .register_views([View::new("dist", measure.clone(), Aggregation::distribution(Vec::new()))
                .with_tag_keys([key("method"), key("route")])])
            .await
            .unwrap();

        let timestamp = Utc::now() - chrono::Duration::seconds(30);
        stats.record_with_options(
            RecordOptions::new()
                .with_tags(tags(&[("method", "GET")]))
                .with_mutators([Mutator::insert(key("route"), "/users")])
                .with_attachments([("trace_id".to_owned(), "abc".to_owned())])
                .with_timestamp(timestamp)
                .with_measurements([measure.m(3.0)]),
        );

        // Invalid mutators drop the whole record.
        stats.record_with_options(
            RecordOptions::new()
                .with_mutators([Mutator::insert(key("route"), "\u{0}")])
                .with_measurements([measure.m(3.0)]),
        );

        let rows = stats.retrieve_data("dist").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].tags,
            vec![
                Tag::new(key("method"), "GET"),
                Tag::new(key("route"), "/users"),
            ]
        );

        let AggregationData::Distribution(data) = &rows[0].data else {
            panic!("expected distribution");
        };
        let exemplar = data.exemplars_per_bucket[0].as_ref().unwrap();
        assert_eq!(exemplar.timestamp, timestamp);
        assert_eq!(exemplar.attachments["trace_id"], "abc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_export() {
        census_test::setup();

        let service = StatsService::new(&StatsConfig {
            reporting_period_ms: 1_000,
        });
        let capture = Arc::new(Capture::default());
        service.exporters().register(capture.clone());
        let stats = StatsHandle::start(service);
        let measure = latency();

        stats
            .register_views([View::new("count", measure.clone(), Aggregation::Count)])
            .await
            .unwrap();
        stats.record(&TagMap::empty(), [measure.m(1.0)]);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        {
            let exported = capture.0.lock();
            assert_eq!(exported.len(), 2);
            assert_eq!(exported[1].view.name, "count");
            assert_eq!(exported[1].rows.len(), 1);
            assert!(exported[1].start <= exported[1].end);
        }

        // Views are not cleared between exports.
        stats.record(&TagMap::empty(), [measure.m(1.0)]);
        stats.stop().await.unwrap();

        let exported = capture.0.lock();
        assert_eq!(exported.len(), 3);
        assert_eq!(
            exported[2].rows[0].data,
            AggregationData::Count(CountData { value: 2 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_handles_dropped() {
        census_test::setup();

        let service = StatsService::new(&StatsConfig {
            reporting_period_ms: 1_000,
        });
        let capture = Arc::new(Capture::default());
        service.exporters().register(capture.clone());
        let stats = StatsHandle::start(service);
        let measure = latency();

        stats
            .register_views([View::new("count", measure.clone(), Aggregation::Count)])
            .await
            .unwrap();
        stats.record(&TagMap::empty(), [measure.m(1.0)]);
        drop(stats);

        tokio::time::sleep(Duration::from_millis(5_500)).await;

        // One final export of the remaining state, then nothing.
        let exported = capture.0.lock();
        assert_eq!(exported.len(), 1);
        assert_eq!(
            exported[0].rows[0].data,
            AggregationData::Count(CountData { value: 1 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_reporting_period() {
        census_test::setup();

        let service = StatsService::new(&StatsConfig::default());
        let capture = Arc::new(Capture::default());
        service.exporters().register(capture.clone());
        let stats = StatsHandle::start(service);
        let measure = latency();

        stats
            .register_views([View::new("count", measure.clone(), Aggregation::Count)])
            .await
            .unwrap();
        stats
            .set_reporting_period(Duration::from_secs(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(capture.0.lock().len(), 3);

        stats.set_reporting_period(Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(capture.0.lock().len(), 3);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(capture.0.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_stopped_service() {
        census_test::setup();
        let stats = start();

        stats.stop().await.unwrap();

        assert_eq!(
            stats.retrieve_data("count").await,
            Err(StatsError::Stopped)
        );
        assert_eq!(stats.register_measure(latency()).await, Err(StatsError::Stopped));
        stats.record(&TagMap::empty(), [latency().m(1.0)]);
    }
}
