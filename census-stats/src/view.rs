use census_metrics::Attachments;
use census_tags::{Key, Tag, TagMap};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregation::{Aggregation, AggregationData};
use crate::collector::Collector;
use crate::measure::{Measure, check_name};
use crate::{StatsError, signature};

/// Defines how values of a [`Measure`] are aggregated and grouped.
///
/// Every distinct combination of values for the view's `tag_keys` becomes a separate [`Row`].
/// A view without tag keys aggregates all values into a single row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct View {
    /// The unique name of the view. Defaults to the measure name if empty.
    pub name: String,
    /// A human readable description. Defaults to the measure description if empty.
    pub description: String,
    /// The tag keys to group by. Order and duplicates are irrelevant.
    pub tag_keys: Vec<Key>,
    /// The measure whose values are aggregated.
    pub measure: Measure,
    /// The aggregation function.
    pub aggregation: Aggregation,
}

impl View {
    /// Creates a view without tag keys and description.
    pub fn new(name: impl Into<String>, measure: Measure, aggregation: Aggregation) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tag_keys: Vec::new(),
            measure,
            aggregation,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the tag keys to group by.
    pub fn with_tag_keys(mut self, tag_keys: impl IntoIterator<Item = Key>) -> Self {
        self.tag_keys = tag_keys.into_iter().collect();
        self
    }

    /// Fills in defaults, validates the view and brings tag keys into canonical order.
    pub(crate) fn canonicalize(&mut self) -> Result<(), StatsError> {
        if self.name.is_empty() {
            self.name = self.measure.name().to_owned();
        }
        if self.description.is_empty() {
            self.description = self.measure.description().to_owned();
        }

        check_name(&self.name)?;

        self.aggregation
            .check()
            .map_err(|reason| StatsError::InvalidAggregation {
                view: self.name.clone(),
                reason,
            })?;

        self.tag_keys = census_tags::canonical_keys(std::mem::take(&mut self.tag_keys));
        Ok(())
    }

    /// Returns `true` if both canonical views aggregate the same data in the same way.
    ///
    /// Descriptions are not compared.
    pub(crate) fn same_as(&self, other: &View) -> bool {
        self.aggregation == other.aggregation
            && self.measure.name() == other.measure.name()
            && self.tag_keys == other.tag_keys
    }
}

/// Aggregated data for one combination of tag values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Row {
    /// The values of the view's tag keys, sorted by key. Keys without value are omitted.
    pub tags: Vec<Tag>,
    /// The aggregated values.
    pub data: AggregationData,
}

/// A view registered with the stats service, along with its aggregation state.
#[derive(Debug)]
pub(crate) struct RegisteredView {
    view: View,
    collector: Collector,
    subscribed: bool,
    start: DateTime<Utc>,
}

impl RegisteredView {
    /// Creates a subscribed view starting to collect at `start`.
    pub fn new(view: View, start: DateTime<Utc>) -> Self {
        let collector = Collector::new(view.aggregation.clone());
        Self {
            view,
            collector,
            subscribed: true,
            start,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    /// The time since which this view has been collecting.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Starts collecting. Returns `false` if the view was already subscribed.
    ///
    /// A view that was unsubscribed restarts from empty rows with `now` as its new start time.
    pub fn subscribe(&mut self, now: DateTime<Utc>) -> bool {
        if self.subscribed {
            return false;
        }

        self.subscribed = true;
        self.start = now;
        true
    }

    /// Stops collecting and discards all rows.
    pub fn unsubscribe(&mut self) {
        self.subscribed = false;
        self.collector.clear_rows();
    }

    /// Adds a sample for the given tags. Does nothing while unsubscribed.
    pub fn add_sample(
        &mut self,
        tags: &TagMap,
        value: f64,
        attachments: &Attachments,
        timestamp: DateTime<Utc>,
    ) {
        if !self.is_subscribed() {
            return;
        }

        let signature = signature::encode(tags, &self.view.tag_keys);
        self.collector
            .add_sample(&signature, value, attachments, timestamp);
    }

    pub fn row_count(&self) -> usize {
        self.collector.len()
    }

    /// Iterates rows without copying their data.
    pub fn rows(&self) -> impl Iterator<Item = (Vec<Tag>, &AggregationData)> + '_ {
        self.collector.collected_rows(&self.view.tag_keys)
    }

    /// Returns a deep copy of all rows, ordered by tags.
    pub fn snapshot_rows(&self) -> Vec<Row> {
        let mut rows: Vec<Row> = self
            .rows()
            .map(|(tags, data)| Row {
                tags,
                data: data.clone(),
            })
            .collect();

        rows.sort_by(|a, b| a.tags.cmp(&b.tags));
        rows
    }
}

#[cfg(test)]
mod tests {
    use census_tags::Mutator;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::aggregation::SumData;
    use crate::measure::UNIT_MILLISECONDS;

    fn latency() -> Measure {
        Measure::float64("latency", "Request latency", UNIT_MILLISECONDS).unwrap()
    }

    fn key(name: &str) -> Key {
        Key::new(name).unwrap()
    }

    #[test]
    fn test_canonicalize_defaults() {
        let mut view = View::new("", latency(), Aggregation::Count)
            .with_tag_keys([key("route"), key("method"), key("route")]);
        view.canonicalize().unwrap();

        assert_eq!(view.name, "latency");
        assert_eq!(view.description, "Request latency");
        assert_eq!(view.tag_keys, vec![key("method"), key("route")]);
    }

    #[test]
    fn test_canonicalize_rejects_invalid() {
        let mut view = View::new("bad\tname", latency(), Aggregation::Count);
        assert_eq!(
            view.canonicalize(),
            Err(StatsError::InvalidName("bad\tname".to_owned()))
        );

        let mut view = View::new("latency", latency(), Aggregation::distribution([5.0, 1.0]));
        assert_eq!(
            view.canonicalize(),
            Err(StatsError::InvalidAggregation {
                view: "latency".to_owned(),
                reason: "bucket boundaries must be non-decreasing",
            })
        );
    }

    #[test]
    fn test_same_as_ignores_key_order_and_description() {
        let mut a = View::new("v", latency(), Aggregation::Sum)
            .with_description("first")
            .with_tag_keys([key("a"), key("b")]);
        let mut b = View::new("v", latency(), Aggregation::Sum)
            .with_description("second")
            .with_tag_keys([key("b"), key("a")]);
        let mut c = View::new("v", latency(), Aggregation::Count);

        a.canonicalize().unwrap();
        b.canonicalize().unwrap();
        c.canonicalize().unwrap();

        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }

    #[test]
    fn test_unsubscribed_view_ignores_samples() {
        let method = key("method");
        let mut view = View::new("v", latency(), Aggregation::Sum).with_tag_keys([method.clone()]);
        view.canonicalize().unwrap();

        let start = Utc::now();
        let mut registered = RegisteredView::new(view, start);
        let tags = TagMap::new([Mutator::insert(method.clone(), "GET")]).unwrap();

        registered.add_sample(&tags, 2.0, &Attachments::new(), start);
        assert_eq!(
            registered.snapshot_rows(),
            vec![Row {
                tags: vec![Tag::new(method.clone(), "GET")],
                data: AggregationData::Sum(SumData { value: 2.0 }),
            }]
        );

        registered.unsubscribe();
        registered.add_sample(&tags, 2.0, &Attachments::new(), start);
        assert!(registered.snapshot_rows().is_empty());

        let later = start + chrono::Duration::seconds(5);
        assert!(registered.subscribe(later));
        assert!(!registered.subscribe(later + chrono::Duration::seconds(5)));
        assert_eq!(registered.start(), later);
        assert!(registered.snapshot_rows().is_empty());
    }
}
