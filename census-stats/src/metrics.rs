//! Conversion of views into the generic [`census_metrics`] model.

use census_metrics::{
    Bucket, BucketOptions, Descriptor, Distribution, LabelKey, LabelValue, Metric, MetricType,
    Point, Resource, TimeSeries,
};
use census_tags::Tag;
use chrono::{DateTime, Utc};

use crate::aggregation::{
    Aggregation, AggregationDataVisitor, CountData, DistributionData, LastValueData, SumData,
};
use crate::measure::MeasureKind;
use crate::view::{RegisteredView, View};

/// Returns the metric type a view is exported as.
pub fn metric_type(view: &View) -> MetricType {
    let kind = view.measure.kind();
    match view.aggregation {
        Aggregation::Count => MetricType::CumulativeInt64,
        Aggregation::Sum => match kind {
            MeasureKind::Int64 => MetricType::CumulativeInt64,
            MeasureKind::Float64 => MetricType::CumulativeFloat64,
        },
        Aggregation::Distribution { .. } => MetricType::CumulativeDistribution,
        Aggregation::LastValue => match kind {
            MeasureKind::Int64 => MetricType::GaugeInt64,
            MeasureKind::Float64 => MetricType::GaugeFloat64,
        },
    }
}

/// Builds the point for a single row.
struct PointBuilder {
    time: DateTime<Utc>,
    kind: MeasureKind,
}

impl PointBuilder {
    fn scalar(&self, value: f64) -> Point {
        match self.kind {
            MeasureKind::Int64 => Point::int64(self.time, value as i64),
            MeasureKind::Float64 => Point::float64(self.time, value),
        }
    }
}

impl AggregationDataVisitor for PointBuilder {
    type Output = Point;

    fn visit_count(&mut self, data: &CountData) -> Point {
        Point::int64(self.time, data.value)
    }

    fn visit_sum(&mut self, data: &SumData) -> Point {
        self.scalar(data.value)
    }

    fn visit_last_value(&mut self, data: &LastValueData) -> Point {
        self.scalar(data.value)
    }

    fn visit_distribution(&mut self, data: &DistributionData) -> Point {
        let buckets = data
            .count_per_bucket
            .iter()
            .zip(&data.exemplars_per_bucket)
            .map(|(&count, exemplar)| Bucket {
                count,
                exemplar: exemplar.clone(),
            })
            .collect();

        Point::distribution(
            self.time,
            Distribution {
                count: data.count,
                sum: data.sum(),
                sum_of_squared_deviation: data.sum_of_squared_dev,
                bucket_options: BucketOptions {
                    bounds: data.boundaries().to_vec(),
                },
                buckets,
            },
        )
    }
}

fn label_values(view: &View, tags: &[Tag]) -> Vec<LabelValue> {
    view.tag_keys
        .iter()
        .map(|key| match tags.iter().find(|tag| &tag.key == key) {
            Some(tag) => LabelValue::present(tag.value.clone()),
            None => LabelValue::absent(),
        })
        .collect()
}

/// Converts the current state of a registered view into a metric.
///
/// Cumulative metrics carry the view's start time on every series. Series are ordered by their
/// label values.
pub(crate) fn view_to_metric(
    registered: &RegisteredView,
    now: DateTime<Utc>,
    resource: Option<&Resource>,
) -> Metric {
    let view = registered.view();
    let metric_type = metric_type(view);
    let start_time = metric_type.is_cumulative().then(|| registered.start());

    let mut builder = PointBuilder {
        time: now,
        kind: view.measure.kind(),
    };

    let mut rows: Vec<_> = registered.rows().collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    let time_series = rows
        .into_iter()
        .map(|(tags, data)| TimeSeries {
            label_values: label_values(view, &tags),
            points: vec![data.accept(&mut builder)],
            start_time,
        })
        .collect();

    Metric {
        descriptor: Descriptor {
            name: view.name.clone(),
            description: view.description.clone(),
            unit: view.measure.unit().to_owned(),
            metric_type,
            label_keys: view
                .tag_keys
                .iter()
                .map(|key| LabelKey::new(key.name()))
                .collect(),
        },
        resource: resource.cloned(),
        time_series,
    }
}

#[cfg(test)]
mod tests {
    use census_metrics::{Attachments, Value};
    use census_tags::{Key, Mutator, TagMap};
    use chrono::TimeZone;

    use super::*;
    use crate::measure::{Measure, UNIT_BYTES, UNIT_MILLISECONDS};

    fn time(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, secs).unwrap()
    }

    fn registered(measure: Measure, aggregation: Aggregation) -> RegisteredView {
        let mut view = View::new("", measure, aggregation)
            .with_tag_keys([Key::new("method").unwrap(), Key::new("route").unwrap()]);
        view.canonicalize().unwrap();
        RegisteredView::new(view, time(0))
    }

    fn record(view: &mut RegisteredView, method: Option<&str>, value: f64) {
        let mutators = method.map(|m| Mutator::insert(Key::new("method").unwrap(), m));
        let tags = TagMap::new(mutators).unwrap();
        view.add_sample(&tags, value, &Attachments::new(), time(1));
    }

    #[test]
    fn test_metric_types() {
        let int = Measure::int64("size", "", UNIT_BYTES).unwrap();
        let float = Measure::float64("latency", "", UNIT_MILLISECONDS).unwrap();

        let cases = [
            (&int, Aggregation::Count, MetricType::CumulativeInt64),
            (&float, Aggregation::Count, MetricType::CumulativeInt64),
            (&int, Aggregation::Sum, MetricType::CumulativeInt64),
            (&float, Aggregation::Sum, MetricType::CumulativeFloat64),
            (&int, Aggregation::LastValue, MetricType::GaugeInt64),
            (&float, Aggregation::LastValue, MetricType::GaugeFloat64),
            (
                &float,
                Aggregation::distribution([1.0]),
                MetricType::CumulativeDistribution,
            ),
        ];

        for (measure, aggregation, expected) in cases {
            let view = View::new("v", measure.clone(), aggregation);
            assert_eq!(metric_type(&view), expected);
        }
    }

    #[test]
    fn test_sum_to_metric() {
        let measure = Measure::int64("size", "Response size", UNIT_BYTES).unwrap();
        let mut view = registered(measure, Aggregation::Sum);
        record(&mut view, Some("GET"), 10.0);
        record(&mut view, Some("GET"), 5.0);
        record(&mut view, None, 1.0);

        let metric = view_to_metric(&view, time(2), None);

        assert_eq!(metric.descriptor.name, "size");
        assert_eq!(metric.descriptor.unit, "By");
        assert_eq!(
            metric.descriptor.label_keys,
            vec![LabelKey::new("method"), LabelKey::new("route")]
        );
        assert_eq!(metric.time_series.len(), 2);

        let untagged = &metric.time_series[0];
        assert_eq!(
            untagged.label_values,
            vec![LabelValue::absent(), LabelValue::absent()]
        );
        assert_eq!(untagged.points[0].value, Value::Int64(1));

        let get = &metric.time_series[1];
        assert_eq!(
            get.label_values,
            vec![LabelValue::present("GET"), LabelValue::absent()]
        );
        assert_eq!(get.points[0], Point::int64(time(2), 15));
        assert_eq!(get.start_time, Some(time(0)));
    }

    #[test]
    fn test_gauge_has_no_start_time() {
        let measure = Measure::float64("temperature", "", "Cel").unwrap();
        let mut view = registered(measure, Aggregation::LastValue);
        record(&mut view, None, 21.5);

        let metric = view_to_metric(&view, time(2), None);
        let series = &metric.time_series[0];
        assert_eq!(series.start_time, None);
        assert_eq!(series.points[0].value, Value::Float64(21.5));
    }

    #[test]
    fn test_distribution_to_metric() {
        let measure = Measure::float64("latency", "", UNIT_MILLISECONDS).unwrap();
        let mut view = registered(measure, Aggregation::distribution([2.0]));
        record(&mut view, None, 1.0);
        record(&mut view, None, 5.0);

        let resource = Resource {
            resource_type: "host".to_owned(),
            labels: [("hostname".to_owned(), "web-1".to_owned())].into(),
        };
        let metric = view_to_metric(&view, time(2), Some(&resource));
        assert_eq!(metric.resource, Some(resource));

        let Value::Distribution(distribution) = &metric.time_series[0].points[0].value else {
            panic!("expected distribution point");
        };
        assert_eq!(distribution.count, 2);
        assert_eq!(distribution.sum, 6.0);
        assert_eq!(distribution.sum_of_squared_deviation, 8.0);
        assert_eq!(distribution.bucket_options.bounds, vec![2.0]);
        let counts: Vec<_> = distribution.buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 1]);
    }
}
