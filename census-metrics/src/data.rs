use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Contextual information recorded alongside a measurement.
///
/// Attachments are never aggregated. They end up in [exemplars](Exemplar), for example to link a
/// histogram bucket to the trace that produced one of its samples.
pub type Attachments = BTreeMap<String, String>;

/// The kind of values in a [`Metric`] and how they relate over time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// An instantaneous integer value.
    GaugeInt64,
    /// An instantaneous floating point value.
    GaugeFloat64,
    /// An instantaneous histogram.
    GaugeDistribution,
    /// An integer accumulated since the series' start time.
    CumulativeInt64,
    /// A floating point value accumulated since the series' start time.
    CumulativeFloat64,
    /// A histogram accumulated since the series' start time.
    CumulativeDistribution,
}

impl MetricType {
    /// Returns `true` for cumulative types, whose time series carry a start time.
    pub fn is_cumulative(self) -> bool {
        matches!(
            self,
            Self::CumulativeInt64 | Self::CumulativeFloat64 | Self::CumulativeDistribution
        )
    }
}

/// The name and description of a label dimension.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LabelKey {
    /// The label name.
    pub key: String,
    /// A human readable description of the label.
    pub description: String,
}

impl LabelKey {
    /// Creates a label key without description.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
        }
    }
}

/// The value of a label in a time series.
///
/// `None` means the label is not set for this series, which is distinct from an empty value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelValue(pub Option<String>);

impl LabelValue {
    /// Creates a present label value.
    pub fn present(value: impl Into<String>) -> Self {
        Self(Some(value.into()))
    }

    /// Creates a missing label value.
    pub fn absent() -> Self {
        Self(None)
    }

    /// Returns the value if present.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Describes a [`Metric`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Descriptor {
    /// The unique metric name.
    pub name: String,
    /// A human readable description.
    pub description: String,
    /// The unit of the values, for example `"ms"` or `"By"`.
    pub unit: String,
    /// The type of the points in this metric.
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    /// The label dimensions. Each time series has one value per key, in the same order.
    pub label_keys: Vec<LabelKey>,
}

/// The monitored entity that produced a metric.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Resource {
    /// The type of the resource, for example `"host"` or `"k8s_container"`.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Labels identifying the resource.
    pub labels: BTreeMap<String, String>,
}

/// A sample drawn from the values aggregated into a histogram bucket.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Exemplar {
    /// The recorded value.
    pub value: f64,
    /// When the value was recorded.
    pub timestamp: DateTime<Utc>,
    /// Context recorded with the value.
    pub attachments: Attachments,
}

/// Bucket layout of a [`Distribution`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BucketOptions {
    /// Upper bounds of all buckets except the last one, which is unbounded.
    pub bounds: Vec<f64>,
}

/// A histogram bucket in a [`Distribution`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Bucket {
    /// The number of values in this bucket.
    pub count: i64,
    /// An optional sample value from this bucket.
    pub exemplar: Option<Exemplar>,
}

/// A histogram with summary statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Distribution {
    /// The number of values in the distribution.
    pub count: i64,
    /// The sum of all values.
    pub sum: f64,
    /// The sum of squared deviations from the mean.
    pub sum_of_squared_deviation: f64,
    /// The bucket layout.
    pub bucket_options: BucketOptions,
    /// One bucket per bound plus one for the overflow.
    pub buckets: Vec<Bucket>,
}

/// The value of a [`Point`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// An integer value.
    Int64(i64),
    /// A floating point value.
    Float64(f64),
    /// A histogram.
    Distribution(Distribution),
}

/// A single value at a point in time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Point {
    /// The time at which the value was observed.
    pub time: DateTime<Utc>,
    /// The observed value.
    pub value: Value,
}

impl Point {
    /// Creates an integer point.
    pub fn int64(time: DateTime<Utc>, value: i64) -> Self {
        Self {
            time,
            value: Value::Int64(value),
        }
    }

    /// Creates a floating point point.
    pub fn float64(time: DateTime<Utc>, value: f64) -> Self {
        Self {
            time,
            value: Value::Float64(value),
        }
    }

    /// Creates a distribution point.
    pub fn distribution(time: DateTime<Utc>, value: Distribution) -> Self {
        Self {
            time,
            value: Value::Distribution(value),
        }
    }
}

/// A sequence of points for one combination of label values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimeSeries {
    /// Label values, positionally matching [`Descriptor::label_keys`].
    pub label_values: Vec<LabelValue>,
    /// The points of this series.
    pub points: Vec<Point>,
    /// The start of the accumulation window for cumulative metrics.
    pub start_time: Option<DateTime<Utc>>,
}

/// A named set of time series.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Metric {
    /// Describes the metric and its time series.
    pub descriptor: Descriptor,
    /// The entity that produced this metric, if known.
    pub resource: Option<Resource>,
    /// All time series of this metric.
    pub time_series: Vec<TimeSeries>,
}
