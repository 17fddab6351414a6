use census_metrics::{Attachments, Exemplar};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The aggregation function applied to the values of a view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Aggregation {
    /// Counts the number of recorded values.
    Count,
    /// Sums up all recorded values.
    Sum,
    /// Keeps the most recently recorded value.
    LastValue,
    /// Keeps a histogram of recorded values with summary statistics.
    ///
    /// `N` boundaries result in `N + 1` buckets: `(-inf, b0]`, `(b0, b1]`, ..., `(bN-1, +inf)`.
    Distribution {
        /// Upper bounds of all buckets except the last one. Must be non-decreasing and finite.
        #[serde(default)]
        boundaries: Vec<f64>,
    },
}

impl Aggregation {
    /// Creates a distribution aggregation with the given bucket boundaries.
    pub fn distribution(boundaries: impl Into<Vec<f64>>) -> Self {
        Self::Distribution {
            boundaries: boundaries.into(),
        }
    }

    /// Returns a description of the problem if this aggregation cannot be used.
    pub(crate) fn check(&self) -> Result<(), &'static str> {
        let Self::Distribution { boundaries } = self else {
            return Ok(());
        };

        if boundaries.iter().any(|b| !b.is_finite()) {
            return Err("bucket boundaries must be finite");
        }

        if boundaries.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err("bucket boundaries must be non-decreasing");
        }

        Ok(())
    }

    /// Creates empty aggregation data for this aggregation.
    pub fn new_data(&self) -> AggregationData {
        match self {
            Self::Count => AggregationData::Count(CountData::default()),
            Self::Sum => AggregationData::Sum(SumData::default()),
            Self::LastValue => AggregationData::LastValue(LastValueData::default()),
            Self::Distribution { boundaries } => {
                AggregationData::Distribution(DistributionData::new(boundaries.clone()))
            }
        }
    }
}

/// The number of recorded values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CountData {
    /// The number of samples.
    pub value: i64,
}

/// The sum of recorded values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SumData {
    /// The running sum.
    pub value: f64,
}

/// The most recently recorded value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct LastValueData {
    /// The last value.
    pub value: f64,
}

/// A histogram of recorded values with summary statistics.
///
/// Mean and sum of squared deviations are maintained incrementally with Welford's method.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DistributionData {
    /// The number of samples.
    pub count: i64,
    /// The smallest sample, or `+inf` if there are none.
    pub min: f64,
    /// The largest sample, or `-inf` if there are none.
    pub max: f64,
    /// The arithmetic mean of all samples.
    pub mean: f64,
    /// The sum of squared deviations from the mean.
    pub sum_of_squared_dev: f64,
    /// The number of samples per bucket, one more than there are boundaries.
    pub count_per_bucket: Vec<i64>,
    /// An optional sample value per bucket.
    pub exemplars_per_bucket: Vec<Option<Exemplar>>,
    boundaries: Vec<f64>,
}

impl DistributionData {
    fn new(boundaries: Vec<f64>) -> Self {
        let buckets = boundaries.len() + 1;
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            mean: 0.0,
            sum_of_squared_dev: 0.0,
            count_per_bucket: vec![0; buckets],
            exemplars_per_bucket: vec![None; buckets],
            boundaries,
        }
    }

    /// Returns the bucket boundaries of this distribution.
    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// Returns the sum of all samples.
    pub fn sum(&self) -> f64 {
        self.mean * self.count as f64
    }

    /// Returns the sample variance, or `0` if there are fewer than two samples.
    pub fn variance(&self) -> f64 {
        if self.count <= 1 {
            return 0.0;
        }
        self.sum_of_squared_dev / (self.count - 1) as f64
    }

    fn bucket_index(&self, value: f64) -> usize {
        self.boundaries
            .iter()
            .position(|&bound| value <= bound)
            .unwrap_or(self.boundaries.len())
    }

    /// Adds a sample and updates the exemplar of its bucket.
    ///
    /// The sample becomes the bucket's exemplar unless the current exemplar carries more
    /// attachments. On equal counts, including samples without attachments, the most recent
    /// sample wins.
    fn add_sample(&mut self, value: f64, attachments: &Attachments, timestamp: DateTime<Utc>) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.sum_of_squared_dev += delta * (value - self.mean);

        let index = self.bucket_index(value);
        self.count_per_bucket[index] += 1;

        let slot = &mut self.exemplars_per_bucket[index];
        let replace = match slot {
            None => true,
            Some(existing) => existing.attachments.len() <= attachments.len(),
        };

        if replace {
            *slot = Some(Exemplar {
                value,
                timestamp,
                attachments: attachments.clone(),
            });
        }
    }

    fn delta(&self, previous: &Self) -> Option<Self> {
        if self.count_per_bucket.len() != previous.count_per_bucket.len() {
            return None;
        }

        let count = self.count - previous.count;
        let count_per_bucket = self
            .count_per_bucket
            .iter()
            .zip(&previous.count_per_bucket)
            .map(|(current, previous)| current - previous)
            .collect();

        let (mean, sum_of_squared_dev) = if count > 0 {
            let mean = (self.sum() - previous.sum()) / count as f64;
            // Reverses the merge of two partial aggregates:
            // M2 = M2_a + M2_b + (mean_b - mean_a)^2 * n_a * n_b / n
            let correction = (mean - previous.mean).powi(2)
                * (previous.count as f64 * count as f64)
                / self.count as f64;
            let m2 = self.sum_of_squared_dev - previous.sum_of_squared_dev - correction;
            (mean, m2.max(0.0))
        } else {
            (0.0, 0.0)
        };

        Some(Self {
            count,
            min: self.min,
            max: self.max,
            mean,
            sum_of_squared_dev,
            count_per_bucket,
            exemplars_per_bucket: self.exemplars_per_bucket.clone(),
            boundaries: self.boundaries.clone(),
        })
    }
}

/// Aggregated values of a single row in a view.
///
/// The variant is determined by the view's [`Aggregation`]. Cloning creates a fully independent
/// copy, so snapshots are never affected by values recorded later.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationData {
    /// See [`Aggregation::Count`].
    Count(CountData),
    /// See [`Aggregation::Sum`].
    Sum(SumData),
    /// See [`Aggregation::LastValue`].
    LastValue(LastValueData),
    /// See [`Aggregation::Distribution`].
    Distribution(DistributionData),
}

impl AggregationData {
    /// Adds a single sample in place.
    ///
    /// Attachments and timestamp are only used for distribution exemplars.
    pub fn add_sample(&mut self, value: f64, attachments: &Attachments, timestamp: DateTime<Utc>) {
        match self {
            Self::Count(data) => data.value += 1,
            Self::Sum(data) => data.value += value,
            Self::LastValue(data) => data.value = value,
            Self::Distribution(data) => data.add_sample(value, attachments, timestamp),
        }
    }

    /// Returns the difference between this data and a previous snapshot of the same row.
    ///
    /// Counts and sums are subtracted, last values are returned as is. For distributions, counts,
    /// bucket counts and sums are subtracted and the sum of squared deviations is recomputed for
    /// the samples added since `previous`. Minimum, maximum and exemplars are taken from `self`.
    ///
    /// Returns `None` if `previous` has a different variant or bucket layout.
    pub fn delta(&self, previous: &Self) -> Option<Self> {
        Some(match (self, previous) {
            (Self::Count(current), Self::Count(previous)) => Self::Count(CountData {
                value: current.value - previous.value,
            }),
            (Self::Sum(current), Self::Sum(previous)) => Self::Sum(SumData {
                value: current.value - previous.value,
            }),
            (Self::LastValue(current), Self::LastValue(_)) => Self::LastValue(*current),
            (Self::Distribution(current), Self::Distribution(previous)) => {
                Self::Distribution(current.delta(previous)?)
            }
            _ => return None,
        })
    }

    /// Dispatches to the visitor method matching this variant.
    pub fn accept<V: AggregationDataVisitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Self::Count(data) => visitor.visit_count(data),
            Self::Sum(data) => visitor.visit_sum(data),
            Self::LastValue(data) => visitor.visit_last_value(data),
            Self::Distribution(data) => visitor.visit_distribution(data),
        }
    }
}

/// Operates on [`AggregationData`] without matching on its variants.
pub trait AggregationDataVisitor {
    /// The result of visiting.
    type Output;

    /// Visits count data.
    fn visit_count(&mut self, data: &CountData) -> Self::Output;

    /// Visits sum data.
    fn visit_sum(&mut self, data: &SumData) -> Self::Output;

    /// Visits last value data.
    fn visit_last_value(&mut self, data: &LastValueData) -> Self::Output;

    /// Visits distribution data.
    fn visit_distribution(&mut self, data: &DistributionData) -> Self::Output;
}
