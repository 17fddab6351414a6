use census_metrics::Attachments;
use census_tags::{Key, Tag};
use chrono::{DateTime, Utc};
use hashbrown::HashMap;

use crate::aggregation::{Aggregation, AggregationData};
use crate::signature;

/// Aggregation state of a single view, keyed by row signature.
///
/// Rows are created lazily on their first sample and only ever removed all at once.
#[derive(Clone, Debug)]
pub struct Collector {
    aggregation: Aggregation,
    rows: HashMap<Vec<u8>, AggregationData>,
}

impl Collector {
    /// Creates an empty collector that creates rows for `aggregation`.
    pub fn new(aggregation: Aggregation) -> Self {
        Self {
            aggregation,
            rows: HashMap::new(),
        }
    }

    /// Adds a sample to the row identified by `signature`.
    pub fn add_sample(
        &mut self,
        signature: &[u8],
        value: f64,
        attachments: &Attachments,
        timestamp: DateTime<Utc>,
    ) {
        let aggregation = &self.aggregation;
        self.rows
            .entry_ref(signature)
            .or_insert_with(|| aggregation.new_data())
            .add_sample(value, attachments, timestamp);
    }

    /// Iterates all rows with their tags decoded using `keys`.
    ///
    /// The data is borrowed; callers that hand it out must clone it.
    pub fn collected_rows<'a>(
        &'a self,
        keys: &'a [Key],
    ) -> impl Iterator<Item = (Vec<Tag>, &'a AggregationData)> + 'a {
        self.rows
            .iter()
            .map(move |(signature, data)| (signature::decode(signature, keys), data))
    }

    /// Removes all rows.
    pub fn clear_rows(&mut self) {
        self.rows.clear();
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
