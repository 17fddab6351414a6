use std::collections::BTreeMap;
use std::error::Error;
use std::io::{self, BufRead};

use census_stats::{Measure, StatsHandle};
use census_tags::{Key, Mutator, TagError, TagMap};
use serde::Deserialize;

/// A single measurement, as read from one line of replay input.
///
/// ```json
/// {"measure": "latency", "value": 12.5, "tags": {"route": "/users"}}
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MeasurementRecord {
    /// The name of a registered measure.
    pub measure: String,
    /// The recorded value.
    pub value: f64,
    /// Tags of the measurement.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl MeasurementRecord {
    fn tag_map(&self) -> Result<TagMap, TagError> {
        let mutators = self
            .tags
            .iter()
            .map(|(key, value)| Ok(Mutator::insert(Key::new(key)?, value.as_str())))
            .collect::<Result<Vec<_>, TagError>>()?;

        TagMap::new(mutators)
    }
}

/// Counters of a finished replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Records passed to the stats service.
    pub recorded: usize,
    /// Lines that were empty, malformed or referred to unknown measures.
    pub skipped: usize,
}

/// Records every line of `input` with the given stats service.
///
/// Lines that cannot be parsed or refer to a measure not in `measures` are logged and skipped.
/// Only failures to read the input abort the replay.
pub fn replay<R: BufRead>(
    input: R,
    stats: &StatsHandle,
    measures: &[Measure],
) -> io::Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;

        if line.trim().is_empty() {
            continue;
        }

        let record: MeasurementRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(error) => {
                census_log::warn!(
                    line = line_number,
                    error = &error as &dyn Error,
                    "skipping malformed measurement"
                );
                summary.skipped += 1;
                continue;
            }
        };

        let Some(measure) = measures.iter().find(|m| m.name() == record.measure) else {
            census_log::warn!(line = line_number, "skipping unknown measure {}", record.measure);
            summary.skipped += 1;
            continue;
        };

        let tags = match record.tag_map() {
            Ok(tags) => tags,
            Err(error) => {
                census_log::warn!(
                    line = line_number,
                    error = &error as &dyn Error,
                    "skipping measurement with invalid tags"
                );
                summary.skipped += 1;
                continue;
            }
        };

        stats.record(&tags, [measure.m(record.value)]);
        summary.recorded += 1;
    }

    census_log::debug!(
        "replayed {} measurements, skipped {}",
        summary.recorded,
        summary.skipped
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use census_stats::{Aggregation, AggregationData, StatsConfig, StatsService, SumData, View};
    use census_tags::Tag;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_parse_record() {
        let record: MeasurementRecord =
            serde_json::from_str(r#"{"measure": "latency", "value": 3}"#).unwrap();

        assert_eq!(
            record,
            MeasurementRecord {
                measure: "latency".to_owned(),
                value: 3.0,
                tags: BTreeMap::new(),
            }
        );
    }

    #[tokio::test]
    async fn test_replay() {
        census_test::setup();

        let stats = StatsHandle::start(StatsService::new(&StatsConfig::default()));
        let latency = Measure::float64("latency", "", "ms").unwrap();
        let route = Key::new("route").unwrap();
        stats
            .register_views([View::new("latency_sum", latency.clone(), Aggregation::Sum)
                .with_tag_keys([route.clone()])])
            .await
            .unwrap();

        let input = r#"
{"measure": "latency", "value": 10, "tags": {"route": "/a"}}
{"measure": "latency", "value": 2.5, "tags": {"route": "/a"}}
not json
{"measure": "size", "value": 1}
{"measure": "latency", "value": 1, "tags": {"": "empty key"}}
{"measure": "latency", "value": 4}
"#;

        let summary = replay(input.as_bytes(), &stats, &[latency]).unwrap();
        assert_eq!(
            summary,
            ReplaySummary {
                recorded: 3,
                skipped: 3,
            }
        );

        let rows = stats.retrieve_data("latency_sum").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tags, Vec::<Tag>::new());
        assert_eq!(rows[0].data, AggregationData::Sum(SumData { value: 4.0 }));
        assert_eq!(rows[1].tags, vec![Tag::new(route, "/a")]);
        assert_eq!(rows[1].data, AggregationData::Sum(SumData { value: 12.5 }));

        stats.stop().await.unwrap();
    }
}
