//! In-process stats aggregation for applications.
//!
//! This crate bundles the Census workspace into a single entry point. It re-exports the stats
//! and tagging APIs, provides a process-wide [`StatsHandle`] through [`init`] and [`global`], and
//! contains the building blocks of the `census` command line tool:
//!
//!  - [`JsonLinesExporter`] writes view snapshots as JSON lines.
//!  - [`replay`] records measurements read from JSON lines.
//!
//! # Example
//!
//! ```
//! use census::{Aggregation, Measure, StatsConfig, TagMap, View};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let stats = census::init(&StatsConfig::default());
//!
//! let requests = Measure::int64("requests", "Handled requests", "1").unwrap();
//! let view = View::new("requests_count", requests.clone(), Aggregation::Count);
//! stats.register_views([view]).await.unwrap();
//!
//! census::record(&TagMap::empty(), [requests.m_int(1)]);
//! # });
//! ```

#![warn(missing_docs)]

mod exporter;
mod replay;

use once_cell::sync::OnceCell;

pub use census_stats::*;
pub use census_tags::{Key, Mutator, Tag, TagMap};

pub use self::exporter::*;
pub use self::replay::*;

static GLOBAL: OnceCell<StatsHandle> = OnceCell::new();

/// Starts the process-wide stats service and returns a handle to it.
///
/// Only the first call starts a service, which requires a running Tokio runtime. Later calls
/// return the existing handle and ignore `config`.
pub fn init(config: &StatsConfig) -> &'static StatsHandle {
    GLOBAL.get_or_init(|| {
        census_log::debug!("starting global stats service");
        StatsHandle::start(StatsService::new(config))
    })
}

/// Returns the process-wide stats handle, if [`init`] has been called.
pub fn global() -> Option<&'static StatsHandle> {
    GLOBAL.get()
}

/// Records measurements with the process-wide stats service.
///
/// Does nothing if [`init`] has not been called.
pub fn record(tags: &TagMap, measurements: impl IntoIterator<Item = Measurement>) {
    if let Some(stats) = global() {
        stats.record(tags, measurements);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_global_handle() {
        census_test::setup();

        let stats = init(&StatsConfig::default());
        assert!(std::ptr::eq(stats, global().unwrap()));
        assert!(std::ptr::eq(stats, init(&StatsConfig::default())));

        let measure = Measure::int64("global_requests", "", UNIT_DIMENSIONLESS).unwrap();
        stats
            .register_views([View::new("global_requests", measure.clone(), Aggregation::Count)])
            .await
            .unwrap();

        record(&TagMap::empty(), [measure.m_int(1), measure.m_int(1)]);

        let rows = stats.retrieve_data("global_requests").await.unwrap();
        assert_eq!(rows[0].data, AggregationData::Count(CountData { value: 2 }));
    }
}
