//! Measures, views and the stats aggregation service for Census.
//!
//! Applications describe what they record with [`Measure`]s and how those values are aggregated
//! with [`View`]s. Every recorded [`Measurement`] is aggregated into each subscribed view of its
//! measure, grouped by the view's tag keys. All aggregation state is owned by a single
//! [`StatsService`], which is controlled through a cloneable [`StatsHandle`].
//!
//! In regular intervals, the service hands a snapshot of every subscribed view to the registered
//! [exporters](Exporter). The same data is also available in the generic metric model of
//! [`census_metrics`] through the [`StatsProducer`].
//!
//! ```
//! use census_stats::{Aggregation, Measure, StatsConfig, StatsHandle, StatsService, View};
//! use census_tags::{Key, Mutator, TagMap};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let stats = StatsHandle::start(StatsService::new(&StatsConfig::default()));
//!
//! let method = Key::new("method").unwrap();
//! let latency = Measure::float64("latency", "Request latency", "ms").unwrap();
//! let view = View::new("latency_sum", latency.clone(), Aggregation::Sum)
//!     .with_tag_keys([method.clone()]);
//! stats.register_views([view]).await.unwrap();
//!
//! let tags = TagMap::new([Mutator::insert(method, "GET")]).unwrap();
//! stats.record(&tags, [latency.m(12.0), latency.m(30.0)]);
//!
//! let rows = stats.retrieve_data("latency_sum").await.unwrap();
//! assert_eq!(rows.len(), 1);
//! # stats.stop().await.unwrap();
//! # });
//! ```

#![warn(missing_docs)]

mod aggregation;
mod collector;
mod config;
mod error;
mod export;
mod handle;
mod measure;
mod metrics;
mod service;
mod view;

pub mod signature;

pub use self::aggregation::*;
pub use self::collector::Collector;
pub use self::config::{DEFAULT_REPORTING_PERIOD, StatsConfig};
pub use self::error::*;
pub use self::export::*;
pub use self::handle::*;
pub use self::measure::*;
pub use self::metrics::metric_type;
pub use self::service::*;
pub use self::view::{Row, View};
