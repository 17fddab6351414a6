//! Generic metric data model, producers and periodic export for Census.
//!
//! Aggregation engines expose their state as a list of [`Metric`]s through the [`Producer`]
//! trait. Producers are collected in a [`ProducerRegistry`], and the [`IntervalReader`] reads
//! every registered producer in regular intervals and hands the result to a
//! [`MetricExporter`].
//!
//! The model is independent of how the data was aggregated: a [`Metric`] has a [`Descriptor`]
//! declaring its name, unit, [`MetricType`] and label keys, and a list of [`TimeSeries`], one per
//! distinct combination of label values.

#![warn(missing_docs)]

mod data;
mod producer;
mod reader;

pub use self::data::*;
pub use self::producer::*;
pub use self::reader::*;
