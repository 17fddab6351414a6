//! Configuration for the Census stats daemon.
//!
//! The configuration is loaded from a `config.yml` file in a config directory, which is usually
//! passed on the command line. All sections are optional:
//!
//! ```yaml
//! logging:
//!   level: info
//! stats:
//!   reporting_period_ms: 10000
//! measures:
//!   - name: latency
//!     description: Request latency
//!     unit: ms
//!     kind: float64
//! views:
//!   - name: latency_by_route
//!     measure: latency
//!     aggregation:
//!       type: distribution
//!       boundaries: [10, 50, 100, 500]
//!     tag_keys: [route]
//! ```
//!
//! Measures and views are validated while loading, so a [`Config`] always contains definitions
//! that can be registered with the stats service.

#![warn(missing_docs)]

mod config;

pub use self::config::*;
