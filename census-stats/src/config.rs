use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The default interval in which views are exported.
pub const DEFAULT_REPORTING_PERIOD: Duration = Duration::from_secs(10);

/// Parameters used by the [`StatsService`](crate::StatsService).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StatsConfig {
    /// The interval in milliseconds in which subscribed views are exported.
    ///
    /// Defaults to `10000`. A value of `0` also selects the default.
    pub reporting_period_ms: u64,
}

impl StatsConfig {
    /// Returns the reporting period, falling back to the default for zero.
    pub fn reporting_period(&self) -> Duration {
        reporting_period(Duration::from_millis(self.reporting_period_ms))
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            reporting_period_ms: DEFAULT_REPORTING_PERIOD.as_millis() as u64,
        }
    }
}

/// Maps a zero period to [`DEFAULT_REPORTING_PERIOD`].
pub(crate) fn reporting_period(period: Duration) -> Duration {
    if period.is_zero() {
        DEFAULT_REPORTING_PERIOD
    } else {
        period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporting_period() {
        assert_eq!(StatsConfig::default().reporting_period(), Duration::from_secs(10));

        let config = StatsConfig {
            reporting_period_ms: 0,
        };
        assert_eq!(config.reporting_period(), DEFAULT_REPORTING_PERIOD);

        let config: StatsConfig = serde_json::from_str(r#"{"reporting_period_ms": 250}"#).unwrap();
        assert_eq!(config.reporting_period(), Duration::from_millis(250));
    }
}
