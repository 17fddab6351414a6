use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::StatsError;

/// Unit for values without a dimension, such as counts.
pub const UNIT_DIMENSIONLESS: &str = "1";
/// Unit for sizes in bytes.
pub const UNIT_BYTES: &str = "By";
/// Unit for durations in milliseconds.
pub const UNIT_MILLISECONDS: &str = "ms";
/// Unit for durations in seconds.
pub const UNIT_SECONDS: &str = "s";

/// The maximum length of measure and view names, in bytes.
pub const MAX_NAME_LENGTH: usize = 255;

/// Validates a measure or view name.
pub(crate) fn check_name(name: &str) -> Result<(), StatsError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LENGTH
        && name.bytes().all(|b| (b' '..=b'~').contains(&b));

    if valid {
        Ok(())
    } else {
        Err(StatsError::InvalidName(name.to_owned()))
    }
}

/// The type of values recorded for a [`Measure`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureKind {
    /// Integer values, such as byte sizes or counts.
    Int64,
    /// Floating point values, such as latencies.
    #[default]
    Float64,
}

#[derive(Debug, PartialEq, Eq, Hash, Serialize)]
struct MeasureInner {
    name: String,
    description: String,
    unit: String,
    kind: MeasureKind,
}

/// A named quantity that is being recorded, such as request latency.
///
/// Measures are immutable. Cloning is cheap and all clones compare equal.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Measure(Arc<MeasureInner>);

impl Measure {
    /// Creates a measure with the given value kind.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
        kind: MeasureKind,
    ) -> Result<Self, StatsError> {
        let name = name.into();
        check_name(&name)?;

        Ok(Self(Arc::new(MeasureInner {
            name,
            description: description.into(),
            unit: unit.into(),
            kind,
        })))
    }

    /// Creates a measure recording integer values.
    pub fn int64(
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<Self, StatsError> {
        Self::new(name, description, unit, MeasureKind::Int64)
    }

    /// Creates a measure recording floating point values.
    pub fn float64(
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<Self, StatsError> {
        Self::new(name, description, unit, MeasureKind::Float64)
    }

    /// Returns the unique name of the measure.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Returns the human readable description.
    pub fn description(&self) -> &str {
        &self.0.description
    }

    /// Returns the unit of recorded values.
    pub fn unit(&self) -> &str {
        &self.0.unit
    }

    /// Returns the value kind.
    pub fn kind(&self) -> MeasureKind {
        self.0.kind
    }

    /// Creates a measurement of this measure.
    pub fn m(&self, value: f64) -> Measurement {
        Measurement {
            measure: self.clone(),
            value,
        }
    }

    /// Creates a measurement of this measure from an integer.
    pub fn m_int(&self, value: i64) -> Measurement {
        self.m(value as f64)
    }
}

impl fmt::Debug for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Measure")
            .field("name", &self.0.name)
            .field("unit", &self.0.unit)
            .field("kind", &self.0.kind)
            .finish()
    }
}

/// A single value recorded for a [`Measure`].
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    measure: Measure,
    value: f64,
}

impl Measurement {
    /// Returns the measure this value was recorded for.
    pub fn measure(&self) -> &Measure {
        &self.measure
    }

    /// Returns the recorded value.
    pub fn value(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_validation() {
        assert!(Measure::float64("latency", "", UNIT_MILLISECONDS).is_ok());
        assert_eq!(
            Measure::int64("", "", UNIT_BYTES),
            Err(StatsError::InvalidName(String::new()))
        );
        assert!(Measure::int64("size\n", "", UNIT_BYTES).is_err());
        assert!(Measure::int64("a".repeat(256), "", UNIT_BYTES).is_err());
        assert!(Measure::int64("a".repeat(255), "", UNIT_BYTES).is_ok());
    }

    #[test]
    fn test_measurement() {
        let measure = Measure::int64("response_size", "Size of responses", UNIT_BYTES).unwrap();
        let measurement = measure.m_int(512);

        assert_eq!(measurement.measure().name(), "response_size");
        assert_eq!(measurement.measure().kind(), MeasureKind::Int64);
        assert_eq!(measurement.value(), 512.0);
    }

    #[test]
    fn test_clones_compare_equal() {
        let a = Measure::float64("latency", "Request latency", UNIT_MILLISECONDS).unwrap();
        let b = Measure::float64("latency", "Request latency", UNIT_MILLISECONDS).unwrap();
        let c = Measure::float64("latency", "Other", UNIT_SECONDS).unwrap();

        assert_eq!(a, a.clone());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
