use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use census_log::{Level, LogConfig};
use census_stats::{Aggregation, Measure, MeasureKind, StatsConfig, StatsError, UNIT_DIMENSIONLESS, View};
use census_tags::Key;
use serde::{Deserialize, Serialize};

/// The basename of the config file inside the config directory.
const CONFIG_FILE_NAME: &str = "config.yml";

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override, such as a CLI parameter.
    FieldOverride(String),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => write!(f, " (file {})", file_name.display()),
            ConfigErrorSource::FieldOverride(name) => write!(f, " (field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn Error + Send + Sync>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: None,
        }
    }

    #[inline]
    fn wrap<E>(inner: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            cause: Some(Box::new(inner)),
            ..Self::new(kind)
        }
    }

    #[inline]
    fn for_field<E>(inner: E, field: &'static str) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::wrap(inner, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file(mut self, p: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::FieldOverride(name.to_owned());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.source)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to serialize the configuration.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
    /// A measure or view definition is invalid or refers to an unknown measure.
    #[error("invalid measure or view definition")]
    InvalidStats,
}

/// Configuration overrides from CLI parameters or environment variables.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The log level.
    pub log_level: Option<String>,
    /// The reporting period of the stats service in milliseconds.
    pub reporting_period_ms: Option<String>,
}

/// Declaration of a measure.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MeasureConfig {
    /// The unique name of the measure.
    pub name: String,
    /// A human readable description.
    #[serde(default)]
    pub description: String,
    /// The unit of recorded values. Defaults to `"1"`.
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Whether values are integers or floating point numbers.
    #[serde(default)]
    pub kind: MeasureKind,
}

fn default_unit() -> String {
    UNIT_DIMENSIONLESS.to_owned()
}

/// Declaration of a view over a configured measure.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ViewConfig {
    /// The unique name of the view. Defaults to the measure name.
    #[serde(default)]
    pub name: String,
    /// A human readable description. Defaults to the measure description.
    #[serde(default)]
    pub description: String,
    /// The name of the aggregated measure.
    pub measure: String,
    /// The aggregation function.
    pub aggregation: Aggregation,
    /// The tag keys to group rows by.
    #[serde(default)]
    pub tag_keys: Vec<Key>,
}

/// The raw contents of the config file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct ConfigValues {
    logging: LogConfig,
    stats: StatsConfig,
    measures: Vec<MeasureConfig>,
    views: Vec<ViewConfig>,
}

impl ConfigValues {
    fn path(base: &Path) -> PathBuf {
        base.join(CONFIG_FILE_NAME)
    }

    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }

    fn build_measures(&self) -> Result<Vec<Measure>, StatsError> {
        let mut measures: Vec<Measure> = Vec::with_capacity(self.measures.len());

        for config in &self.measures {
            if measures.iter().any(|m| m.name() == config.name) {
                return Err(StatsError::MeasureAlreadyRegistered(config.name.clone()));
            }

            measures.push(Measure::new(
                config.name.as_str(),
                config.description.as_str(),
                config.unit.as_str(),
                config.kind,
            )?);
        }

        Ok(measures)
    }

    fn build_views(&self, measures: &[Measure]) -> Result<Vec<View>, StatsError> {
        self.views
            .iter()
            .map(|config| {
                let measure = measures
                    .iter()
                    .find(|m| m.name() == config.measure)
                    .ok_or_else(|| StatsError::MeasureNotFound(config.measure.clone()))?;

                Ok(
                    View::new(config.name.as_str(), measure.clone(), config.aggregation.clone())
                        .with_description(config.description.as_str())
                        .with_tag_keys(config.tag_keys.iter().cloned()),
                )
            })
            .collect()
    }
}

/// Config struct.
#[derive(Debug)]
pub struct Config {
    values: ConfigValues,
    measures: Vec<Measure>,
    views: Vec<View>,
    path: PathBuf,
}

impl Config {
    /// Loads a config from `config.yml` in the given config directory.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = std::env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let values = ConfigValues::load(&path)?;
        Self::from_values(values, path.clone()).map_err(|e| e.file(ConfigValues::path(&path)))
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        let values = serde_json::from_value(value)
            .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?;
        Self::from_values(values, PathBuf::new())
    }

    fn from_values(values: ConfigValues, path: PathBuf) -> Result<Config, ConfigError> {
        let measures = values
            .build_measures()
            .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::InvalidStats))?;
        let views = values
            .build_views(&measures)
            .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::InvalidStats))?;

        Ok(Config {
            values,
            measures,
            views,
            path,
        })
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        if let Some(level) = overrides.log_level {
            self.values.logging.level = level
                .parse::<Level>()
                .map_err(|err| ConfigError::for_field(err, "log_level"))?;
        }

        if let Some(period) = overrides.reporting_period_ms {
            self.values.stats.reporting_period_ms = period
                .parse()
                .map_err(|err| ConfigError::for_field(err, "reporting_period_ms"))?;
        }

        Ok(self)
    }

    /// Returns the config directory this config was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes the effective configuration to YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the configuration of the stats service.
    pub fn stats(&self) -> &StatsConfig {
        &self.values.stats
    }

    /// Returns all configured measures.
    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    /// Returns all configured views, in declaration order.
    pub fn views(&self) -> &[View] {
        &self.views
    }
}
