use std::env;
use std::io;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// All crates of the workspace, which log at the configured level.
///
/// Third-party crates are capped at `INFO` unless overridden through `RUST_LOG`.
const CRATE_NAMES: &[&str] = &[
    "census",
    "census_config",
    "census_log",
    "census_metrics",
    "census_stats",
    "census_system",
    "census_tags",
];

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO  census::run > registered 3 views
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2024-12-04T12:10:32Z  INFO census::run: registered 3 views
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2024-12-04T12:11:08.729716Z","level":"INFO","fields":{"message":"registered 3 views"},"target":"census::run"}
    /// ```
    Json,
}

/// The logging level parse error.
#[derive(Clone, Debug)]
pub struct LevelParseError(String);

impl std::fmt::Display for LevelParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as level: expected one of "error", "warn", "info", "debug", "trace", "off""#,
            self.0
        )
    }
}

impl std::error::Error for LevelParseError {}

/// The verbosity of log output.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// The "error" level.
    Error,
    /// The "warn" level.
    Warn,
    /// The "info" level.
    Info,
    /// The "debug" level.
    Debug,
    /// The "trace" level.
    Trace,
    /// Disables all logging.
    Off,
}

impl Level {
    /// Returns the tracing [`LevelFilter`].
    pub const fn level_filter(&self) -> LevelFilter {
        match self {
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
            Level::Off => LevelFilter::OFF,
        }
    }
}

impl std::str::FromStr for Level {
    type Err = LevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => Level::Error,
            s if s.eq_ignore_ascii_case("error") => Level::Error,
            s if s.eq_ignore_ascii_case("warn") => Level::Warn,
            s if s.eq_ignore_ascii_case("info") => Level::Info,
            s if s.eq_ignore_ascii_case("debug") => Level::Debug,
            s if s.eq_ignore_ascii_case("trace") => Level::Trace,
            s if s.eq_ignore_ascii_case("off") => Level::Off,
            s => return Err(LevelParseError(s.into())),
        };

        Ok(result)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for Census.
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,

    /// When set to `true`, backtraces are forced on.
    ///
    /// Otherwise, backtraces can be enabled by setting the `RUST_BACKTRACE` variable to `full`.
    pub enable_backtraces: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: LogFormat::Auto,
            enable_backtraces: false,
        }
    }
}

/// Builds the filter used when `RUST_LOG` is not set.
fn default_filter(level: Level) -> EnvFilter {
    let mut directives = String::from("info");
    for name in CRATE_NAMES {
        directives.push_str(&format!(",{name}={level}"));
    }

    EnvFilter::builder().parse_lossy(directives)
}

/// Initialize the logging system.
///
/// Calling this function more than once has no effect, the first subscriber stays installed.
///
/// # Example
///
/// ```
/// let log_config = census_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// census_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        env::set_var("RUST_BACKTRACE", "full");
    }

    let filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) => EnvFilter::builder().parse_lossy(directives),
        Err(_) => default_filter(config.level),
    };

    let format = fmt::layer().with_writer(io::stderr).with_target(true);
    let format: Box<dyn Layer<Registry> + Send + Sync> =
        match (config.format, console::user_attended_stderr()) {
            (LogFormat::Auto, true) | (LogFormat::Pretty, _) => format.compact().boxed(),
            (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
                format.with_ansi(false).boxed()
            }
            (LogFormat::Json, _) => format
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .boxed(),
        };

    tracing_subscriber::registry()
        .with(format)
        .with(filter)
        .try_init()
        .ok();
}
