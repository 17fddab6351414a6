use std::error::Error;
use std::fmt;

/// Logs an error to the configured logger or `stderr` if not yet configured.
///
/// # Example
///
/// ```
/// if let Err(error) = std::fs::read("missing.yml") {
///     let error: Box<dyn std::error::Error> = Box::new(error);
///     census_log::ensure_error(error);
/// }
/// ```
#[allow(clippy::print_stderr)]
pub fn ensure_error<E: AsRef<dyn Error>>(error: E) {
    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!("{}", LogError(error.as_ref()));
    } else {
        eprintln!("error: {}", LogError(error.as_ref()));
    }
}

/// A wrapper around an [`Error`] that prints its causes.
///
/// # Example
///
/// ```
/// use census_log::LogError;
///
/// if let Err(error) = std::env::var("FOO") {
///     census_log::error!("env failed: {}", LogError(&error));
/// }
/// ```
pub struct LogError<'a, E: Error + ?Sized>(pub &'a E);

impl<E: Error + ?Sized> fmt::Display for LogError<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;

        let mut source = self.0.source();
        while let Some(s) = source {
            write!(f, "\n  caused by: {s}")?;
            source = s.source();
        }

        Ok(())
    }
}
