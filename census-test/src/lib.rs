//! Helpers for testing Census services.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output is
//!    captured by the test runner. All logs emitted with [`census_log`] will show up for test
//!    failures or when run with `--nocapture`.
//!
//! # Example
//!
//! ```no_run
//! #[test]
//! fn my_test() {
//!     census_test::setup();
//!
//!     census_log::debug!("hello, world!");
//! }
//! ```

use std::path::{Path, PathBuf};

use census_system::{Addr, Interface, channel};
use tokio::task::JoinHandle;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from this crate and mutes all other logs.
pub fn setup() {
    census_log::init_test!();
}

/// Spawns a mock service that handles messages through a closure.
///
/// Note: Addr must be dropped before handle can be awaited.
pub fn mock_service<S, I, F>(name: &'static str, mut state: S, mut f: F) -> (Addr<I>, JoinHandle<S>)
where
    S: Send + 'static,
    I: Interface,
    F: FnMut(&mut S, I) + Send + 'static,
{
    let (addr, mut rx) = channel(name);

    let handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            f(&mut state, msg);
        }

        state
    });

    (addr, handle)
}

/// A temporary config directory that is removed when dropped.
#[derive(Debug)]
pub struct ConfigDir {
    dir: tempfile::TempDir,
}

impl ConfigDir {
    /// Creates an empty config directory.
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    /// Creates a config directory containing a `config.yml` with the given contents.
    pub fn with_config(yaml: &str) -> Self {
        let dir = Self::new();
        dir.write("config.yml", yaml);
        dir
    }

    /// Writes a file into the config directory and returns its path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("failed to write config file");
        path
    }

    /// Returns the path of the directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for ConfigDir {
    fn default() -> Self {
        Self::new()
    }
}
