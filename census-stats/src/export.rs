use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::view::{Row, View};

/// A snapshot of a view's rows handed to [exporters](Exporter).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ViewData {
    /// The view definition.
    pub view: View,
    /// The time since which the view has been collecting.
    pub start: DateTime<Utc>,
    /// The time of the snapshot.
    pub end: DateTime<Utc>,
    /// All rows of the view at the time of the snapshot.
    pub rows: Vec<Row>,
}

/// A backend receiving periodic view snapshots.
///
/// Exporters are called synchronously from the stats service and must return quickly. Expensive
/// work, such as network requests, should be handed off to a separate task.
pub trait Exporter: Send + Sync {
    /// Exports a snapshot of a single view.
    fn export_view(&self, data: &ViewData);
}

/// The set of registered [exporters](Exporter).
///
/// Registration can happen from any thread and never blocks an ongoing dispatch, which always
/// iterates a consistent snapshot of the registered exporters.
#[derive(Default)]
pub struct ExporterRegistry {
    exporters: ArcSwap<Vec<Arc<dyn Exporter>>>,
}

impl fmt::Debug for ExporterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterRegistry")
            .field("exporters", &self.len())
            .finish()
    }
}

impl ExporterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an exporter. Registering the same exporter twice has no effect.
    pub fn register(&self, exporter: Arc<dyn Exporter>) {
        self.exporters.rcu(|current| {
            let mut exporters = Vec::clone(current);
            if !exporters.iter().any(|e| same_exporter(e, &exporter)) {
                exporters.push(exporter.clone());
            }
            exporters
        });
    }

    /// Removes a previously registered exporter.
    pub fn unregister(&self, exporter: &Arc<dyn Exporter>) {
        self.exporters.rcu(|current| {
            let mut exporters = Vec::clone(current);
            exporters.retain(|e| !same_exporter(e, exporter));
            exporters
        });
    }

    /// Returns the number of registered exporters.
    pub fn len(&self) -> usize {
        self.exporters.load().len()
    }

    /// Returns `true` if no exporters are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Passes `data` to every registered exporter.
    ///
    /// A panicking exporter is logged and skipped.
    pub fn dispatch(&self, data: &ViewData) {
        let exporters = self.exporters.load();
        for exporter in exporters.iter() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| exporter.export_view(data)));
            if let Err(payload) = result {
                census_log::error!(
                    view = data.view.name.as_str(),
                    "exporter panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

fn same_exporter(a: &Arc<dyn Exporter>, b: &Arc<dyn Exporter>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
