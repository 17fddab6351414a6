use std::error::Error;
use std::io::{self, Write};

use census_stats::{Exporter, ViewData};
use parking_lot::Mutex;

/// Writes every exported view snapshot as a single line of JSON.
pub struct JsonLinesExporter<W> {
    writer: Mutex<W>,
}

impl JsonLinesExporter<io::Stdout> {
    /// Creates an exporter writing to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLinesExporter<W> {
    /// Creates an exporter writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    fn write_line(&self, data: &ViewData) -> io::Result<()> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, data)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl<W: Write + Send> Exporter for JsonLinesExporter<W> {
    fn export_view(&self, data: &ViewData) {
        if let Err(error) = self.write_line(data) {
            census_log::error!(
                view = data.view.name.as_str(),
                error = &error as &dyn Error,
                "failed to export view"
            );
        }
    }
}
