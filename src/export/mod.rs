pub mod exporter;
pub mod filename;

pub use exporter::{DocumentExporter, ExportError};
pub use filename::{DEFAULT_PREFIX, sanitize_filename, timestamp_filename};
