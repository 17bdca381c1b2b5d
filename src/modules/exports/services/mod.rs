pub mod exporter;

pub use exporter::{EInvoiceExporter, JsonExporter};
