// E-invoice export hand-off

pub mod models;
pub mod services;

pub use models::{EInvoiceDocument, EInvoiceLine, EInvoiceTax, Party};
pub use services::{EInvoiceExporter, JsonExporter};
