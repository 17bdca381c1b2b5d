// Invoices module

pub mod models;
pub mod repositories;
pub mod services;

pub use models::{Invoice, InvoicePosition, InvoiceStatus};
pub use repositories::{InMemoryInvoiceRepository, InvoiceStore, InvoiceTx, MySqlInvoiceRepository};
pub use services::{InvoiceService, InvoiceSettings, LifecycleController, NumberFormat};
