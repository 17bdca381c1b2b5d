pub mod invoice_repository;
pub mod memory_repository;

pub use invoice_repository::{InvoiceStore, InvoiceTx, MySqlInvoiceRepository, MySqlInvoiceTx};
pub use memory_repository::{InMemoryInvoiceRepository, InMemoryInvoiceTx};
