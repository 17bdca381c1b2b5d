pub mod einvoice;

pub use einvoice::{EInvoiceDocument, EInvoiceLine, EInvoiceTax, Party};
