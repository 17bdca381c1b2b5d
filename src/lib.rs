//! Invoicekit multi-tenant invoicing core
//!
//! Tax aggregation, the invoice lifecycle state machine and owner-scoped
//! persistence of invoices and their positions.

pub mod config;
pub mod core;
pub mod modules;

// Re-export commonly used types
pub use crate::core::{AppError, Currency, OwnerId, Result};
pub use modules::exports;
pub use modules::invoices;
pub use modules::taxes;
