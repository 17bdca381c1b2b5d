pub mod invoice_service;
pub mod lifecycle;
pub mod numbering;

pub use invoice_service::{InvoiceService, InvoiceSettings, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
pub use lifecycle::{plan_transition, LifecycleController, Transition};
pub use numbering::NumberFormat;
