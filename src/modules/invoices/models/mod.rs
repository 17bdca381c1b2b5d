mod invoice;
mod position;

pub use invoice::{Invoice, InvoiceStatus, MAX_POSITIONS};
pub use position::{max_amount, InvoicePosition, MAX_PRICE_SCALE, MAX_QUANTITY_SCALE};
