mod tax;

pub use tax::{TaxAmount, TaxType, Totals};
