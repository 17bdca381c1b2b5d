pub mod models;
pub mod services;

pub use models::{TaxAmount, TaxType, Totals};
pub use services::{Taxable, TaxCalculator};
