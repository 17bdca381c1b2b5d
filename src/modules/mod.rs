pub mod exports;
pub mod health;
pub mod invoices;
pub mod taxes;
