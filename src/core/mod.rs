pub mod currency;
pub mod error;
pub mod owner;

pub use currency::Currency;
pub use error::{AppError, Result};
pub use owner::OwnerId;
