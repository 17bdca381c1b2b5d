// A position is one billed line of an invoice.
//
// Positions carry their owner explicitly. The owner and invoice stamps are
// rewritten on every save, so a position built outside an invoice starts
// without them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AppError, OwnerId, Result};
use crate::modules::taxes::{TaxCalculator, Taxable};

/// Fractional digits allowed on a quantity
pub const MAX_QUANTITY_SCALE: u32 = 6;
/// Fractional digits allowed on a net price
pub const MAX_PRICE_SCALE: u32 = 4;

/// Exclusive bound on every stored amount; DECIMAL(30, 10) keeps 20 integer digits
pub fn max_amount() -> Decimal {
    Decimal::from_i128_with_scale(100_000_000_000_000_000_000, 0)
}

/// Represents a single line item in an invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePosition {
    /// Row identity; fresh on every save
    #[serde(skip_deserializing)]
    pub id: Option<i64>,

    /// Parent invoice
    #[serde(skip_deserializing)]
    pub invoice_id: Option<i64>,

    /// Tenant scope, always equal to the parent's
    #[serde(skip_deserializing)]
    pub owner_id: Option<OwnerId>,

    /// 1-based ordinal within the invoice
    pub position: u32,

    /// Description of the product or service
    pub text: String,

    pub quantity: Decimal,

    /// UN/ECE Recommendation 20 unit code, e.g. `C62` (piece) or `HUR` (hour)
    pub unit_code: String,

    /// Percentage, e.g. 19.00
    pub tax_rate: Decimal,

    pub net_price: Decimal,

    pub gross_price: Decimal,

    /// Net extended amount of the line, independent of tax
    pub line_total: Decimal,
}

impl InvoicePosition {
    /// Create a new position with validation
    ///
    /// # Arguments
    /// * `text` - Product/service description
    /// * `quantity` - Must be non-negative
    /// * `unit_code` - Unit of measure code
    /// * `net_price` - Net price per unit, must be non-negative
    /// * `tax_rate` - Percentage between 0 and 100
    ///
    /// # Returns
    /// * `Result<Self>` - Position with `line_total` and `gross_price` derived
    pub fn new(
        text: impl Into<String>,
        quantity: Decimal,
        unit_code: impl Into<String>,
        net_price: Decimal,
        tax_rate: Decimal,
    ) -> Result<Self> {
        let (line_total, gross_price) = derive_amounts(quantity, net_price, tax_rate)?;
        let position = Self {
            id: None,
            invoice_id: None,
            owner_id: None,
            position: 0,
            text: text.into(),
            quantity,
            unit_code: unit_code.into(),
            tax_rate,
            net_price,
            gross_price,
            line_total,
        };

        position.validate()?;
        Ok(position)
    }

    /// Check the line before it is written.
    ///
    /// `line_total` and `gross_price` must match what `quantity`, `net_price`
    /// and `tax_rate` derive, so a deserialized position cannot carry figures
    /// of its own into the totals.
    pub fn validate(&self) -> Result<()> {
        if self.text.len() > 4000 {
            return Err(AppError::validation(
                "Position text cannot exceed 4000 characters",
            ));
        }

        if self.unit_code.trim().is_empty() {
            return Err(AppError::validation("Position unit code cannot be empty"));
        }

        if self.quantity < Decimal::ZERO {
            return Err(AppError::validation(format!(
                "Quantity must be non-negative, got: {}",
                self.quantity
            )));
        }

        if self.net_price < Decimal::ZERO {
            return Err(AppError::validation(format!(
                "Net price must be non-negative, got: {}",
                self.net_price
            )));
        }

        if self.quantity.normalize().scale() > MAX_QUANTITY_SCALE {
            return Err(AppError::validation(format!(
                "Quantity allows at most {} decimal places, got: {}",
                MAX_QUANTITY_SCALE, self.quantity
            )));
        }

        if self.net_price.normalize().scale() > MAX_PRICE_SCALE {
            return Err(AppError::validation(format!(
                "Net price allows at most {} decimal places, got: {}",
                MAX_PRICE_SCALE, self.net_price
            )));
        }

        TaxCalculator::new().validate_tax_rate(self.tax_rate)?;

        let (line_total, gross_price) =
            derive_amounts(self.quantity, self.net_price, self.tax_rate)?;
        if self.line_total != line_total {
            return Err(AppError::validation(format!(
                "Line total {} does not match quantity {} x net price {}",
                self.line_total, self.quantity, self.net_price
            )));
        }
        if self.gross_price != gross_price {
            return Err(AppError::validation(format!(
                "Gross price {} does not match net price {} at {}%",
                self.gross_price, self.net_price, self.tax_rate
            )));
        }

        Ok(())
    }
}

/// `(quantity × net_price, net_price + tax)` with every operand and result
/// kept below `max_amount()`.
fn derive_amounts(
    quantity: Decimal,
    net_price: Decimal,
    tax_rate: Decimal,
) -> Result<(Decimal, Decimal)> {
    let limit = max_amount();
    let out_of_range = || {
        AppError::validation(format!(
            "Position amounts out of range: quantity {} x net price {}",
            quantity, net_price
        ))
    };

    if quantity.abs() >= limit || net_price.abs() >= limit {
        return Err(out_of_range());
    }

    let line_total = quantity.checked_mul(net_price).ok_or_else(out_of_range)?;
    let tax = net_price
        .checked_mul(tax_rate)
        .and_then(|t| t.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(out_of_range)?;
    let gross_price = net_price.checked_add(tax).ok_or_else(out_of_range)?;

    if line_total.abs() >= limit || gross_price.abs() >= limit {
        return Err(out_of_range());
    }

    Ok((line_total, gross_price))
}

impl Taxable for InvoicePosition {
    fn line_total(&self) -> Decimal {
        self.line_total
    }

    fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }
}
