use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::core::error::AppError;
use crate::modules::taxes::models::{TaxAmount, Totals};

/// Anything that contributes a net line amount at a tax rate.
pub trait Taxable {
    /// Net extended amount of the line
    fn line_total(&self) -> Decimal;

    /// Tax rate as a percentage (19 for 19 %)
    fn tax_rate(&self) -> Decimal;
}

impl<T: Taxable + ?Sized> Taxable for &T {
    fn line_total(&self) -> Decimal {
        (**self).line_total()
    }

    fn tax_rate(&self) -> Decimal {
        (**self).tax_rate()
    }
}

/// TaxCalculator derives invoice totals and the per-rate tax breakdown.
///
/// Stateless. All arithmetic is exact decimal arithmetic; nothing is rounded
/// here (see `Totals::rounded_for`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TaxCalculator;

impl TaxCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Tax contribution of a single line: `line_total × rate / 100`
    pub fn calculate_tax(&self, line_total: Decimal, tax_rate: Decimal) -> Decimal {
        line_total * tax_rate / Decimal::ONE_HUNDRED
    }

    /// Aggregate positions into net, gross and ascending per-rate buckets.
    ///
    /// Gross is built position by position so mixed-rate invoices stay exact.
    /// A rate of zero still yields a bucket.
    ///
    /// Lines that passed `InvoicePosition::validate` stay below 10^20 each and
    /// an invoice holds at most `MAX_POSITIONS` of them, so the sums stay far
    /// inside `Decimal`'s range.
    pub fn aggregate<I>(&self, positions: I) -> Totals
    where
        I: IntoIterator,
        I::Item: Taxable,
    {
        let mut net_total = Decimal::ZERO;
        let mut tax_total = Decimal::ZERO;
        let mut buckets: BTreeMap<Decimal, Decimal> = BTreeMap::new();

        for position in positions {
            let line_total = position.line_total();
            let rate = position.tax_rate();
            let tax = self.calculate_tax(line_total, rate);

            net_total += line_total;
            tax_total += tax;
            *buckets.entry(rate.normalize()).or_insert(Decimal::ZERO) += tax;
        }

        Totals {
            net_total,
            gross_total: net_total + tax_total,
            tax_amounts: buckets
                .into_iter()
                .map(|(rate, amount)| TaxAmount { rate, amount })
                .collect(),
        }
    }

    /// Validate tax rate is a percentage between 0 and 100 with max 4 decimal places
    pub fn validate_tax_rate(&self, tax_rate: Decimal) -> Result<(), AppError> {
        if tax_rate < Decimal::ZERO {
            return Err(AppError::Validation(
                "Tax rate cannot be negative".to_string(),
            ));
        }

        if tax_rate > Decimal::ONE_HUNDRED {
            return Err(AppError::Validation(
                "Tax rate cannot exceed 100 percent".to_string(),
            ));
        }

        if tax_rate.normalize().scale() > 4 {
            return Err(AppError::Validation(
                "Tax rate cannot have more than 4 decimal places".to_string(),
            ));
        }

        Ok(())
    }
}
