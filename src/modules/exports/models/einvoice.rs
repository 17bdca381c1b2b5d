use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Currency, Result};
use crate::modules::invoices::models::{Invoice, InvoiceStatus};

/// Trade party printed on the e-invoice (seller or buyer)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub street: Option<String>,
    pub postcode: Option<String>,
    pub city: Option<String>,

    /// ISO 3166-1 alpha-2
    pub country_code: String,

    pub vat_id: Option<String>,
    pub tax_number: Option<String>,
    pub email: Option<String>,
    pub contact_name: Option<String>,
}

impl Party {
    pub fn new(name: impl Into<String>, country_code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            country_code: country_code.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self, role: &str) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation(format!("{} name is required", role)));
        }
        if self.country_code.len() != 2 || !self.country_code.chars().all(|c| c.is_ascii_uppercase())
        {
            return Err(AppError::validation(format!(
                "{} country code '{}' must be ISO 3166-1 alpha-2",
                role, self.country_code
            )));
        }
        Ok(())
    }
}

/// One invoice line as the exporter sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EInvoiceLine {
    /// Position ordinal, 1-based
    pub id: String,
    pub name: String,
    pub quantity: Decimal,
    pub unit_code: String,
    pub net_price: Decimal,
    pub tax_category_code: String,
    pub tax_rate_applicable_percent: Decimal,
    /// Rounded to the currency scale
    pub total: Decimal,
}

/// One row of the VAT breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EInvoiceTax {
    pub category_code: String,
    pub rate_applicable_percent: Decimal,
    pub basis_amount: Decimal,
    pub calculated_amount: Decimal,
    pub exemption_reason: Option<String>,
}

/// Structured invoice data handed to an e-invoice exporter.
///
/// Built only from issued or paid invoices, so every figure here comes from
/// the frozen totals. Monetary amounts are rounded to the currency scale; the
/// invoice itself keeps exact values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EInvoiceDocument {
    pub number: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub occurrence_date: Option<NaiveDate>,
    pub currency: Currency,
    pub seller: Party,
    pub buyer: Party,
    pub notes: Vec<String>,
    pub lines: Vec<EInvoiceLine>,
    pub tax_breakdown: Vec<EInvoiceTax>,
    pub line_total: Decimal,
    pub tax_basis_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
    pub paid_amount: Decimal,
    pub due_payable: Decimal,
}

impl EInvoiceDocument {
    pub fn from_invoice(invoice: &Invoice, seller: &Party, buyer: &Party) -> Result<Self> {
        seller.validate("Seller")?;
        buyer.validate("Buyer")?;

        let number = invoice.number.clone().ok_or_else(|| {
            AppError::validation(format!("Invoice {:?} has no number assigned", invoice.id))
        })?;
        let issue_date = invoice.issue_date.ok_or_else(|| {
            AppError::validation(format!("Invoice {} has no issue date", number))
        })?;

        let currency = &invoice.currency;
        let tax_type = invoice.tax_type;
        let exemption_reason = if tax_type.requires_exemption_reason() {
            invoice.tax_exemption_reason.clone()
        } else {
            None
        };

        let lines: Vec<EInvoiceLine> = invoice
            .positions
            .iter()
            .map(|p| {
                let rate = p.tax_rate.normalize();
                EInvoiceLine {
                    id: p.position.to_string(),
                    name: p.text.clone(),
                    quantity: p.quantity.normalize(),
                    unit_code: p.unit_code.clone(),
                    net_price: p.net_price,
                    tax_category_code: tax_type.category_code(rate).to_string(),
                    tax_rate_applicable_percent: rate,
                    total: currency.round(p.line_total),
                }
            })
            .collect();

        // Basis per rate from the positions, tax per rate from the frozen buckets
        let mut basis: BTreeMap<Decimal, Decimal> = BTreeMap::new();
        for p in &invoice.positions {
            *basis.entry(p.tax_rate.normalize()).or_insert(Decimal::ZERO) += p.line_total;
        }

        let tax_breakdown: Vec<EInvoiceTax> = basis
            .into_iter()
            .map(|(rate, basis_amount)| {
                let calculated = invoice
                    .tax_amounts
                    .iter()
                    .find(|bucket| bucket.rate.normalize() == rate)
                    .map(|bucket| bucket.amount)
                    .unwrap_or(Decimal::ZERO);
                EInvoiceTax {
                    category_code: tax_type.category_code(rate).to_string(),
                    rate_applicable_percent: rate,
                    basis_amount: currency.round(basis_amount),
                    calculated_amount: currency.round(calculated),
                    exemption_reason: exemption_reason.clone(),
                }
            })
            .collect();

        let notes = [&invoice.opening, &invoice.footer]
            .into_iter()
            .filter(|text| !text.trim().is_empty())
            .cloned()
            .collect();

        let grand_total = currency.round(invoice.gross_total);
        let paid_amount = if invoice.status == InvoiceStatus::Paid {
            grand_total
        } else {
            Decimal::ZERO
        };

        Ok(Self {
            number,
            issue_date,
            due_date: invoice.due_date,
            occurrence_date: invoice.occurrence_date,
            currency: currency.clone(),
            seller: seller.clone(),
            buyer: buyer.clone(),
            notes,
            lines,
            tax_breakdown,
            line_total: currency.round(invoice.net_total),
            tax_basis_total: currency.round(invoice.net_total),
            tax_total: currency.round(invoice.gross_total - invoice.net_total),
            grand_total,
            paid_amount,
            due_payable: grand_total - paid_amount,
        })
    }
}
