// Invoice state machine.
//
//   draft  -> issued   freeze totals, set issued_at, assign number
//   issued -> paid     set paid_at
//   draft  -> voided   set voided_at
//   issued -> voided   set voided_at
//   paid   -> voided   forbidden (distinct error)
//   issued -> draft    only through reset_to_draft
//
// Every step runs on a row locked with the transaction that writes it, so two
// concurrent requests on the same invoice are totally ordered.

use chrono::{DateTime, Utc};

use super::numbering::NumberFormat;
use crate::core::{AppError, OwnerId, Result};
use crate::modules::invoices::models::{Invoice, InvoiceStatus};
use crate::modules::invoices::repositories::InvoiceTx;
use crate::modules::taxes::{TaxCalculator, Totals};

/// Side effect attached to an allowed transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Issue,
    Pay,
    Void,
}

/// Look up `(from, to)` in the transition table.
///
/// Runs before any side effect.
pub fn plan_transition(from: InvoiceStatus, to: InvoiceStatus) -> Result<Transition> {
    use InvoiceStatus::*;

    match (from, to) {
        (Draft, Issued) => Ok(Transition::Issue),
        (Issued, Paid) => Ok(Transition::Pay),
        (Draft, Voided) | (Issued, Voided) => Ok(Transition::Void),
        (Paid, Voided) => Err(AppError::ForbiddenTransition { from, to }),
        _ => Err(AppError::InvalidTransition { from, to }),
    }
}

/// Applies transitions inside a caller-owned transaction
#[derive(Debug, Clone)]
pub struct LifecycleController {
    calculator: TaxCalculator,
    number_format: NumberFormat,
}

impl LifecycleController {
    pub fn new(number_format: NumberFormat) -> Self {
        Self {
            calculator: TaxCalculator::new(),
            number_format,
        }
    }

    /// Move an invoice to `target`, locking its row first.
    ///
    /// Returns the invoice as written, with positions loaded.
    pub async fn transition<T: InvoiceTx>(
        &self,
        tx: &mut T,
        invoice_id: i64,
        owner_id: OwnerId,
        target: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<Invoice> {
        let mut invoice = tx
            .lock_invoice(invoice_id, owner_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "Invoice '{}' not found for owner {}",
                    invoice_id, owner_id
                ))
            })?;

        let step = plan_transition(invoice.status, target).map_err(|e| {
            tracing::warn!(
                invoice_id,
                owner_id = owner_id.get(),
                from = %invoice.status,
                to = %target,
                "Rejected invoice status transition"
            );
            e
        })?;

        invoice.positions = tx.find_positions(invoice_id, owner_id).await?;

        match step {
            Transition::Issue => {
                invoice.recompute(&self.calculator);
                invoice.issued_at = Some(at);
                let issue_date = *invoice.issue_date.get_or_insert(at.date_naive());

                if invoice.counter.is_none() {
                    let counter = tx.next_counter(owner_id).await?;
                    invoice.counter = Some(counter);
                    invoice.number = Some(self.number_format.render(counter, issue_date));
                }
            }
            Transition::Pay => invoice.paid_at = Some(at),
            Transition::Void => invoice.voided_at = Some(at),
        }

        let from = invoice.status;
        invoice.status = target;
        invoice.updated_at = Some(at);
        tx.write_lifecycle(&invoice).await?;

        tracing::info!(
            invoice_id,
            owner_id = owner_id.get(),
            from = %from,
            to = %target,
            number = invoice.number.as_deref().unwrap_or(""),
            "Invoice status changed"
        );

        Ok(invoice)
    }

    /// Roll an issued invoice back to draft.
    ///
    /// Clears `issued_at` and zeroes the frozen totals. Number and counter are
    /// kept so a later re-issue reuses them. Terminal invoices never go back.
    pub async fn reset_to_draft<T: InvoiceTx>(
        &self,
        tx: &mut T,
        invoice_id: i64,
        owner_id: OwnerId,
        at: DateTime<Utc>,
    ) -> Result<Invoice> {
        let mut invoice = tx
            .lock_invoice(invoice_id, owner_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "Invoice '{}' not found for owner {}",
                    invoice_id, owner_id
                ))
            })?;

        if invoice.status != InvoiceStatus::Issued {
            tracing::warn!(
                invoice_id,
                owner_id = owner_id.get(),
                from = %invoice.status,
                "Rejected reset to draft"
            );
            return Err(AppError::InvalidTransition {
                from: invoice.status,
                to: InvoiceStatus::Draft,
            });
        }

        invoice.status = InvoiceStatus::Draft;
        invoice.issued_at = None;
        invoice.apply_totals(Totals::zero());
        invoice.updated_at = Some(at);
        tx.write_lifecycle(&invoice).await?;

        // Drafts are live projections
        invoice.positions = tx.find_positions(invoice_id, owner_id).await?;
        invoice.recompute(&self.calculator);

        tracing::info!(
            invoice_id,
            owner_id = owner_id.get(),
            "Invoice reset to draft"
        );

        Ok(invoice)
    }
}
