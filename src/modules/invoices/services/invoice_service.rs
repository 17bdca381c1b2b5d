use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::lifecycle::LifecycleController;
use super::numbering::NumberFormat;
use crate::core::{AppError, OwnerId, Result};
use crate::modules::exports::{EInvoiceDocument, EInvoiceExporter, Party};
use crate::modules::invoices::models::{Invoice, InvoiceStatus};
use crate::modules::invoices::repositories::{InvoiceStore, InvoiceTx};
use crate::modules::taxes::{TaxCalculator, Totals};

/// Default page size for `list`
pub const DEFAULT_LIST_LIMIT: i64 = 20;
/// Upper bound for `list`
pub const MAX_LIST_LIMIT: i64 = 100;

/// Settings the service is built from
#[derive(Debug, Clone)]
pub struct InvoiceSettings {
    pub number_format: NumberFormat,
    /// Deadline applied to every operation unless overridden
    pub tx_timeout: Duration,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            number_format: NumberFormat::default(),
            tx_timeout: Duration::from_secs(10),
        }
    }
}

/// Service for invoice business logic
///
/// Every operation runs in exactly one store transaction bounded by the
/// configured deadline. When the deadline passes the in-flight transaction is
/// dropped, which rolls it back.
pub struct InvoiceService<S: InvoiceStore> {
    store: Arc<S>,
    lifecycle: LifecycleController,
    calculator: TaxCalculator,
    timeout: Duration,
}

impl<S: InvoiceStore> Clone for InvoiceService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lifecycle: self.lifecycle.clone(),
            calculator: self.calculator,
            timeout: self.timeout,
        }
    }
}

impl<S: InvoiceStore> InvoiceService<S> {
    pub fn new(store: Arc<S>, settings: InvoiceSettings) -> Self {
        Self {
            store,
            lifecycle: LifecycleController::new(settings.number_format),
            calculator: TaxCalculator::new(),
            timeout: settings.tx_timeout,
        }
    }

    /// Same service with a caller-supplied deadline
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Load an invoice with its positions.
    ///
    /// Drafts get their totals recomputed from the positions just read;
    /// issued, paid and voided invoices return the frozen figures untouched.
    pub async fn load(&self, invoice_id: i64, owner_id: OwnerId) -> Result<Invoice> {
        self.bounded(async {
            let mut tx = self.store.begin().await?;
            let invoice = self.read_scoped(&mut tx, invoice_id, owner_id).await?;
            tx.commit().await?;

            tracing::debug!(
                invoice_id,
                owner_id = owner_id.get(),
                status = %invoice.status,
                positions = invoice.positions.len(),
                "Loaded invoice"
            );
            Ok::<_, AppError>(invoice)
        })
        .await
    }

    /// Save an invoice and replace all of its positions.
    ///
    /// New invoices are inserted as drafts. Existing rows get only their
    /// editable columns updated; status, number and lifecycle timestamps are
    /// never written here. Positions are deleted and re-inserted wholesale,
    /// so their ids change on every save.
    pub async fn save(&self, invoice: &Invoice, owner_id: OwnerId) -> Result<Invoice> {
        invoice.ensure_owner(owner_id).map_err(|e| {
            tracing::warn!(
                invoice_id = ?invoice.id,
                owner_id = owner_id.get(),
                invoice_owner = invoice.owner_id.get(),
                "Rejected save outside owner scope"
            );
            e
        })?;
        invoice.validate()?;

        self.bounded(async {
            let mut tx = self.store.begin().await?;

            let invoice_id = match invoice.id {
                None => {
                    let mut row = invoice.clone();
                    row.status = InvoiceStatus::Draft;
                    row.number = None;
                    row.counter = None;
                    row.issued_at = None;
                    row.paid_at = None;
                    row.voided_at = None;
                    row.apply_totals(Totals::zero());
                    tx.insert_invoice(&row).await?
                }
                Some(invoice_id) => {
                    let stored = tx
                        .lock_invoice(invoice_id, owner_id)
                        .await?
                        .ok_or_else(|| {
                            AppError::not_found(format!(
                                "Invoice '{}' not found for owner {}",
                                invoice_id, owner_id
                            ))
                        })?;

                    if stored.status.is_terminal() {
                        tracing::warn!(
                            invoice_id,
                            owner_id = owner_id.get(),
                            status = %stored.status,
                            "Rejected save of terminal invoice"
                        );
                        return Err(AppError::Immutable(stored.status));
                    }

                    let frozen = if stored.status == InvoiceStatus::Draft {
                        Totals::zero()
                    } else {
                        invoice.totals()
                    };
                    tx.update_invoice(invoice, &frozen).await?;
                    invoice_id
                }
            };

            let removed = tx.delete_positions(invoice_id, owner_id).await?;
            for (idx, position) in invoice.positions.iter().enumerate() {
                let mut row = position.clone();
                row.position = idx as u32 + 1;
                tx.insert_position(invoice_id, owner_id, &row).await?;
            }

            let saved = self.read_scoped(&mut tx, invoice_id, owner_id).await?;
            tx.commit().await?;

            tracing::info!(
                invoice_id,
                owner_id = owner_id.get(),
                removed_positions = removed,
                positions = saved.positions.len(),
                "Saved invoice"
            );
            Ok::<_, AppError>(saved)
        })
        .await
    }

    /// Request a status transition. See `lifecycle` for the table.
    pub async fn transition(
        &self,
        invoice_id: i64,
        owner_id: OwnerId,
        target: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<Invoice> {
        self.bounded(async {
            let mut tx = self.store.begin().await?;
            let invoice = self
                .lifecycle
                .transition(&mut tx, invoice_id, owner_id, target, at)
                .await?;
            tx.commit().await?;
            Ok::<_, AppError>(invoice)
        })
        .await
    }

    pub async fn issue(
        &self,
        invoice_id: i64,
        owner_id: OwnerId,
        at: DateTime<Utc>,
    ) -> Result<Invoice> {
        self.transition(invoice_id, owner_id, InvoiceStatus::Issued, at)
            .await
    }

    pub async fn mark_paid(
        &self,
        invoice_id: i64,
        owner_id: OwnerId,
        at: DateTime<Utc>,
    ) -> Result<Invoice> {
        self.transition(invoice_id, owner_id, InvoiceStatus::Paid, at)
            .await
    }

    pub async fn void(
        &self,
        invoice_id: i64,
        owner_id: OwnerId,
        at: DateTime<Utc>,
    ) -> Result<Invoice> {
        self.transition(invoice_id, owner_id, InvoiceStatus::Voided, at)
            .await
    }

    /// Roll an issued invoice back to draft, stamped with `at`
    pub async fn reset_to_draft(
        &self,
        invoice_id: i64,
        owner_id: OwnerId,
        at: DateTime<Utc>,
    ) -> Result<Invoice> {
        self.bounded(async {
            let mut tx = self.store.begin().await?;
            let invoice = self
                .lifecycle
                .reset_to_draft(&mut tx, invoice_id, owner_id, at)
                .await?;
            tx.commit().await?;
            Ok::<_, AppError>(invoice)
        })
        .await
    }

    /// Delete a draft together with its positions
    pub async fn delete(&self, invoice_id: i64, owner_id: OwnerId) -> Result<()> {
        self.bounded(async {
            let mut tx = self.store.begin().await?;
            let stored = tx
                .lock_invoice(invoice_id, owner_id)
                .await?
                .ok_or_else(|| {
                    AppError::not_found(format!(
                        "Invoice '{}' not found for owner {}",
                        invoice_id, owner_id
                    ))
                })?;

            if !stored.is_mutable() {
                return Err(AppError::Immutable(stored.status));
            }

            tx.delete_positions(invoice_id, owner_id).await?;
            tx.delete_invoice(invoice_id, owner_id).await?;
            tx.commit().await?;

            tracing::info!(invoice_id, owner_id = owner_id.get(), "Deleted invoice");
            Ok::<_, AppError>(())
        })
        .await
    }

    /// List invoices for an owner without positions.
    ///
    /// Draft totals are not recomputed here; call `load` for live figures.
    pub async fn list(
        &self,
        owner_id: OwnerId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Invoice>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let offset = offset.unwrap_or(0).max(0);

        self.bounded(self.store.list(owner_id, limit, offset)).await
    }

    /// Hand an issued or paid invoice to an e-invoice exporter
    pub async fn export<E: EInvoiceExporter>(
        &self,
        invoice_id: i64,
        owner_id: OwnerId,
        seller: &Party,
        buyer: &Party,
        exporter: &E,
    ) -> Result<E::Output> {
        let invoice = self.load(invoice_id, owner_id).await?;

        if !matches!(invoice.status, InvoiceStatus::Issued | InvoiceStatus::Paid) {
            return Err(AppError::validation(format!(
                "Only issued or paid invoices can be exported, invoice is {}",
                invoice.status
            )));
        }

        let document = EInvoiceDocument::from_invoice(&invoice, seller, buyer)?;
        let output = exporter.export(&document).map_err(|e| {
            tracing::error!(
                invoice_id,
                format = exporter.name(),
                error = %e,
                "E-invoice export failed"
            );
            AppError::Export(e.to_string())
        })?;

        tracing::info!(
            invoice_id,
            owner_id = owner_id.get(),
            format = exporter.name(),
            number = %document.number,
            "Exported invoice"
        );
        Ok(output)
    }

    async fn read_scoped(
        &self,
        tx: &mut S::Tx,
        invoice_id: i64,
        owner_id: OwnerId,
    ) -> Result<Invoice> {
        let mut invoice = tx
            .find_invoice(invoice_id, owner_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "Invoice '{}' not found for owner {}",
                    invoice_id, owner_id
                ))
            })?;

        invoice.positions = tx.find_positions(invoice_id, owner_id).await?;
        if invoice.status == InvoiceStatus::Draft {
            invoice.recompute(&self.calculator);
        }

        Ok(invoice)
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Invoice operation timed out, rolled back");
                Err(AppError::Timeout(self.timeout))
            }
        }
    }
}
