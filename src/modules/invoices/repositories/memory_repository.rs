//! In-process invoice store.
//!
//! Mirrors the MySQL gateway's transactional behaviour without a database.
//! Row locks are per-invoice async mutexes held until commit or drop; idle
//! ones are pruned on release. Writes are staged inside the transaction and
//! applied atomically on commit, and a dropped transaction discards them.
//!
//! Plain reads see the invoice row and its positions as committed when the
//! transaction first touched that invoice. Taking the row lock re-reads the
//! latest committed state, like a locking read does in MySQL.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::invoice_repository::{InvoiceStore, InvoiceTx};
use crate::core::{AppError, OwnerId, Result};
use crate::modules::invoices::models::{Invoice, InvoicePosition};
use crate::modules::taxes::Totals;

#[derive(Default)]
struct Tables {
    invoices: HashMap<i64, Invoice>,
    positions: HashMap<i64, Vec<InvoicePosition>>,
    counters: HashMap<OwnerId, i64>,
}

struct Shared {
    tables: RwLock<Tables>,
    row_locks: DashMap<i64, Arc<Mutex<()>>>,
    counter_locks: DashMap<OwnerId, Arc<Mutex<()>>>,
    next_invoice_id: AtomicI64,
    next_position_id: AtomicI64,
}

/// Thread-safe in-memory implementation of the persistence gateway.
///
/// Cloning shares the same tables.
#[derive(Clone)]
pub struct InMemoryInvoiceRepository {
    shared: Arc<Shared>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        InMemoryInvoiceRepository {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                row_locks: DashMap::new(),
                counter_locks: DashMap::new(),
                next_invoice_id: AtomicI64::new(1),
                next_position_id: AtomicI64::new(1),
            }),
        }
    }

    /// Number of committed invoices across all owners
    pub fn len(&self) -> usize {
        self.shared
            .tables
            .read()
            .map(|tables| tables.invoices.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed positions of an invoice regardless of owner.
    ///
    /// Inspection hook for tests; application code goes through a transaction.
    pub fn raw_positions(&self, invoice_id: i64) -> Vec<InvoicePosition> {
        self.shared
            .tables
            .read()
            .ok()
            .and_then(|tables| tables.positions.get(&invoice_id).cloned())
            .unwrap_or_default()
    }

    /// Overwrite committed positions directly, bypassing every guard.
    ///
    /// Simulates out-of-band edits in tests. Positions without an owner take
    /// the owner of the invoice row.
    pub fn overwrite_positions(&self, invoice_id: i64, mut positions: Vec<InvoicePosition>) {
        if let Ok(mut tables) = self.shared.tables.write() {
            let owner_id = tables.invoices.get(&invoice_id).map(|i| i.owner_id);
            for (idx, position) in positions.iter_mut().enumerate() {
                position.id = Some(self.shared.next_position_id.fetch_add(1, Ordering::SeqCst));
                position.invoice_id = Some(invoice_id);
                position.owner_id = position.owner_id.or(owner_id);
                position.position = idx as u32 + 1;
            }
            tables.positions.insert(invoice_id, positions);
        }
    }
}

impl Default for InMemoryInvoiceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceRepository {
    type Tx = InMemoryInvoiceTx;

    async fn begin(&self) -> Result<InMemoryInvoiceTx> {
        Ok(InMemoryInvoiceTx {
            shared: Arc::clone(&self.shared),
            guards: Vec::new(),
            locked_rows: HashSet::new(),
            locked_counters: HashSet::new(),
            snapshots: HashMap::new(),
            staged_invoices: HashMap::new(),
            staged_positions: HashMap::new(),
            staged_counters: HashMap::new(),
        })
    }

    async fn list(&self, owner_id: OwnerId, limit: i64, offset: i64) -> Result<Vec<Invoice>> {
        let tables = self
            .shared
            .tables
            .read()
            .map_err(|_| AppError::internal("invoice table lock poisoned"))?;

        let mut invoices: Vec<Invoice> = tables
            .invoices
            .values()
            .filter(|invoice| invoice.owner_id == owner_id)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(invoices
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

// Committed invoice row and positions, read together
struct RowSnapshot {
    invoice: Option<Invoice>,
    positions: Vec<InvoicePosition>,
}

/// Open in-memory transaction
pub struct InMemoryInvoiceTx {
    shared: Arc<Shared>,
    guards: Vec<OwnedMutexGuard<()>>,
    locked_rows: HashSet<i64>,
    locked_counters: HashSet<OwnerId>,
    snapshots: HashMap<i64, RowSnapshot>,
    // None marks a staged delete
    staged_invoices: HashMap<i64, Option<Invoice>>,
    staged_positions: HashMap<i64, Vec<InvoicePosition>>,
    staged_counters: HashMap<OwnerId, i64>,
}

impl InMemoryInvoiceTx {
    async fn lock_row(&mut self, id: i64) {
        if self.locked_rows.contains(&id) {
            return;
        }
        let lock = self
            .shared
            .row_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        self.guards.push(lock.lock_owned().await);
        self.locked_rows.insert(id);
    }

    async fn lock_counter(&mut self, owner_id: OwnerId) {
        if self.locked_counters.contains(&owner_id) {
            return;
        }
        let lock = self
            .shared
            .counter_locks
            .entry(owner_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        self.guards.push(lock.lock_owned().await);
        self.locked_counters.insert(owner_id);
    }

    /// Drop every guard, then forget locks nobody else holds or waits on
    fn release_locks(&mut self) {
        self.guards.clear();
        for id in self.locked_rows.drain() {
            self.shared
                .row_locks
                .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        }
        for owner_id in self.locked_counters.drain() {
            self.shared
                .counter_locks
                .remove_if(&owner_id, |_, lock| Arc::strong_count(lock) == 1);
        }
    }

    fn read_committed(&self, id: i64) -> Result<RowSnapshot> {
        let tables = self
            .shared
            .tables
            .read()
            .map_err(|_| AppError::internal("invoice table lock poisoned"))?;
        Ok(RowSnapshot {
            invoice: tables.invoices.get(&id).cloned(),
            positions: tables.positions.get(&id).cloned().unwrap_or_default(),
        })
    }

    fn snapshot(&mut self, id: i64) -> Result<&RowSnapshot> {
        if !self.snapshots.contains_key(&id) {
            let snapshot = self.read_committed(id)?;
            self.snapshots.insert(id, snapshot);
        }
        self.snapshots
            .get(&id)
            .ok_or_else(|| AppError::internal("invoice snapshot missing"))
    }

    fn current_invoice(&mut self, id: i64) -> Result<Option<Invoice>> {
        if let Some(staged) = self.staged_invoices.get(&id) {
            return Ok(staged.clone());
        }
        Ok(self.snapshot(id)?.invoice.clone())
    }

    fn current_positions(&mut self, invoice_id: i64) -> Result<Vec<InvoicePosition>> {
        if let Some(staged) = self.staged_positions.get(&invoice_id) {
            return Ok(staged.clone());
        }
        Ok(self.snapshot(invoice_id)?.positions.clone())
    }

    fn scoped_invoice(&mut self, id: i64, owner_id: OwnerId) -> Result<Option<Invoice>> {
        Ok(self
            .current_invoice(id)?
            .filter(|invoice| invoice.owner_id == owner_id))
    }
}

#[async_trait]
impl InvoiceTx for InMemoryInvoiceTx {
    async fn lock_invoice(&mut self, id: i64, owner_id: OwnerId) -> Result<Option<Invoice>> {
        self.lock_row(id).await;
        let latest = self.read_committed(id)?;
        self.snapshots.insert(id, latest);
        self.scoped_invoice(id, owner_id)
    }

    async fn find_invoice(&mut self, id: i64, owner_id: OwnerId) -> Result<Option<Invoice>> {
        self.scoped_invoice(id, owner_id)
    }

    async fn find_positions(
        &mut self,
        invoice_id: i64,
        owner_id: OwnerId,
    ) -> Result<Vec<InvoicePosition>> {
        let mut positions: Vec<InvoicePosition> = self
            .current_positions(invoice_id)?
            .into_iter()
            .filter(|p| p.owner_id == Some(owner_id))
            .collect();
        positions.sort_by_key(|p| (p.position, p.id));
        Ok(positions)
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<i64> {
        let id = self.shared.next_invoice_id.fetch_add(1, Ordering::SeqCst);
        self.lock_row(id).await;

        let now = Utc::now();
        let mut row = invoice.clone();
        row.id = Some(id);
        row.positions = Vec::new();
        row.created_at = Some(now);
        row.updated_at = Some(now);
        self.staged_invoices.insert(id, Some(row));
        Ok(id)
    }

    async fn update_invoice(&mut self, invoice: &Invoice, frozen: &Totals) -> Result<u64> {
        let id = invoice
            .id
            .ok_or_else(|| AppError::internal("update_invoice called without id"))?;
        let Some(mut row) = self.scoped_invoice(id, invoice.owner_id)? else {
            return Ok(0);
        };

        row.company_id = invoice.company_id;
        row.letterhead_id = invoice.letterhead_id;
        row.issue_date = invoice.issue_date;
        row.due_date = invoice.due_date;
        row.occurrence_date = invoice.occurrence_date;
        row.currency = invoice.currency.clone();
        row.tax_type = invoice.tax_type;
        row.tax_exemption_reason = invoice.tax_exemption_reason.clone();
        row.opening = invoice.opening.clone();
        row.footer = invoice.footer.clone();
        row.apply_totals(frozen.clone());
        row.updated_at = Some(Utc::now());

        self.staged_invoices.insert(id, Some(row));
        Ok(1)
    }

    async fn write_lifecycle(&mut self, invoice: &Invoice) -> Result<u64> {
        let id = invoice
            .id
            .ok_or_else(|| AppError::internal("write_lifecycle called without id"))?;
        let Some(mut row) = self.scoped_invoice(id, invoice.owner_id)? else {
            return Ok(0);
        };

        row.status = invoice.status;
        row.issued_at = invoice.issued_at;
        row.paid_at = invoice.paid_at;
        row.voided_at = invoice.voided_at;
        row.issue_date = invoice.issue_date;
        row.number = invoice.number.clone();
        row.counter = invoice.counter;
        row.apply_totals(invoice.totals());
        row.updated_at = Some(invoice.updated_at.unwrap_or_else(Utc::now));

        self.staged_invoices.insert(id, Some(row));
        Ok(1)
    }

    async fn delete_positions(&mut self, invoice_id: i64, owner_id: OwnerId) -> Result<u64> {
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .current_positions(invoice_id)?
            .into_iter()
            .partition(|p| p.owner_id == Some(owner_id));
        self.staged_positions.insert(invoice_id, kept);
        Ok(removed.len() as u64)
    }

    async fn insert_position(
        &mut self,
        invoice_id: i64,
        owner_id: OwnerId,
        position: &InvoicePosition,
    ) -> Result<i64> {
        let id = self.shared.next_position_id.fetch_add(1, Ordering::SeqCst);
        let mut row = position.clone();
        row.id = Some(id);
        row.invoice_id = Some(invoice_id);
        row.owner_id = Some(owner_id);

        let mut positions = self.current_positions(invoice_id)?;
        positions.push(row);
        self.staged_positions.insert(invoice_id, positions);
        Ok(id)
    }

    async fn delete_invoice(&mut self, id: i64, owner_id: OwnerId) -> Result<u64> {
        if self.scoped_invoice(id, owner_id)?.is_none() {
            return Ok(0);
        }
        self.staged_invoices.insert(id, None);
        self.staged_positions.insert(id, Vec::new());
        Ok(1)
    }

    async fn next_counter(&mut self, owner_id: OwnerId) -> Result<i64> {
        self.lock_counter(owner_id).await;

        let last = match self.staged_counters.get(&owner_id) {
            Some(value) => *value,
            None => {
                let tables = self
                    .shared
                    .tables
                    .read()
                    .map_err(|_| AppError::internal("invoice table lock poisoned"))?;
                tables.counters.get(&owner_id).copied().unwrap_or(0)
            }
        };

        let next = last + 1;
        self.staged_counters.insert(owner_id, next);
        Ok(next)
    }

    async fn commit(mut self) -> Result<()> {
        {
            let mut tables = self
                .shared
                .tables
                .write()
                .map_err(|_| AppError::internal("invoice table lock poisoned"))?;

            for (id, invoice) in std::mem::take(&mut self.staged_invoices) {
                match invoice {
                    Some(invoice) => {
                        tables.invoices.insert(id, invoice);
                    }
                    None => {
                        tables.invoices.remove(&id);
                    }
                }
            }
            for (invoice_id, positions) in std::mem::take(&mut self.staged_positions) {
                if positions.is_empty() {
                    tables.positions.remove(&invoice_id);
                } else {
                    tables.positions.insert(invoice_id, positions);
                }
            }
            tables.counters.extend(std::mem::take(&mut self.staged_counters));
        }

        // Row locks release only after the writes are visible
        self.release_locks();
        Ok(())
    }
}

impl Drop for InMemoryInvoiceTx {
    fn drop(&mut self) {
        self.release_locks();
    }
}
