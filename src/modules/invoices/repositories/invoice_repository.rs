// Owner-scoped persistence for invoices and their positions.
//
// Every statement carries `owner_id = ?` next to the id filter. A row that
// exists under another owner is indistinguishable from a missing row.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{MySql, MySqlPool, Transaction};

use crate::core::{AppError, Currency, OwnerId, Result};
use crate::modules::invoices::models::{Invoice, InvoicePosition, InvoiceStatus};
use crate::modules::taxes::{TaxAmount, Totals};

/// Entry point of the persistence gateway
#[async_trait]
pub trait InvoiceStore: Send + Sync + 'static {
    type Tx: InvoiceTx;

    /// Open a transaction. Dropping the handle without `commit` rolls back.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Page of invoices for one owner, newest first, without positions
    async fn list(&self, owner_id: OwnerId, limit: i64, offset: i64) -> Result<Vec<Invoice>>;
}

/// Transaction-scoped operations. Every method enforces the owner filter.
#[async_trait]
pub trait InvoiceTx: Send {
    /// Read the invoice row holding an exclusive lock until commit/rollback.
    /// Positions are not loaded.
    async fn lock_invoice(&mut self, id: i64, owner_id: OwnerId) -> Result<Option<Invoice>>;

    /// Plain read of the invoice row, positions not loaded
    async fn find_invoice(&mut self, id: i64, owner_id: OwnerId) -> Result<Option<Invoice>>;

    /// Positions ordered by ordinal
    async fn find_positions(
        &mut self,
        invoice_id: i64,
        owner_id: OwnerId,
    ) -> Result<Vec<InvoicePosition>>;

    /// Insert a new invoice row and return its id
    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<i64>;

    /// Update the user-editable columns plus the given frozen totals.
    /// Never touches status, number, counter or lifecycle timestamps.
    async fn update_invoice(&mut self, invoice: &Invoice, frozen: &Totals) -> Result<u64>;

    /// Write status, lifecycle timestamps, issue date, number/counter and
    /// frozen totals as held by `invoice`
    async fn write_lifecycle(&mut self, invoice: &Invoice) -> Result<u64>;

    async fn delete_positions(&mut self, invoice_id: i64, owner_id: OwnerId) -> Result<u64>;

    /// Insert one position stamped with the given invoice and owner
    async fn insert_position(
        &mut self,
        invoice_id: i64,
        owner_id: OwnerId,
        position: &InvoicePosition,
    ) -> Result<i64>;

    async fn delete_invoice(&mut self, id: i64, owner_id: OwnerId) -> Result<u64>;

    /// Next value of the owner's invoice sequence, locked until commit
    async fn next_counter(&mut self, owner_id: OwnerId) -> Result<i64>;

    async fn commit(self) -> Result<()>;
}

const INVOICE_COLUMNS: &str = r#"
    id, owner_id, `number`, counter, company_id, letterhead_id,
    issue_date, due_date, occurrence_date, currency, tax_type, tax_exemption_reason,
    opening, footer, status, issued_at, paid_at, voided_at,
    net_total, gross_total, tax_amounts, created_at, updated_at
"#;

// Per-owner sequence row, see `invoice_counters` in the migrations
const COUNTER_ENSURE_SQL: &str = "INSERT INTO invoice_counters (owner_id, last_counter) \
     VALUES (?, 0) ON DUPLICATE KEY UPDATE owner_id = owner_id";
const COUNTER_LOCK_SQL: &str =
    "SELECT last_counter FROM invoice_counters WHERE owner_id = ? FOR UPDATE";
const COUNTER_UPDATE_SQL: &str =
    "UPDATE invoice_counters SET last_counter = ? WHERE owner_id = ?";

/// MySQL implementation of the gateway
#[derive(Clone)]
pub struct MySqlInvoiceRepository {
    pool: MySqlPool,
}

impl MySqlInvoiceRepository {
    /// Create a new invoice repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl InvoiceStore for MySqlInvoiceRepository {
    type Tx = MySqlInvoiceTx;

    async fn begin(&self) -> Result<MySqlInvoiceTx> {
        let tx = self.pool.begin().await?;
        Ok(MySqlInvoiceTx { tx })
    }

    async fn list(&self, owner_id: OwnerId, limit: i64, offset: i64) -> Result<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE owner_id = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(owner_id.get())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(InvoiceRow::into_invoice).collect()
    }
}

/// Open MySQL transaction
pub struct MySqlInvoiceTx {
    tx: Transaction<'static, MySql>,
}

impl MySqlInvoiceTx {
    async fn fetch_invoice(
        &mut self,
        id: i64,
        owner_id: OwnerId,
        for_update: bool,
    ) -> Result<Option<Invoice>> {
        let lock = if for_update { " FOR UPDATE" } else { "" };
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ? AND owner_id = ?{lock}"
        ))
        .bind(id)
        .bind(owner_id.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(InvoiceRow::into_invoice).transpose()
    }
}

#[async_trait]
impl InvoiceTx for MySqlInvoiceTx {
    async fn lock_invoice(&mut self, id: i64, owner_id: OwnerId) -> Result<Option<Invoice>> {
        self.fetch_invoice(id, owner_id, true).await
    }

    async fn find_invoice(&mut self, id: i64, owner_id: OwnerId) -> Result<Option<Invoice>> {
        self.fetch_invoice(id, owner_id, false).await
    }

    async fn find_positions(
        &mut self,
        invoice_id: i64,
        owner_id: OwnerId,
    ) -> Result<Vec<InvoicePosition>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT
                id, invoice_id, owner_id, `position`, `text`, quantity, unit_code,
                tax_rate, net_price, gross_price, line_total
            FROM invoice_positions
            WHERE invoice_id = ? AND owner_id = ?
            ORDER BY `position` ASC, id ASC
            "#,
        )
        .bind(invoice_id)
        .bind(owner_id.get())
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(PositionRow::into_position).collect())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO invoices (
                owner_id, company_id, letterhead_id, issue_date, due_date, occurrence_date,
                currency, tax_type, tax_exemption_reason, opening, footer, status,
                net_total, gross_total, tax_amounts, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(invoice.owner_id.get())
        .bind(invoice.company_id)
        .bind(invoice.letterhead_id)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.occurrence_date)
        .bind(invoice.currency.code())
        .bind(invoice.tax_type.as_str())
        .bind(&invoice.tax_exemption_reason)
        .bind(&invoice.opening)
        .bind(&invoice.footer)
        .bind(invoice.status.as_str())
        .bind(invoice.net_total)
        .bind(invoice.gross_total)
        .bind(encode_tax_amounts(&invoice.tax_amounts)?)
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        i64::try_from(result.last_insert_id())
            .map_err(|_| AppError::internal("invoice id out of range"))
    }

    async fn update_invoice(&mut self, invoice: &Invoice, frozen: &Totals) -> Result<u64> {
        let id = invoice
            .id
            .ok_or_else(|| AppError::internal("update_invoice called without id"))?;

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET company_id = ?, letterhead_id = ?, issue_date = ?, due_date = ?,
                occurrence_date = ?, currency = ?, tax_type = ?, tax_exemption_reason = ?,
                opening = ?, footer = ?, net_total = ?, gross_total = ?, tax_amounts = ?,
                updated_at = ?
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(invoice.company_id)
        .bind(invoice.letterhead_id)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.occurrence_date)
        .bind(invoice.currency.code())
        .bind(invoice.tax_type.as_str())
        .bind(&invoice.tax_exemption_reason)
        .bind(&invoice.opening)
        .bind(&invoice.footer)
        .bind(frozen.net_total)
        .bind(frozen.gross_total)
        .bind(encode_tax_amounts(&frozen.tax_amounts)?)
        .bind(Utc::now())
        .bind(id)
        .bind(invoice.owner_id.get())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn write_lifecycle(&mut self, invoice: &Invoice) -> Result<u64> {
        let id = invoice
            .id
            .ok_or_else(|| AppError::internal("write_lifecycle called without id"))?;

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = ?, issued_at = ?, paid_at = ?, voided_at = ?, issue_date = ?,
                `number` = ?, counter = ?, net_total = ?, gross_total = ?, tax_amounts = ?,
                updated_at = ?
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(invoice.status.as_str())
        .bind(invoice.issued_at)
        .bind(invoice.paid_at)
        .bind(invoice.voided_at)
        .bind(invoice.issue_date)
        .bind(&invoice.number)
        .bind(invoice.counter)
        .bind(invoice.net_total)
        .bind(invoice.gross_total)
        .bind(encode_tax_amounts(&invoice.tax_amounts)?)
        .bind(invoice.updated_at.unwrap_or_else(Utc::now))
        .bind(id)
        .bind(invoice.owner_id.get())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_positions(&mut self, invoice_id: i64, owner_id: OwnerId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM invoice_positions WHERE invoice_id = ? AND owner_id = ?")
            .bind(invoice_id)
            .bind(owner_id.get())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_position(
        &mut self,
        invoice_id: i64,
        owner_id: OwnerId,
        position: &InvoicePosition,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO invoice_positions (
                invoice_id, owner_id, `position`, `text`, quantity, unit_code,
                tax_rate, net_price, gross_price, line_total
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(invoice_id)
        .bind(owner_id.get())
        .bind(position.position)
        .bind(&position.text)
        .bind(position.quantity)
        .bind(&position.unit_code)
        .bind(position.tax_rate)
        .bind(position.net_price)
        .bind(position.gross_price)
        .bind(position.line_total)
        .execute(&mut *self.tx)
        .await?;

        i64::try_from(result.last_insert_id())
            .map_err(|_| AppError::internal("position id out of range"))
    }

    async fn delete_invoice(&mut self, id: i64, owner_id: OwnerId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id.get())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn next_counter(&mut self, owner_id: OwnerId) -> Result<i64> {
        sqlx::query(COUNTER_ENSURE_SQL)
            .bind(owner_id.get())
            .execute(&mut *self.tx)
            .await?;

        let last: i64 = sqlx::query_scalar(COUNTER_LOCK_SQL)
            .bind(owner_id.get())
            .fetch_one(&mut *self.tx)
            .await?;

        let next = last + 1;
        sqlx::query(COUNTER_UPDATE_SQL)
            .bind(next)
            .bind(owner_id.get())
            .execute(&mut *self.tx)
            .await?;

        Ok(next)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn encode_tax_amounts(tax_amounts: &[TaxAmount]) -> Result<String> {
    Ok(serde_json::to_string(tax_amounts)?)
}

// Helper structs for database mapping

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: i64,
    owner_id: i64,
    number: Option<String>,
    counter: Option<i64>,
    company_id: Option<i64>,
    letterhead_id: Option<i64>,
    issue_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    occurrence_date: Option<NaiveDate>,
    currency: String,
    tax_type: String,
    tax_exemption_reason: Option<String>,
    opening: String,
    footer: String,
    status: String,
    issued_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    voided_at: Option<DateTime<Utc>>,
    net_total: Decimal,
    gross_total: Decimal,
    tax_amounts: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InvoiceRow {
    fn into_invoice(self) -> Result<Invoice> {
        let currency = Currency::new(&self.currency)
            .map_err(|e| AppError::Internal(format!("Invalid currency in database: {}", e)))?;
        let tax_type = self
            .tax_type
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid tax type in database: {}", e)))?;
        let status: InvoiceStatus = self
            .status
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid status in database: {}", e)))?;
        let tax_amounts = match self.tax_amounts.as_deref() {
            Some(json) if !json.is_empty() => serde_json::from_str(json)?,
            _ => Vec::new(),
        };

        Ok(Invoice {
            id: Some(self.id),
            owner_id: OwnerId(self.owner_id),
            number: self.number,
            counter: self.counter,
            company_id: self.company_id,
            letterhead_id: self.letterhead_id,
            issue_date: self.issue_date,
            due_date: self.due_date,
            occurrence_date: self.occurrence_date,
            currency,
            tax_type,
            tax_exemption_reason: self.tax_exemption_reason,
            opening: self.opening,
            footer: self.footer,
            status,
            issued_at: self.issued_at,
            paid_at: self.paid_at,
            voided_at: self.voided_at,
            net_total: self.net_total,
            gross_total: self.gross_total,
            tax_amounts,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
            positions: Vec::new(),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PositionRow {
    id: i64,
    invoice_id: i64,
    owner_id: i64,
    position: u32,
    text: String,
    quantity: Decimal,
    unit_code: String,
    tax_rate: Decimal,
    net_price: Decimal,
    gross_price: Decimal,
    line_total: Decimal,
}

impl PositionRow {
    fn into_position(self) -> InvoicePosition {
        InvoicePosition {
            id: Some(self.id),
            invoice_id: Some(self.invoice_id),
            owner_id: Some(OwnerId(self.owner_id)),
            position: self.position,
            text: self.text,
            quantity: self.quantity,
            unit_code: self.unit_code,
            tax_rate: self.tax_rate,
            net_price: self.net_price,
            gross_price: self.gross_price,
            line_total: self.line_total,
        }
    }
}
