// An invoice is one billing document owned by exactly one tenant.
//
// While in draft its totals are a live projection of the positions and are
// recomputed on every load. Issuance freezes them. Paid and voided invoices
// are terminal.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::position::InvoicePosition;
use crate::core::{AppError, Currency, OwnerId, Result};
use crate::modules::taxes::{TaxAmount, TaxCalculator, TaxType, Totals};

/// Most positions a single invoice may carry
pub const MAX_POSITIONS: usize = 10_000;

/// Invoice status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Editable; totals computed on demand
    #[default]
    Draft,

    /// Legally issued; totals frozen
    Issued,

    /// Settled, financially final
    Paid,

    /// Cancelled
    Voided,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 4] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Issued,
        InvoiceStatus::Paid,
        InvoiceStatus::Voided,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Voided => "voided",
        }
    }

    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Voided)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "issued" => Ok(InvoiceStatus::Issued),
            "paid" => Ok(InvoiceStatus::Paid),
            "voided" => Ok(InvoiceStatus::Voided),
            _ => Err(format!("Invalid invoice status: {}", s)),
        }
    }
}

/// Represents an invoice together with its positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Assigned by the store on first save
    #[serde(skip_deserializing)]
    pub id: Option<i64>,

    pub owner_id: OwnerId,

    /// Rendered invoice number, assigned at first issuance
    #[serde(skip_deserializing)]
    pub number: Option<String>,

    /// Per-owner sequence value behind `number`
    #[serde(skip_deserializing)]
    pub counter: Option<i64>,

    /// Buyer
    pub company_id: Option<i64>,

    pub letterhead_id: Option<i64>,

    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub occurrence_date: Option<NaiveDate>,

    pub currency: Currency,

    pub tax_type: TaxType,
    pub tax_exemption_reason: Option<String>,

    /// Free text printed above the positions
    pub opening: String,

    /// Free text printed below the positions
    pub footer: String,

    #[serde(skip_deserializing)]
    pub status: InvoiceStatus,

    #[serde(skip_deserializing)]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(skip_deserializing)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_deserializing)]
    pub voided_at: Option<DateTime<Utc>>,

    #[serde(skip_deserializing)]
    pub net_total: Decimal,
    #[serde(skip_deserializing)]
    pub gross_total: Decimal,

    /// Per-rate breakdown, ascending by rate
    #[serde(skip_deserializing)]
    pub tax_amounts: Vec<TaxAmount>,

    #[serde(skip_deserializing)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_deserializing)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub positions: Vec<InvoicePosition>,
}

impl Invoice {
    /// Create an empty draft for an owner
    pub fn draft(owner_id: OwnerId, currency: Currency) -> Self {
        Self {
            id: None,
            owner_id,
            number: None,
            counter: None,
            company_id: None,
            letterhead_id: None,
            issue_date: None,
            due_date: None,
            occurrence_date: None,
            currency,
            tax_type: TaxType::Standard,
            tax_exemption_reason: None,
            opening: String::new(),
            footer: String::new(),
            status: InvoiceStatus::Draft,
            issued_at: None,
            paid_at: None,
            voided_at: None,
            net_total: Decimal::ZERO,
            gross_total: Decimal::ZERO,
            tax_amounts: Vec::new(),
            created_at: None,
            updated_at: None,
            positions: Vec::new(),
        }
    }

    /// Replace the positions, renumbering them 1..n in the given order
    pub fn set_positions(&mut self, positions: Vec<InvoicePosition>) {
        self.positions = positions;
        self.stamp_positions();
    }

    /// Append a position at the end
    pub fn push_position(&mut self, position: InvoicePosition) {
        self.positions.push(position);
        self.stamp_positions();
    }

    /// Re-run the aggregator over the current positions and overwrite the
    /// in-memory totals
    pub fn recompute(&mut self, calculator: &TaxCalculator) {
        let totals = calculator.aggregate(&self.positions);
        self.apply_totals(totals);
    }

    pub fn totals(&self) -> Totals {
        Totals {
            net_total: self.net_total,
            gross_total: self.gross_total,
            tax_amounts: self.tax_amounts.clone(),
        }
    }

    pub fn apply_totals(&mut self, totals: Totals) {
        self.net_total = totals.net_total;
        self.gross_total = totals.gross_total;
        self.tax_amounts = totals.tax_amounts;
    }

    /// Fails when the invoice belongs to a different owner than the caller's scope
    pub fn ensure_owner(&self, owner_id: OwnerId) -> Result<()> {
        if self.owner_id != owner_id {
            return Err(AppError::ownership(format!(
                "invoice {:?} belongs to owner {}, caller scope is {}",
                self.id, self.owner_id, owner_id
            )));
        }

        if let Some(foreign) = self
            .positions
            .iter()
            .find(|p| p.owner_id.is_some_and(|o| o != owner_id))
        {
            return Err(AppError::ownership(format!(
                "position {} belongs to owner {:?}, caller scope is {}",
                foreign.position, foreign.owner_id, owner_id
            )));
        }

        Ok(())
    }

    /// Content fields may only change while in draft
    pub fn is_mutable(&self) -> bool {
        self.status == InvoiceStatus::Draft
    }

    /// Validate the user-editable fields
    pub fn validate(&self) -> Result<()> {
        if let (Some(issue), Some(due)) = (self.issue_date, self.due_date) {
            if due < issue {
                return Err(AppError::validation(format!(
                    "Due date {} cannot be before issue date {}",
                    due, issue
                )));
            }
        }

        if self.tax_type.requires_exemption_reason()
            && self
                .tax_exemption_reason
                .as_deref()
                .map_or(true, |reason| reason.trim().is_empty())
        {
            return Err(AppError::validation(format!(
                "Tax type {} requires an exemption reason",
                self.tax_type
            )));
        }

        if self.positions.len() > MAX_POSITIONS {
            return Err(AppError::validation(format!(
                "An invoice holds at most {} positions, got: {}",
                MAX_POSITIONS,
                self.positions.len()
            )));
        }

        for position in &self.positions {
            position.validate()?;
        }

        Ok(())
    }

    fn stamp_positions(&mut self) {
        for (idx, position) in self.positions.iter_mut().enumerate() {
            position.position = idx as u32 + 1;
            position.owner_id = Some(self.owner_id);
            position.invoice_id = self.id;
        }
    }
}
