use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::Currency;

/// One aggregated (tax rate, tax amount) pair.
///
/// `rate` is a percentage (`19` means 19 %), normalized so that `19.00` and `19`
/// are the same bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxAmount {
    pub rate: Decimal,
    pub amount: Decimal,
}

/// Net, gross and per-rate breakdown of a set of positions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub net_total: Decimal,
    pub gross_total: Decimal,
    pub tax_amounts: Vec<TaxAmount>,
}

impl Totals {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Sum of all bucket amounts
    pub fn tax_total(&self) -> Decimal {
        self.gross_total - self.net_total
    }

    /// Presentation copy rounded to the currency's minor units.
    ///
    /// Each figure is rounded independently from its exact value.
    pub fn rounded_for(&self, currency: &Currency) -> Totals {
        Totals {
            net_total: currency.round(self.net_total),
            gross_total: currency.round(self.gross_total),
            tax_amounts: self
                .tax_amounts
                .iter()
                .map(|bucket| TaxAmount {
                    rate: bucket.rate,
                    amount: currency.round(bucket.amount),
                })
                .collect(),
        }
    }
}

/// VAT treatment of a whole invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxType {
    #[default]
    Standard,
    ReverseCharge,
    IntraCommunity,
    Export,
    Exempt,
    SmallBusiness,
}

impl TaxType {
    /// UNTDID 5305 duty/tax category code handed to the e-invoice exporter
    pub fn category_code(&self, rate: Decimal) -> &'static str {
        match self {
            TaxType::Standard if rate.is_zero() => "Z",
            TaxType::Standard => "S",
            TaxType::ReverseCharge => "AE",
            TaxType::IntraCommunity => "K",
            TaxType::Export => "G",
            TaxType::Exempt | TaxType::SmallBusiness => "E",
        }
    }

    /// Whether an exemption reason must accompany the invoice
    pub fn requires_exemption_reason(&self) -> bool {
        !matches!(self, TaxType::Standard)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxType::Standard => "standard",
            TaxType::ReverseCharge => "reverse_charge",
            TaxType::IntraCommunity => "intra_community",
            TaxType::Export => "export",
            TaxType::Exempt => "exempt",
            TaxType::SmallBusiness => "small_business",
        }
    }
}

impl std::fmt::Display for TaxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaxType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(TaxType::Standard),
            "reverse_charge" => Ok(TaxType::ReverseCharge),
            "intra_community" => Ok(TaxType::IntraCommunity),
            "export" => Ok(TaxType::Export),
            "exempt" => Ok(TaxType::Exempt),
            "small_business" => Ok(TaxType::SmallBusiness),
            _ => Err(format!("Invalid tax type: {}", s)),
        }
    }
}
