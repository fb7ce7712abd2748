//! Invoice model and settlement status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment status of an invoice (and, mirrored, of a storefront order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::PartiallyPaid => "partially_paid",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partially_paid" => PaymentStatus::PartiallyPaid,
            "paid" => PaymentStatus::Paid,
            _ => PaymentStatus::Unpaid,
        }
    }
}

/// Invoice document. `total`, `amount_paid` and `amount_due` are held as
/// decimals; `amount_paid + amount_due` always equals `total` within the
/// settlement epsilon. Mutated only by the settlement recompute.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub customer_id: Uuid,
    pub owner_user_id: Uuid,
    pub currency: String,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub payment_status: String,
    pub paid_date: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl Invoice {
    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.payment_status)
    }
}

/// Outcome of one settlement recomputation for an invoice.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementResult {
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub status: PaymentStatus,
    /// True only when this recomputation moved the invoice from a
    /// non-paid status into paid. Drives the commission trigger.
    pub transitioned: bool,
    pub paid_date: Option<DateTime<Utc>>,
}
