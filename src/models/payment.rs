//! Payment ledger models: payments, allocations, credit note applications.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A receipt of funds. Append-only; uniquely identified both by a
/// human-readable number and by the external gateway `reference`, which is
/// the idempotency key (at most one payment per reference).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub payment_number: String,
    pub reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub channel: Option<String>,
    pub notes: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

/// How much of a payment was applied to which invoice. A payment's
/// allocations never sum past the payment amount.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentAllocation {
    pub allocation_id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// A credit note applied against an invoice; contributes to the paid total
/// exactly like a payment allocation but sourced from a credit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditNoteApplication {
    pub application_id: Uuid,
    pub credit_note_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Input for recording a confirmed gateway payment against an invoice.
#[derive(Debug, Clone)]
pub struct RecordGatewayPayment {
    pub reference: String,
    /// Gateway-reported amount in minor units (e.g. kobo, cents).
    pub amount_minor: i64,
    pub currency: String,
    pub invoice_id: Uuid,
    pub channel: Option<String>,
    pub notes: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Input for applying a credit note to an invoice.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyCreditNote {
    pub credit_note_id: Uuid,
    pub amount: Decimal,
}
