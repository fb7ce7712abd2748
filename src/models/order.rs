//! Storefront order model, correlated to invoices by order number.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::PaymentStatus;

/// Order lifecycle status. Cancellation is sticky: a late payment
/// confirmation never moves a cancelled order back to processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "processing" => OrderStatus::Processing,
            "completed" => OrderStatus::Completed,
            "cancelled" => OrderStatus::Cancelled,
            _ => OrderStatus::Pending,
        }
    }
}

/// Storefront order. `order_number` equals the settled invoice's number
/// when the order originated the invoice; the correlation is by value,
/// not by foreign key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EcommerceOrder {
    pub order_id: Uuid,
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub status: String,
    pub payment_status: String,
    pub total: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl EcommerceOrder {
    pub fn status(&self) -> OrderStatus {
        OrderStatus::from_string(&self.status)
    }

    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.payment_status)
    }
}

/// Result of mirroring invoice settlement onto a correlated order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSyncResult {
    pub order: EcommerceOrder,
    /// Idempotency gate for the customer confirmation: true only the
    /// first time the order is seen transitioning to paid.
    pub notify_customer: bool,
}
