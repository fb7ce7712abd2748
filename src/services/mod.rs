//! Services for settlement-service.

pub mod commission;
pub mod database;
pub mod metrics;
pub mod notification;
pub mod paystack;
pub mod settlement;

pub use commission::{CommissionService, HttpCommissionService};
pub use database::Database;
pub use notification::{HttpNotificationService, NotificationService};
pub use paystack::PaystackClient;
pub use settlement::{PaymentEvent, SettlementLedger, SettlementOutcome, SettlementService};
