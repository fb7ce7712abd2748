//! Data models for settlement-service.

mod invoice;
mod order;
mod payment;

pub use invoice::{Invoice, PaymentStatus, SettlementResult};
pub use order::{EcommerceOrder, OrderStatus, OrderSyncResult};
pub use payment::{
    ApplyCreditNote, CreditNoteApplication, Payment, PaymentAllocation, RecordGatewayPayment,
};
