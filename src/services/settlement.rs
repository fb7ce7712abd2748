//! Settlement pipeline: idempotency guard, ledger write, invoice
//! recomputation, and post-commit side effects (commission trigger and
//! order correlation sync).
//!
//! Status derivation is kept as pure functions of ledger totals so the
//! thresholds and transition edges are testable without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    ApplyCreditNote, CreditNoteApplication, Invoice, OrderStatus, OrderSyncResult, Payment,
    PaymentStatus, RecordGatewayPayment, SettlementResult,
};
use crate::services::metrics::{
    COMMISSIONS_TRIGGERED_TOTAL, ERRORS_TOTAL, NOTIFICATIONS_TOTAL, PAYMENTS_TOTAL,
    SETTLEMENTS_TOTAL,
};
use crate::services::{CommissionService, NotificationService};

/// Storage seam for the settlement pipeline. Implemented by
/// [`crate::services::Database`]; the pipeline itself only depends on this
/// trait so its duplicate handling and side-effect gating can be exercised
/// against in-memory ledgers.
#[async_trait]
pub trait SettlementLedger: Send + Sync {
    async fn find_payment_by_reference(&self, reference: &str)
        -> Result<Option<Payment>, AppError>;

    async fn record_gateway_payment(
        &self,
        input: &RecordGatewayPayment,
    ) -> Result<(Payment, Invoice, SettlementResult), AppError>;

    async fn apply_credit_note(
        &self,
        invoice_id: Uuid,
        input: &ApplyCreditNote,
    ) -> Result<(CreditNoteApplication, Invoice, SettlementResult), AppError>;

    async fn recompute_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<(Invoice, SettlementResult), AppError>;

    async fn sync_order_for_invoice(
        &self,
        invoice_number: &str,
    ) -> Result<Option<OrderSyncResult>, AppError>;
}

/// Tolerance absorbing rounding drift from minor-unit conversion. Applied
/// to every paid-status check and to the `amount_paid + amount_due ==
/// total` invariant.
pub static SETTLEMENT_EPSILON: Lazy<Decimal> = Lazy::new(|| Decimal::new(1, 2));

/// Derive an invoice's payment status from its total and the sum of all
/// allocations and credit applications. Checks, in order: nothing paid,
/// then the three equivalent fully-paid conditions (tolerating rounding
/// from either direction), then partially paid.
pub fn derive_status(total: Decimal, total_paid: Decimal) -> PaymentStatus {
    if total_paid.is_zero() {
        return PaymentStatus::Unpaid;
    }
    let due = amount_due(total, total_paid);
    if (total_paid - total).abs() < *SETTLEMENT_EPSILON
        || total_paid >= total
        || due <= *SETTLEMENT_EPSILON
    {
        return PaymentStatus::Paid;
    }
    PaymentStatus::PartiallyPaid
}

/// Outstanding amount, floored at zero (overpayment never goes negative).
pub fn amount_due(total: Decimal, total_paid: Decimal) -> Decimal {
    (total - total_paid).max(Decimal::ZERO)
}

/// True only for the edge from a non-paid status into paid. A repeated
/// recomputation of an already-paid invoice is not a transition.
pub fn has_transitioned(previous: PaymentStatus, next: PaymentStatus) -> bool {
    previous != PaymentStatus::Paid && next == PaymentStatus::Paid
}

/// Paid date is a function of current ledger state: stamped on the
/// transition, preserved while the invoice stays paid, cleared otherwise.
pub fn next_paid_date(
    next: PaymentStatus,
    transitioned: bool,
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match next {
        PaymentStatus::Paid => {
            if transitioned {
                Some(now)
            } else {
                previous.or(Some(now))
            }
        }
        _ => None,
    }
}

/// Planned mutation for a correlated storefront order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSyncPlan {
    pub next_status: OrderStatus,
    pub notify_customer: bool,
}

/// Decide how invoice settlement mirrors onto an order. An order whose
/// payment status is already paid is the idempotency gate for the customer
/// confirmation; a cancelled order keeps its status even when a late
/// payment confirmation lands.
pub fn plan_order_sync(status: OrderStatus, payment_status: PaymentStatus) -> OrderSyncPlan {
    if payment_status == PaymentStatus::Paid {
        return OrderSyncPlan {
            next_status: status,
            notify_customer: false,
        };
    }
    let next_status = if status == OrderStatus::Cancelled {
        OrderStatus::Cancelled
    } else {
        OrderStatus::Processing
    };
    OrderSyncPlan {
        next_status,
        notify_customer: true,
    }
}

/// A confirmed gateway payment event, normalized from either intake.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub reference: String,
    /// Gateway-reported amount in minor units.
    pub amount_minor: i64,
    pub currency: String,
    pub invoice_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub channel: Option<String>,
}

/// Outcome of running a payment event through the pipeline.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// A payment with this reference already exists; nothing was written.
    AlreadyProcessed { payment: Payment },
    Settled {
        payment: Payment,
        invoice: Invoice,
        settlement: SettlementResult,
        order_synced: bool,
        notify_customer: bool,
    },
}

/// Orchestrates the ledger write and the post-commit side effects. Both
/// intake handlers terminate here, so webhook push and verification pull
/// converge on identical ledger behavior.
#[derive(Clone)]
pub struct SettlementService {
    ledger: Arc<dyn SettlementLedger>,
    commissions: Arc<dyn CommissionService>,
    notifier: Arc<dyn NotificationService>,
}

impl SettlementService {
    pub fn new(
        ledger: Arc<dyn SettlementLedger>,
        commissions: Arc<dyn CommissionService>,
        notifier: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            ledger,
            commissions,
            notifier,
        }
    }

    /// Run a confirmed payment event through guard, ledger, recompute and
    /// side effects. Safe to invoke any number of times for the same
    /// reference.
    pub async fn settle(
        &self,
        source: &str,
        event: PaymentEvent,
    ) -> Result<SettlementOutcome, AppError> {
        // Fast-path short circuit; the unique constraint on
        // payments.reference remains the authoritative guard.
        if let Some(existing) = self.ledger.find_payment_by_reference(&event.reference).await? {
            tracing::info!(
                reference = %event.reference,
                payment_id = %existing.payment_id,
                "Payment reference already processed"
            );
            PAYMENTS_TOTAL
                .with_label_values(&[source, "duplicate"])
                .inc();
            return Ok(SettlementOutcome::AlreadyProcessed { payment: existing });
        }

        let notes = match event.customer_id {
            Some(customer_id) => format!(
                "Gateway payment for invoice {} (customer {})",
                event.invoice_id, customer_id
            ),
            None => format!("Gateway payment for invoice {}", event.invoice_id),
        };

        let input = RecordGatewayPayment {
            reference: event.reference.clone(),
            amount_minor: event.amount_minor,
            currency: event.currency.clone(),
            invoice_id: event.invoice_id,
            channel: event.channel.clone(),
            notes: Some(notes),
            metadata: Some(serde_json::json!({
                "invoice_id": event.invoice_id,
                "customer_id": event.customer_id,
            })),
        };

        let (payment, invoice, settlement) = match self.ledger.record_gateway_payment(&input).await {
            Ok(result) => result,
            Err(AppError::DuplicateReference(reference)) => {
                // Lost the insert race to a concurrent delivery of the
                // same event; the winner did the work.
                tracing::info!(
                    reference = %reference,
                    "Concurrent duplicate delivery, treating as no-op"
                );
                PAYMENTS_TOTAL
                    .with_label_values(&[source, "duplicate"])
                    .inc();
                let payment = self
                    .ledger
                    .find_payment_by_reference(&reference)
                    .await?
                    .ok_or_else(|| {
                        AppError::InternalError(anyhow::anyhow!(
                            "Payment missing after duplicate reference {}",
                            reference
                        ))
                    })?;
                return Ok(SettlementOutcome::AlreadyProcessed { payment });
            }
            Err(e) => return Err(e),
        };

        PAYMENTS_TOTAL.with_label_values(&[source, "settled"]).inc();
        SETTLEMENTS_TOTAL
            .with_label_values(&[settlement.status.as_str()])
            .inc();

        tracing::info!(
            payment_id = %payment.payment_id,
            payment_number = %payment.payment_number,
            reference = %payment.reference,
            invoice_id = %invoice.invoice_id,
            status = %settlement.status.as_str(),
            transitioned = settlement.transitioned,
            "Payment settled"
        );

        let (order_synced, notify_customer) = self.run_side_effects(&invoice, &settlement).await;

        Ok(SettlementOutcome::Settled {
            payment,
            invoice,
            settlement,
            order_synced,
            notify_customer,
        })
    }

    /// Apply a credit note against an invoice through the same recompute
    /// and side-effect path; a credit application can itself be the
    /// transition into paid.
    pub async fn apply_credit_note(
        &self,
        invoice_id: Uuid,
        input: &ApplyCreditNote,
    ) -> Result<(Invoice, SettlementResult), AppError> {
        let (application, invoice, settlement) =
            self.ledger.apply_credit_note(invoice_id, input).await?;

        SETTLEMENTS_TOTAL
            .with_label_values(&[settlement.status.as_str()])
            .inc();

        tracing::info!(
            application_id = %application.application_id,
            credit_note_id = %application.credit_note_id,
            invoice_id = %invoice.invoice_id,
            amount = %application.amount,
            status = %settlement.status.as_str(),
            "Credit note applied"
        );

        self.run_side_effects(&invoice, &settlement).await;

        Ok((invoice, settlement))
    }

    /// Recompute an invoice from its ledger without new allocations
    /// (operator reconciliation). Idempotent: a second call with no new
    /// ledger rows yields the same result with `transitioned = false`.
    pub async fn recompute(
        &self,
        invoice_id: Uuid,
    ) -> Result<(Invoice, SettlementResult), AppError> {
        let (invoice, settlement) = self.ledger.recompute_invoice(invoice_id).await?;

        SETTLEMENTS_TOTAL
            .with_label_values(&[settlement.status.as_str()])
            .inc();

        self.run_side_effects(&invoice, &settlement).await;

        Ok((invoice, settlement))
    }

    /// Commission trigger and order correlation sync. Runs after the
    /// settlement transaction has committed; failures here are logged and
    /// never roll back the ledger.
    async fn run_side_effects(
        &self,
        invoice: &Invoice,
        settlement: &SettlementResult,
    ) -> (bool, bool) {
        if settlement.transitioned {
            match self
                .commissions
                .create_commissions_for_invoice(invoice.invoice_id, invoice.owner_user_id)
                .await
            {
                Ok(()) => {
                    COMMISSIONS_TRIGGERED_TOTAL.with_label_values(&["ok"]).inc();
                    tracing::info!(
                        invoice_id = %invoice.invoice_id,
                        acting_user_id = %invoice.owner_user_id,
                        "Commissions created for paid invoice"
                    );
                }
                Err(e) => {
                    COMMISSIONS_TRIGGERED_TOTAL
                        .with_label_values(&["error"])
                        .inc();
                    ERRORS_TOTAL.with_label_values(&["commission"]).inc();
                    tracing::error!(
                        invoice_id = %invoice.invoice_id,
                        error = %e,
                        "Commission creation failed; settlement stands, retriable by operators"
                    );
                }
            }
        }

        if settlement.status != PaymentStatus::Paid {
            return (false, false);
        }

        match self
            .ledger
            .sync_order_for_invoice(&invoice.invoice_number)
            .await
        {
            Ok(Some(sync)) => {
                if sync.notify_customer {
                    match self.notifier.send_order_confirmation(&sync.order).await {
                        Ok(()) => {
                            NOTIFICATIONS_TOTAL.with_label_values(&["ok"]).inc();
                        }
                        Err(e) => {
                            NOTIFICATIONS_TOTAL.with_label_values(&["error"]).inc();
                            ERRORS_TOTAL.with_label_values(&["notification"]).inc();
                            tracing::error!(
                                order_id = %sync.order.order_id,
                                error = %e,
                                "Customer confirmation dispatch failed"
                            );
                        }
                    }
                } else {
                    NOTIFICATIONS_TOTAL.with_label_values(&["skipped"]).inc();
                }
                (true, sync.notify_customer)
            }
            Ok(None) => {
                // Not every invoice originates from the storefront.
                tracing::debug!(
                    invoice_number = %invoice.invoice_number,
                    "No storefront order correlated to invoice"
                );
                (false, false)
            }
            Err(e) => {
                ERRORS_TOTAL.with_label_values(&["order_sync"]).inc();
                tracing::error!(
                    invoice_number = %invoice.invoice_number,
                    error = %e,
                    "Order sync failed after settlement commit"
                );
                (false, false)
            }
        }
    }
}
