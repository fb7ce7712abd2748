//! Settlement pipeline tests against an in-memory ledger.
//!
//! These exercise the pipeline's duplicate handling and side-effect
//! gating end to end: counting collaborator doubles make it observable
//! how many commission triggers and customer confirmations a sequence
//! of payment events actually produces.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use settlement_service::error::AppError;
use settlement_service::models::{
    ApplyCreditNote, CreditNoteApplication, EcommerceOrder, Invoice, OrderSyncResult, Payment,
    PaymentStatus, RecordGatewayPayment, SettlementResult,
};
use settlement_service::services::settlement::{
    amount_due, derive_status, has_transitioned, next_paid_date, plan_order_sync, PaymentEvent,
    SettlementLedger, SettlementOutcome, SettlementService,
};
use settlement_service::services::{CommissionService, NotificationService};

/// Ledger over plain maps, recomputing invoices with the same status
/// derivation the database-backed ledger uses.
#[derive(Default)]
struct InMemoryLedger {
    invoices: Mutex<HashMap<Uuid, Invoice>>,
    payments: Mutex<HashMap<String, Payment>>,
    totals: Mutex<HashMap<Uuid, Decimal>>,
    orders: Mutex<HashMap<String, EcommerceOrder>>,
    payment_seq: AtomicUsize,
}

impl InMemoryLedger {
    fn with_invoice(invoice: Invoice) -> Self {
        let ledger = Self::default();
        ledger
            .invoices
            .lock()
            .unwrap()
            .insert(invoice.invoice_id, invoice);
        ledger
    }

    fn add_order(&self, order: EcommerceOrder) {
        self.orders
            .lock()
            .unwrap()
            .insert(order.order_number.clone(), order);
    }

    fn payment_count(&self) -> usize {
        self.payments.lock().unwrap().len()
    }

    fn order(&self, order_number: &str) -> EcommerceOrder {
        self.orders
            .lock()
            .unwrap()
            .get(order_number)
            .cloned()
            .expect("order seeded")
    }

    fn settle_invoice(&self, invoice_id: Uuid) -> Result<(Invoice, SettlementResult), AppError> {
        let total_paid = self
            .totals
            .lock()
            .unwrap()
            .get(&invoice_id)
            .copied()
            .unwrap_or(Decimal::ZERO);

        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices.get_mut(&invoice_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
        })?;

        let previous = invoice.payment_status();
        let status = derive_status(invoice.total, total_paid);
        let due = amount_due(invoice.total, total_paid);
        let transitioned = has_transitioned(previous, status);
        let paid_date = next_paid_date(status, transitioned, invoice.paid_date, Utc::now());

        invoice.amount_paid = total_paid;
        invoice.amount_due = due;
        invoice.payment_status = status.as_str().to_string();
        invoice.paid_date = paid_date;

        Ok((
            invoice.clone(),
            SettlementResult {
                amount_paid: total_paid,
                amount_due: due,
                status,
                transitioned,
                paid_date,
            },
        ))
    }
}

#[async_trait]
impl SettlementLedger for InMemoryLedger {
    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, AppError> {
        Ok(self.payments.lock().unwrap().get(reference).cloned())
    }

    async fn record_gateway_payment(
        &self,
        input: &RecordGatewayPayment,
    ) -> Result<(Payment, Invoice, SettlementResult), AppError> {
        if self.payments.lock().unwrap().contains_key(&input.reference) {
            return Err(AppError::DuplicateReference(input.reference.clone()));
        }
        if !self
            .invoices
            .lock()
            .unwrap()
            .contains_key(&input.invoice_id)
        {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Invoice {} not found",
                input.invoice_id
            )));
        }

        let amount = Decimal::new(input.amount_minor, 2);
        let seq = self.payment_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let payment = Payment {
            payment_id: Uuid::new_v4(),
            payment_number: format!("PAY-{:06}", seq),
            reference: input.reference.clone(),
            amount,
            currency: input.currency.clone(),
            channel: input.channel.clone(),
            notes: input.notes.clone(),
            metadata: input.metadata.clone(),
            created_utc: Utc::now(),
        };
        self.payments
            .lock()
            .unwrap()
            .insert(payment.reference.clone(), payment.clone());

        *self
            .totals
            .lock()
            .unwrap()
            .entry(input.invoice_id)
            .or_insert(Decimal::ZERO) += amount;

        let (invoice, settlement) = self.settle_invoice(input.invoice_id)?;
        Ok((payment, invoice, settlement))
    }

    async fn apply_credit_note(
        &self,
        invoice_id: Uuid,
        input: &ApplyCreditNote,
    ) -> Result<(CreditNoteApplication, Invoice, SettlementResult), AppError> {
        if !self.invoices.lock().unwrap().contains_key(&invoice_id) {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Invoice {} not found",
                invoice_id
            )));
        }

        *self
            .totals
            .lock()
            .unwrap()
            .entry(invoice_id)
            .or_insert(Decimal::ZERO) += input.amount;

        let application = CreditNoteApplication {
            application_id: Uuid::new_v4(),
            credit_note_id: input.credit_note_id,
            invoice_id,
            amount: input.amount,
            created_utc: Utc::now(),
        };
        let (invoice, settlement) = self.settle_invoice(invoice_id)?;
        Ok((application, invoice, settlement))
    }

    async fn recompute_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<(Invoice, SettlementResult), AppError> {
        self.settle_invoice(invoice_id)
    }

    async fn sync_order_for_invoice(
        &self,
        invoice_number: &str,
    ) -> Result<Option<OrderSyncResult>, AppError> {
        let mut orders = self.orders.lock().unwrap();
        let Some(order) = orders.get_mut(invoice_number) else {
            return Ok(None);
        };

        let plan = plan_order_sync(order.status(), order.payment_status());
        if !plan.notify_customer {
            return Ok(Some(OrderSyncResult {
                order: order.clone(),
                notify_customer: false,
            }));
        }

        order.status = plan.next_status.as_str().to_string();
        order.payment_status = PaymentStatus::Paid.as_str().to_string();
        order.updated_utc = Utc::now();

        Ok(Some(OrderSyncResult {
            order: order.clone(),
            notify_customer: true,
        }))
    }
}

#[derive(Default)]
struct CountingCommissions {
    calls: AtomicUsize,
}

#[async_trait]
impl CommissionService for CountingCommissions {
    async fn create_commissions_for_invoice(
        &self,
        _invoice_id: Uuid,
        _acting_user_id: Uuid,
    ) -> Result<(), AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingCommissions;

#[async_trait]
impl CommissionService for FailingCommissions {
    async fn create_commissions_for_invoice(
        &self,
        _invoice_id: Uuid,
        _acting_user_id: Uuid,
    ) -> Result<(), AppError> {
        Err(AppError::BadGateway(
            "Commission service returned 503".to_string(),
        ))
    }
}

#[derive(Default)]
struct CountingNotifier {
    calls: AtomicUsize,
}

#[async_trait]
impl NotificationService for CountingNotifier {
    async fn send_order_confirmation(&self, _order: &EcommerceOrder) -> Result<(), AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn unpaid_invoice(total_minor: i64) -> Invoice {
    Invoice {
        invoice_id: Uuid::new_v4(),
        invoice_number: "INV-1001".to_string(),
        customer_id: Uuid::new_v4(),
        owner_user_id: Uuid::new_v4(),
        currency: "NGN".to_string(),
        total: Decimal::new(total_minor, 2),
        amount_paid: Decimal::ZERO,
        amount_due: Decimal::new(total_minor, 2),
        payment_status: "unpaid".to_string(),
        paid_date: None,
        metadata: None,
        created_utc: Utc::now(),
    }
}

fn storefront_order(order_number: &str, status: &str, total_minor: i64) -> EcommerceOrder {
    let now = Utc::now();
    EcommerceOrder {
        order_id: Uuid::new_v4(),
        order_number: order_number.to_string(),
        customer_name: "Jo Customer".to_string(),
        customer_email: "jo@example.com".to_string(),
        status: status.to_string(),
        payment_status: "unpaid".to_string(),
        total: Decimal::new(total_minor, 2),
        created_utc: now,
        updated_utc: now,
    }
}

fn event(reference: &str, amount_minor: i64, invoice_id: Uuid) -> PaymentEvent {
    PaymentEvent {
        reference: reference.to_string(),
        amount_minor,
        currency: "NGN".to_string(),
        invoice_id,
        customer_id: None,
        channel: Some("card".to_string()),
    }
}

fn pipeline(
    ledger: Arc<InMemoryLedger>,
) -> (
    SettlementService,
    Arc<CountingCommissions>,
    Arc<CountingNotifier>,
) {
    let commissions = Arc::new(CountingCommissions::default());
    let notifier = Arc::new(CountingNotifier::default());
    let service = SettlementService::new(ledger, commissions.clone(), notifier.clone());
    (service, commissions, notifier)
}

#[tokio::test]
async fn resubmitted_reference_is_a_no_op() {
    let invoice = unpaid_invoice(10000);
    let invoice_id = invoice.invoice_id;
    let ledger = Arc::new(InMemoryLedger::with_invoice(invoice));
    ledger.add_order(storefront_order("INV-1001", "pending", 10000));
    let (service, commissions, notifier) = pipeline(ledger.clone());

    let first = service
        .settle("webhook", event("R-100", 10000, invoice_id))
        .await
        .expect("first delivery settles");
    assert!(matches!(first, SettlementOutcome::Settled { .. }));

    let second = service
        .settle("webhook", event("R-100", 10000, invoice_id))
        .await
        .expect("redelivery is accepted");
    assert!(matches!(second, SettlementOutcome::AlreadyProcessed { .. }));

    // One payment row, one commission trigger, one customer confirmation.
    assert_eq!(ledger.payment_count(), 1);
    assert_eq!(commissions.calls.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn partial_payment_settles_without_side_effects() {
    let invoice = unpaid_invoice(10000);
    let invoice_id = invoice.invoice_id;
    let ledger = Arc::new(InMemoryLedger::with_invoice(invoice));
    ledger.add_order(storefront_order("INV-1001", "pending", 10000));
    let (service, commissions, notifier) = pipeline(ledger.clone());

    let outcome = service
        .settle("webhook", event("R-200", 4000, invoice_id))
        .await
        .expect("partial payment settles");

    match outcome {
        SettlementOutcome::Settled {
            settlement,
            order_synced,
            notify_customer,
            ..
        } => {
            assert_eq!(settlement.status, PaymentStatus::PartiallyPaid);
            assert_eq!(settlement.amount_due, Decimal::new(6000, 2));
            assert!(!settlement.transitioned);
            assert!(!order_synced);
            assert!(!notify_customer);
        }
        other => panic!("expected settled outcome, got {:?}", other),
    }

    assert_eq!(commissions.calls.load(Ordering::SeqCst), 0);
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    let order = ledger.order("INV-1001");
    assert_eq!(order.status, "pending");
    assert_eq!(order.payment_status, "unpaid");
}

#[tokio::test]
async fn commission_fires_once_across_installments() {
    let invoice = unpaid_invoice(10000);
    let invoice_id = invoice.invoice_id;
    let ledger = Arc::new(InMemoryLedger::with_invoice(invoice));
    let (service, commissions, _notifier) = pipeline(ledger.clone());

    for (reference, amount) in [("R-301", 4000), ("R-302", 4000), ("R-303", 2000)] {
        service
            .settle("webhook", event(reference, amount, invoice_id))
            .await
            .expect("installment settles");
    }

    assert_eq!(ledger.payment_count(), 3);
    assert_eq!(commissions.calls.load(Ordering::SeqCst), 1);

    // An operator recompute after full payment is not a second transition.
    let (_invoice, settlement) = service.recompute(invoice_id).await.expect("recompute");
    assert_eq!(settlement.status, PaymentStatus::Paid);
    assert!(!settlement.transitioned);
    assert_eq!(commissions.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_invoice_records_nothing() {
    let ledger = Arc::new(InMemoryLedger::default());
    let (service, commissions, notifier) = pipeline(ledger.clone());

    let err = service
        .settle("verification", event("R-400", 10000, Uuid::new_v4()))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(ledger.payment_count(), 0);
    assert_eq!(commissions.calls.load(Ordering::SeqCst), 0);
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelled_order_keeps_status_when_payment_lands() {
    let invoice = unpaid_invoice(10000);
    let invoice_id = invoice.invoice_id;
    let ledger = Arc::new(InMemoryLedger::with_invoice(invoice));
    ledger.add_order(storefront_order("INV-1001", "cancelled", 10000));
    let (service, _commissions, notifier) = pipeline(ledger.clone());

    service
        .settle("webhook", event("R-500", 10000, invoice_id))
        .await
        .expect("payment settles");

    // The ledger records the money; the cancellation decision stands.
    let order = ledger.order("INV-1001");
    assert_eq!(order.status, "cancelled");
    assert_eq!(order.payment_status, "paid");
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn commission_failure_does_not_fail_settlement() {
    let invoice = unpaid_invoice(10000);
    let invoice_id = invoice.invoice_id;
    let ledger = Arc::new(InMemoryLedger::with_invoice(invoice));
    ledger.add_order(storefront_order("INV-1001", "pending", 10000));
    let notifier = Arc::new(CountingNotifier::default());
    let service = SettlementService::new(
        ledger.clone(),
        Arc::new(FailingCommissions),
        notifier.clone(),
    );

    let outcome = service
        .settle("webhook", event("R-600", 10000, invoice_id))
        .await
        .expect("settlement survives a commission outage");

    match outcome {
        SettlementOutcome::Settled { settlement, .. } => {
            assert_eq!(settlement.status, PaymentStatus::Paid);
            assert!(settlement.transitioned);
        }
        other => panic!("expected settled outcome, got {:?}", other),
    }

    // The confirmation still goes out; the commission retry is an
    // operator concern.
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
}
