//! Database service for settlement-service.
//!
//! All SQL lives here. The settlement-critical operations wrap the
//! allocation insert, recomputation and status write in a single
//! transaction with a `FOR UPDATE` lock on the invoice row, so two
//! concurrent payments cannot both observe a pre-update status and both
//! claim the paid transition.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    ApplyCreditNote, CreditNoteApplication, EcommerceOrder, Invoice, OrderSyncResult, Payment,
    PaymentAllocation, PaymentStatus, RecordGatewayPayment, SettlementResult,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::settlement::{self, SettlementLedger};

const INVOICE_COLUMNS: &str = "invoice_id, invoice_number, customer_id, owner_user_id, currency, \
     total, amount_paid, amount_due, payment_status, paid_date, metadata, created_utc";

const PAYMENT_COLUMNS: &str =
    "payment_id, payment_number, reference, amount, currency, channel, notes, metadata, created_utc";

const ORDER_COLUMNS: &str = "order_id, order_number, customer_name, customer_email, status, \
     payment_status, total, created_utc, updated_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "settlement-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Idempotency Guard
    // -------------------------------------------------------------------------

    /// Look up a payment by its external gateway reference. Read-only
    /// fast path; the unique constraint on `payments.reference` remains
    /// the authoritative guard against concurrent duplicates.
    #[instrument(skip(self), fields(reference = %reference))]
    pub async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_payment_by_reference"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find payment: {}", e)))?;

        timer.observe_duration();

        Ok(payment)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Get an invoice by ID.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = $1"
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    // -------------------------------------------------------------------------
    // Payment Allocation Ledger
    // -------------------------------------------------------------------------

    /// Record a confirmed gateway payment: one payment row, one
    /// allocation for the full amount against the target invoice, and the
    /// settlement recomputation, all in a single transaction.
    ///
    /// A unique violation on the reference maps to
    /// [`AppError::DuplicateReference`] (the caller treats it as a
    /// no-op); a missing invoice maps to [`AppError::NotFound`].
    #[instrument(skip(self, input), fields(reference = %input.reference, invoice_id = %input.invoice_id))]
    pub async fn record_gateway_payment(
        &self,
        input: &RecordGatewayPayment,
    ) -> Result<(Payment, Invoice, SettlementResult), AppError> {
        if input.amount_minor <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must be positive"
            )));
        }
        if input.reference.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment reference must not be empty"
            )));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_gateway_payment"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let invoice = Self::lock_invoice(&mut tx, input.invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", input.invoice_id))
            })?;

        // Minor units to decimal with scale 2; money never touches f64.
        let amount = Decimal::new(input.amount_minor, 2);

        let payment_id = Uuid::new_v4();
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (payment_id, payment_number, reference, amount, currency, channel, notes, metadata)
            VALUES ($1, next_payment_number(), $2, $3, $4, $5, $6, $7)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .bind(&input.reference)
        .bind(amount)
        .bind(&input.currency)
        .bind(&input.channel)
        .bind(&input.notes)
        .bind(&input.metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::DuplicateReference(input.reference.clone())
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert payment: {}", e)),
        })?;

        // Gateway payments settle a single invoice in full.
        Self::allocate_payment(&mut tx, &payment, invoice.invoice_id, payment.amount).await?;

        let total_paid = Self::ledger_total(&mut tx, invoice.invoice_id).await?;
        let (invoice, settlement) = Self::write_settlement(&mut tx, invoice, total_paid).await?;

        tx.commit().await?;

        timer.observe_duration();

        info!(
            payment_id = %payment.payment_id,
            payment_number = %payment.payment_number,
            reference = %payment.reference,
            amount = %payment.amount,
            "Gateway payment recorded"
        );

        Ok((payment, invoice, settlement))
    }

    /// Apply a credit note against an invoice and recompute, in one
    /// transaction. Credit applications contribute to the paid total
    /// exactly like payment allocations.
    #[instrument(skip(self, input), fields(invoice_id = %invoice_id, credit_note_id = %input.credit_note_id))]
    pub async fn apply_credit_note(
        &self,
        invoice_id: Uuid,
        input: &ApplyCreditNote,
    ) -> Result<(CreditNoteApplication, Invoice, SettlementResult), AppError> {
        if input.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Credit application amount must be positive"
            )));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_credit_note"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let invoice = Self::lock_invoice(&mut tx, invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
            })?;

        let application_id = Uuid::new_v4();
        let application = sqlx::query_as::<_, CreditNoteApplication>(
            r#"
            INSERT INTO credit_note_applications (application_id, credit_note_id, invoice_id, amount)
            VALUES ($1, $2, $3, $4)
            RETURNING application_id, credit_note_id, invoice_id, amount, created_utc
            "#,
        )
        .bind(application_id)
        .bind(input.credit_note_id)
        .bind(invoice.invoice_id)
        .bind(input.amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to apply credit note: {}", e))
        })?;

        let total_paid = Self::ledger_total(&mut tx, invoice.invoice_id).await?;
        let (invoice, settlement) = Self::write_settlement(&mut tx, invoice, total_paid).await?;

        tx.commit().await?;

        timer.observe_duration();

        Ok((application, invoice, settlement))
    }

    // -------------------------------------------------------------------------
    // Invoice Settlement State Machine
    // -------------------------------------------------------------------------

    /// Recompute an invoice's paid/due amounts and status from its ledger
    /// without adding allocations. Idempotent.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn recompute_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<(Invoice, SettlementResult), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["recompute_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let invoice = Self::lock_invoice(&mut tx, invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
            })?;

        let total_paid = Self::ledger_total(&mut tx, invoice.invoice_id).await?;
        let (invoice, settlement) = Self::write_settlement(&mut tx, invoice, total_paid).await?;

        tx.commit().await?;

        timer.observe_duration();

        Ok((invoice, settlement))
    }

    // -------------------------------------------------------------------------
    // Order Correlation Sync
    // -------------------------------------------------------------------------

    /// Mirror invoice settlement onto the storefront order whose number
    /// equals the invoice number. Value-based lookup; no match is a valid
    /// no-op. Returns the order and the customer-notification intent.
    #[instrument(skip(self), fields(invoice_number = %invoice_number))]
    pub async fn sync_order_for_invoice(
        &self,
        invoice_number: &str,
    ) -> Result<Option<OrderSyncResult>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["sync_order_for_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, EcommerceOrder>(&format!(
            "SELECT {ORDER_COLUMNS} FROM ecommerce_orders WHERE order_number = $1 FOR UPDATE"
        ))
        .bind(invoice_number)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find order: {}", e)))?;

        let Some(order) = order else {
            tx.commit().await?;
            timer.observe_duration();
            return Ok(None);
        };

        let plan = settlement::plan_order_sync(order.status(), order.payment_status());

        if !plan.notify_customer {
            // Already mirrored by an earlier event; nothing to write and
            // no second confirmation.
            tx.commit().await?;
            timer.observe_duration();
            return Ok(Some(OrderSyncResult {
                order,
                notify_customer: false,
            }));
        }

        let updated = sqlx::query_as::<_, EcommerceOrder>(&format!(
            r#"
            UPDATE ecommerce_orders
            SET status = $2, payment_status = $3, updated_utc = NOW()
            WHERE order_id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.order_id)
        .bind(plan.next_status.as_str())
        .bind(PaymentStatus::Paid.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sync order: {}", e)))?;

        tx.commit().await?;

        timer.observe_duration();

        info!(
            order_id = %updated.order_id,
            order_number = %updated.order_number,
            status = %updated.status,
            notify_customer = plan.notify_customer,
            "Order synced from invoice settlement"
        );

        Ok(Some(OrderSyncResult {
            order: updated,
            notify_customer: plan.notify_customer,
        }))
    }

    // -------------------------------------------------------------------------
    // Transaction helpers
    // -------------------------------------------------------------------------

    /// Lock an invoice row for the duration of the transaction. This is
    /// the per-invoice serialization point for recomputation.
    async fn lock_invoice(
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = $1 FOR UPDATE"
        ))
        .bind(invoice_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock invoice: {}", e)))?;

        Ok(invoice)
    }

    /// Insert an allocation, enforcing that a payment's allocations never
    /// sum past the payment amount.
    async fn allocate_payment(
        tx: &mut Transaction<'_, Postgres>,
        payment: &Payment,
        invoice_id: Uuid,
        amount: Decimal,
    ) -> Result<PaymentAllocation, AppError> {
        let allocated: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM payment_allocations WHERE payment_id = $1",
        )
        .bind(payment.payment_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to sum allocations: {}", e))
        })?;

        if allocated + amount > payment.amount {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Allocation of {} would exceed payment amount {} (already allocated {})",
                amount,
                payment.amount,
                allocated
            )));
        }

        let allocation_id = Uuid::new_v4();
        let allocation = sqlx::query_as::<_, PaymentAllocation>(
            r#"
            INSERT INTO payment_allocations (allocation_id, payment_id, invoice_id, amount)
            VALUES ($1, $2, $3, $4)
            RETURNING allocation_id, payment_id, invoice_id, amount, created_utc
            "#,
        )
        .bind(allocation_id)
        .bind(payment.payment_id)
        .bind(invoice_id)
        .bind(amount)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert allocation: {}", e))
        })?;

        Ok(allocation)
    }

    /// Sum of all allocations and credit applications for an invoice,
    /// read inside the caller's transaction.
    async fn ledger_total(
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
    ) -> Result<Decimal, AppError> {
        let total_paid: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE((SELECT SUM(amount) FROM payment_allocations WHERE invoice_id = $1), 0)
                 + COALESCE((SELECT SUM(amount) FROM credit_note_applications WHERE invoice_id = $1), 0)
            "#,
        )
        .bind(invoice_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to sum ledger: {}", e))
        })?;

        Ok(total_paid)
    }

    /// Derive status, due amount and paid date from the ledger total and
    /// write them back. `transitioned` compares against the status read
    /// under the row lock, not caller state.
    async fn write_settlement(
        tx: &mut Transaction<'_, Postgres>,
        invoice: Invoice,
        total_paid: Decimal,
    ) -> Result<(Invoice, SettlementResult), AppError> {
        let previous = invoice.payment_status();
        let status = settlement::derive_status(invoice.total, total_paid);
        let due = settlement::amount_due(invoice.total, total_paid);
        let transitioned = settlement::has_transitioned(previous, status);
        let paid_date =
            settlement::next_paid_date(status, transitioned, invoice.paid_date, Utc::now());

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET amount_paid = $2, amount_due = $3, payment_status = $4, paid_date = $5
            WHERE invoice_id = $1
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice.invoice_id)
        .bind(total_paid)
        .bind(due)
        .bind(status.as_str())
        .bind(paid_date)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to write settlement: {}", e))
        })?;

        Ok((
            invoice,
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
impl SettlementLedger for Database {
    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, AppError> {
        Database::find_payment_by_reference(self, reference).await
    }

    async fn record_gateway_payment(
        &self,
        input: &RecordGatewayPayment,
    ) -> Result<(Payment, Invoice, SettlementResult), AppError> {
        Database::record_gateway_payment(self, input).await
    }

    async fn apply_credit_note(
        &self,
        invoice_id: Uuid,
        input: &ApplyCreditNote,
    ) -> Result<(CreditNoteApplication, Invoice, SettlementResult), AppError> {
        Database::apply_credit_note(self, invoice_id, input).await
    }

    async fn recompute_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<(Invoice, SettlementResult), AppError> {
        Database::recompute_invoice(self, invoice_id).await
    }

    async fn sync_order_for_invoice(
        &self,
        invoice_number: &str,
    ) -> Result<Option<OrderSyncResult>, AppError> {
        Database::sync_order_for_invoice(self, invoice_number).await
    }
}
