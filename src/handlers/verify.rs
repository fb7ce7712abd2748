//! Client-initiated verification intake.
//!
//! The reference alone is never trusted: the transaction is confirmed
//! against the gateway's verify API, and only a success status reaches the
//! same settlement pipeline the webhook uses.

use axum::{
    extract::{Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::metrics::ERRORS_TOTAL;
use crate::services::paystack::SUCCESS_STATUS;
use crate::services::{PaymentEvent, SettlementOutcome};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    pub reference: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub reference: String,
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_due: Option<Decimal>,
}

/// Verify a transaction with the gateway and settle it.
pub async fn verify_payment(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    if params.reference.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Missing payment reference"
        )));
    }

    let data = state.paystack.verify_transaction(&params.reference).await?;

    if data.status != SUCCESS_STATUS {
        tracing::info!(
            reference = %params.reference,
            gateway_status = %data.status,
            "Gateway did not confirm transaction"
        );
        return Err(AppError::GatewayVerificationFailure {
            gateway_status: data.status,
        });
    }

    let Some(invoice_id) = data.metadata.invoice_id else {
        // The charge is genuinely paid but cannot be settled against an
        // invoice; record for manual reconciliation rather than telling
        // the customer their payment failed.
        tracing::error!(
            reference = %params.reference,
            "Verified charge carries no invoice_id metadata; needs manual reconciliation"
        );
        return Ok(Json(pending_reconciliation(params.reference)));
    };

    let event = PaymentEvent {
        reference: data.reference.clone(),
        amount_minor: data.amount,
        currency: data.currency.unwrap_or_else(|| "NGN".to_string()),
        invoice_id,
        customer_id: data.metadata.customer_id,
        channel: data.channel,
    };

    let outcome = state.settlement.settle("verification", event).await;
    let response = settlement_response(params.reference, invoice_id, outcome)?;

    Ok(Json(response))
}

/// Map the pipeline outcome to the customer-facing response. The charge
/// is already captured at this point, so a missing invoice is not the
/// customer's failure: it is logged for manual reconciliation and
/// reported as a confirmed payment, never as a 404.
fn settlement_response(
    reference: String,
    invoice_id: Uuid,
    outcome: Result<SettlementOutcome, AppError>,
) -> Result<VerifyPaymentResponse, AppError> {
    match outcome {
        Ok(SettlementOutcome::AlreadyProcessed { payment }) => Ok(VerifyPaymentResponse {
            reference: payment.reference,
            status: "success".to_string(),
            message: "Payment already recorded".to_string(),
            payment_number: Some(payment.payment_number),
            invoice_id: Some(invoice_id),
            payment_status: None,
            amount_due: None,
        }),
        Ok(SettlementOutcome::Settled {
            payment,
            invoice,
            settlement,
            ..
        }) => Ok(VerifyPaymentResponse {
            reference: payment.reference,
            status: "success".to_string(),
            message: "Payment verified and settled".to_string(),
            payment_number: Some(payment.payment_number),
            invoice_id: Some(invoice.invoice_id),
            payment_status: Some(settlement.status.as_str().to_string()),
            amount_due: Some(settlement.amount_due),
        }),
        Err(AppError::NotFound(e)) => {
            ERRORS_TOTAL.with_label_values(&["invoice_not_found"]).inc();
            tracing::error!(
                reference = %reference,
                invoice_id = %invoice_id,
                error = %e,
                "Verified charge references an unknown invoice; needs manual reconciliation"
            );
            Ok(pending_reconciliation(reference))
        }
        Err(e) => Err(e),
    }
}

/// Response for a charge the gateway confirmed but the ledger could not
/// settle automatically.
fn pending_reconciliation(reference: String) -> VerifyPaymentResponse {
    VerifyPaymentResponse {
        reference,
        status: "success".to_string(),
        message: "Payment confirmed; settlement pending reconciliation".to_string(),
        payment_number: None,
        invoice_id: None,
        payment_status: None,
        amount_due: None,
    }
}
