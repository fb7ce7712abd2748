//! Gateway webhook intake.
//!
//! Verifies the HMAC signature over the raw body before trusting anything
//! in the payload, then funnels recognized charge events into the
//! settlement pipeline. Recognized events are always acknowledged with
//! 200 once the signature checks out, including duplicates and
//! data-integrity faults, so the gateway stops redelivering.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::error::AppError;
use crate::services::metrics::ERRORS_TOTAL;
use crate::services::paystack::SUCCESS_STATUS;
use crate::services::PaymentEvent;
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Paystack webhook handler.
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing {} header", SIGNATURE_HEADER);
            AppError::AuthenticationFailure(anyhow::anyhow!("Missing webhook signature"))
        })?;

    let is_valid = state.paystack.verify_webhook_signature(&body, signature)?;
    if !is_valid {
        return Err(AppError::AuthenticationFailure(anyhow::anyhow!(
            "Invalid webhook signature"
        )));
    }

    let event = state.paystack.parse_webhook_event(&body)?;

    tracing::info!(event_type = %event.event, "Processing gateway webhook");

    match event.event.as_str() {
        "charge.success" => {
            let data = event.data;

            if data.status != SUCCESS_STATUS {
                tracing::warn!(
                    reference = %data.reference,
                    status = %data.status,
                    "charge.success event with non-success charge status, ignoring"
                );
                return Ok(StatusCode::OK);
            }

            let Some(invoice_id) = data.metadata.invoice_id else {
                ERRORS_TOTAL.with_label_values(&["missing_invoice"]).inc();
                tracing::error!(
                    reference = %data.reference,
                    "Charge carries no invoice_id metadata; needs manual reconciliation"
                );
                return Ok(StatusCode::OK);
            };

            let payment_event = PaymentEvent {
                reference: data.reference.clone(),
                amount_minor: data.amount,
                currency: data.currency.unwrap_or_else(|| "NGN".to_string()),
                invoice_id,
                customer_id: data.metadata.customer_id,
                channel: data.channel,
            };

            match state.settlement.settle("webhook", payment_event).await {
                Ok(_) => {}
                Err(AppError::NotFound(e)) => {
                    // Data-integrity fault, not transient: acknowledge so
                    // the gateway stops retrying, reconcile manually.
                    ERRORS_TOTAL
                        .with_label_values(&["invoice_not_found"])
                        .inc();
                    tracing::error!(
                        reference = %data.reference,
                        error = %e,
                        "Invoice for webhook payment not found; needs manual reconciliation"
                    );
                }
                Err(e) => {
                    // Transient faults propagate; the gateway will retry
                    // and idempotency makes the retry harmless.
                    return Err(e);
                }
            }
        }
        _ => {
            tracing::debug!(event_type = %event.event, "Unhandled webhook event type");
        }
    }

    Ok(StatusCode::OK)
}
