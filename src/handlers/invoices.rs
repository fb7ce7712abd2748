//! Invoice settlement handlers: credit note application and operator
//! recomputation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ApplyCreditNote, Invoice, SettlementResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SettlementResponse {
    pub invoice: Invoice,
    pub settlement: SettlementResult,
}

/// Get an invoice with its current settlement amounts.
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .db
        .get_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    Ok(Json(invoice))
}

/// Apply a credit note against an invoice. Runs the same recompute and
/// side-effect path as a payment; applying a credit can be the transition
/// into paid.
pub async fn apply_credit_note(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<ApplyCreditNote>,
) -> Result<(StatusCode, Json<SettlementResponse>), AppError> {
    let (invoice, settlement) = state
        .settlement
        .apply_credit_note(invoice_id, &payload)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SettlementResponse {
            invoice,
            settlement,
        }),
    ))
}

/// Recompute an invoice from its ledger (operator reconciliation).
/// Idempotent: without new ledger rows, a repeat call returns the same
/// amounts with `transitioned = false`.
pub async fn recompute_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<SettlementResponse>, AppError> {
    let (invoice, settlement) = state.settlement.recompute(invoice_id).await?;

    Ok(Json(SettlementResponse {
        invoice,
        settlement,
    }))
}
