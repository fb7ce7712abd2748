//! Payment lookup handlers.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::AppError;
use crate::models::Payment;
use crate::AppState;

/// Get a recorded payment by its gateway reference (status polling).
pub async fn get_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<Payment>, AppError> {
    let payment = state
        .db
        .find_payment_by_reference(&reference)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    Ok(Json(payment))
}
