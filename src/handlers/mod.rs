//! HTTP handlers for settlement-service.

pub mod invoices;
pub mod payments;
pub mod verify;
pub mod webhooks;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::services::metrics::get_metrics;

pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "settlement-service" })),
    )
}

pub async fn metrics() -> impl IntoResponse {
    (StatusCode::OK, get_metrics())
}
