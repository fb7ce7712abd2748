//! Outbound commission collaborator.
//!
//! The commission system owns commission records and their lifecycle;
//! this core only asks it to create commissions for a freshly paid
//! invoice. The trait seam keeps the trigger testable with fakes.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use uuid::Uuid;

use crate::config::CommissionConfig;
use crate::error::AppError;

#[async_trait]
pub trait CommissionService: Send + Sync {
    /// Create commission records for a fully paid invoice. Invoked at
    /// most once per invoice, on the paid transition.
    async fn create_commissions_for_invoice(
        &self,
        invoice_id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<(), AppError>;
}

/// HTTP client for the commission system.
#[derive(Clone)]
pub struct HttpCommissionService {
    client: Client,
    config: CommissionConfig,
}

impl HttpCommissionService {
    pub fn new(config: CommissionConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }
}

#[async_trait]
impl CommissionService for HttpCommissionService {
    async fn create_commissions_for_invoice(
        &self,
        invoice_id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<(), AppError> {
        let url = format!("{}/commissions/invoice", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "invoice_id": invoice_id,
                "acting_user_id": acting_user_id,
            }))
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("Commission service call failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::BadGateway(format!(
                "Commission service returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}
