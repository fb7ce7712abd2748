//! Outbound notification collaborator.
//!
//! This core decides whether a customer confirmation should fire; the
//! notification system owns delivery, retries and throttling.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::NotificationConfig;
use crate::error::AppError;
use crate::models::EcommerceOrder;

#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Ask the notification system to send an order payment confirmation
    /// to the customer.
    async fn send_order_confirmation(&self, order: &EcommerceOrder) -> Result<(), AppError>;
}

/// HTTP client for the notification system.
#[derive(Clone)]
pub struct HttpNotificationService {
    client: Client,
    config: NotificationConfig,
}

impl HttpNotificationService {
    pub fn new(config: NotificationConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }
}

#[async_trait]
impl NotificationService for HttpNotificationService {
    async fn send_order_confirmation(&self, order: &EcommerceOrder) -> Result<(), AppError> {
        let url = format!("{}/notifications/order-confirmation", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "order_id": order.order_id,
                "order_number": order.order_number,
                "customer_name": order.customer_name,
                "customer_email": order.customer_email,
                "total": order.total,
            }))
            .send()
            .await
            .map_err(|e| {
                AppError::BadGateway(format!("Notification service call failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::BadGateway(format!(
                "Notification service returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}
