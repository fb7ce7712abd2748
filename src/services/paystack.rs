//! Paystack gateway client.
//!
//! Implements webhook signature verification and the transaction
//! verification API used by the client-initiated intake.

use crate::config::PaystackConfig;
use crate::error::AppError;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::Sha512;
use std::time::Duration;
use uuid::Uuid;

/// Gateway status string that confirms a completed charge.
pub const SUCCESS_STATUS: &str = "success";

/// Gateway status string for a checkout the customer walked away from.
pub const ABANDONED_STATUS: &str = "abandoned";

/// Paystack client for webhook verification and the verify API.
#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    config: PaystackConfig,
}

/// Webhook event pushed by the gateway.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: ChargeData,
}

/// Charge payload carried by webhooks and the verify API alike.
#[derive(Debug, Deserialize)]
pub struct ChargeData {
    pub reference: String,
    /// Amount in minor units (kobo/cents).
    pub amount: i64,
    pub status: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub metadata: ChargeMetadata,
}

/// Correlation identifiers the storefront attaches when initializing a
/// charge. The gateway echoes them back verbatim.
#[derive(Debug, Default, Deserialize)]
pub struct ChargeMetadata {
    #[serde(default)]
    pub invoice_id: Option<Uuid>,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
}

/// Envelope returned by `GET /transaction/verify/{reference}`.
#[derive(Debug, Deserialize)]
struct VerifyEnvelope {
    status: bool,
    message: String,
    data: Option<ChargeData>,
}

impl PaystackClient {
    pub fn new(config: PaystackConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Check if the gateway is configured (secret key is set).
    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    /// Verify a webhook signature.
    ///
    /// The signature is computed as:
    /// `HMAC-SHA512(request_body, secret_key)`, hex-encoded.
    pub fn verify_webhook_signature(&self, body: &str, signature: &str) -> Result<bool, AppError> {
        let expected = self.compute_signature(body)?;
        let is_valid = expected == signature;

        if !is_valid {
            tracing::warn!("Webhook signature verification failed");
        }

        Ok(is_valid)
    }

    /// Parse a webhook event from the raw request body.
    pub fn parse_webhook_event(&self, body: &str) -> Result<WebhookEvent, AppError> {
        serde_json::from_str(body)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid webhook payload: {}", e)))
    }

    /// Confirm a transaction directly with the gateway. The reference
    /// alone is never trusted; the caller must check the returned
    /// `status` against [`SUCCESS_STATUS`].
    pub async fn verify_transaction(&self, reference: &str) -> Result<ChargeData, AppError> {
        if !self.is_configured() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Paystack secret key not configured"
            )));
        }

        let url = format!(
            "{}/transaction/verify/{}",
            self.config.api_base_url, reference
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("Gateway verification call failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::BadGateway(format!("Gateway response unreadable: {}", e)))?;

        tracing::debug!(status = %status, body = %body, "Paystack verify response");

        if !status.is_success() {
            return Err(AppError::BadGateway(format!(
                "Gateway verification returned {}: {}",
                status, body
            )));
        }

        let envelope: VerifyEnvelope = serde_json::from_str(&body)
            .map_err(|e| AppError::BadGateway(format!("Gateway response malformed: {}", e)))?;

        if !envelope.status {
            return Err(AppError::BadGateway(format!(
                "Gateway rejected verification: {}",
                envelope.message
            )));
        }

        envelope.data.ok_or_else(|| {
            AppError::BadGateway("Gateway verification returned no transaction data".to_string())
        })
    }

    /// Compute the hex HMAC-SHA512 of a payload with the secret key.
    fn compute_signature(&self, payload: &str) -> Result<String, AppError> {
        type HmacSha512 = Hmac<Sha512>;
        let mut mac =
            HmacSha512::new_from_slice(self.config.secret_key.expose_secret().as_bytes())
                .map_err(|_| AppError::ConfigError(anyhow::anyhow!("Invalid key length")))?;
        mac.update(payload.as_bytes());
        let result = mac.finalize();
        Ok(hex::encode(result.into_bytes()))
    }
}
