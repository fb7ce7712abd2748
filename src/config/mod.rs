use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub paystack: PaystackConfig,
    pub commission: CommissionConfig,
    pub notification: NotificationConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PaystackConfig {
    /// Secret key used both as the bearer token for the verification API
    /// and as the HMAC key for webhook signatures.
    pub secret_key: Secret<String>,
    pub api_base_url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct CommissionConfig {
    pub base_url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NotificationConfig {
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("SETTLEMENT_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SETTLEMENT_SERVICE_PORT")
            .unwrap_or_else(|_| "3007".to_string())
            .parse()?;

        let db_url =
            env::var("SETTLEMENT_DATABASE_URL").context("SETTLEMENT_DATABASE_URL must be set")?;
        let max_connections = env::var("SETTLEMENT_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("SETTLEMENT_DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let paystack_secret =
            env::var("PAYSTACK_SECRET_KEY").context("PAYSTACK_SECRET_KEY must be set")?;
        let paystack_base_url = env::var("PAYSTACK_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.paystack.co".to_string());

        let commission_base_url = env::var("COMMISSION_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:3008".to_string());
        let notification_base_url = env::var("NOTIFICATION_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:3006".to_string());

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            paystack: PaystackConfig {
                secret_key: Secret::new(paystack_secret),
                api_base_url: paystack_base_url,
            },
            commission: CommissionConfig {
                base_url: commission_base_url,
            },
            notification: NotificationConfig {
                base_url: notification_base_url,
            },
            service_name: "settlement-service".to_string(),
        })
    }
}
