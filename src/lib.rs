pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

use axum::{
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use config::Config;
use services::{
    Database, HttpCommissionService, HttpNotificationService, PaystackClient, SettlementService,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub paystack: PaystackClient,
    pub settlement: SettlementService,
}

pub struct Application {
    port: u16,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;

        db.run_migrations().await?;

        services::metrics::init_metrics();

        let paystack = PaystackClient::new(config.paystack.clone());
        if paystack.is_configured() {
            tracing::info!("Paystack client initialized");
        } else {
            tracing::warn!("Paystack secret key not configured - intake endpoints will reject");
        }

        let commissions = Arc::new(HttpCommissionService::new(config.commission.clone()));
        let notifier = Arc::new(HttpNotificationService::new(config.notification.clone()));
        let settlement = SettlementService::new(Arc::new(db.clone()), commissions, notifier);

        let state = AppState {
            db,
            config: config.clone(),
            paystack,
            settlement,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/metrics", get(handlers::metrics))
            // Intake endpoints
            .route("/webhooks/paystack", post(handlers::webhooks::paystack_webhook))
            .route("/payments/verify", get(handlers::verify::verify_payment))
            // Ledger lookups and operator endpoints
            .route("/payments/:reference", get(handlers::payments::get_payment))
            .route("/invoices/:id", get(handlers::invoices::get_invoice))
            .route(
                "/invoices/:id/credit-notes",
                post(handlers::invoices::apply_credit_note),
            )
            .route(
                "/invoices/:id/recompute",
                post(handlers::invoices::recompute_invoice),
            )
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        Ok(Self {
            port: config.server.port,
            router,
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
