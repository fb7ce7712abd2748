//! Gateway verification client tests against a mock Paystack API.

use secrecy::Secret;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use settlement_service::config::PaystackConfig;
use settlement_service::error::AppError;
use settlement_service::services::paystack::{PaystackClient, ABANDONED_STATUS, SUCCESS_STATUS};

fn client_for(server: &MockServer) -> PaystackClient {
    PaystackClient::new(PaystackConfig {
        secret_key: Secret::new("sk_test_secret".to_string()),
        api_base_url: server.uri(),
    })
}

#[tokio::test]
async fn verify_transaction_returns_charge_data_on_success() {
    let server = MockServer::start().await;
    let invoice_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/transaction/verify/R1"))
        .and(header("authorization", "Bearer sk_test_secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": {
                "reference": "R1",
                "amount": 10000,
                "status": "success",
                "currency": "NGN",
                "channel": "card",
                "metadata": { "invoice_id": invoice_id }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let data = client
        .verify_transaction("R1")
        .await
        .expect("verification should succeed");

    assert_eq!(data.reference, "R1");
    assert_eq!(data.amount, 10000);
    assert_eq!(data.status, SUCCESS_STATUS);
    assert_eq!(data.metadata.invoice_id, Some(invoice_id));
}

#[tokio::test]
async fn verify_transaction_surfaces_abandoned_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/transaction/verify/R2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": {
                "reference": "R2",
                "amount": 10000,
                "status": "abandoned"
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let data = client
        .verify_transaction("R2")
        .await
        .expect("API call itself succeeds");

    // The client reports the gateway's view verbatim; the intake handler
    // converts a non-success status into a verification failure.
    assert_eq!(data.status, ABANDONED_STATUS);
    assert_ne!(data.status, SUCCESS_STATUS);
}

#[tokio::test]
async fn verify_transaction_rejects_gateway_error_envelope() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/transaction/verify/R3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": false,
            "message": "Transaction reference not found",
            "data": null
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.verify_transaction("R3").await.unwrap_err();

    assert!(matches!(err, AppError::BadGateway(_)));
}

#[tokio::test]
async fn verify_transaction_rejects_http_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/transaction/verify/R4"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "status": false,
            "message": "Invalid key"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.verify_transaction("R4").await.unwrap_err();

    assert!(matches!(err, AppError::BadGateway(_)));
}

#[tokio::test]
async fn verify_transaction_rejects_malformed_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/transaction/verify/R5"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.verify_transaction("R5").await.unwrap_err();

    assert!(matches!(err, AppError::BadGateway(_)));
}
