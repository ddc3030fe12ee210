use actix_web::{http::StatusCode, test::TestRequest};
use order_payment_engine::traits::{GatewayError, GatewayOrder};
use serde_json::json;

use super::{
    helpers::{json_body, send_request, TestBackend},
    mocks::{accepting_gateway, MockGateway},
};
use crate::config::WebhookConfig;

#[actix_web::test]
async fn checkout_opens_a_gateway_order() {
    let backend = TestBackend::new().await;
    backend.fill_cart("cust_100").await;
    let mut gateway = MockGateway::new();
    gateway.expect_create_order().times(1).withf(|req| req.amount.value() == 11_500).returning(|req| {
        Ok(GatewayOrder {
            id: "order_ep1".to_string(),
            amount: req.amount,
            currency: req.currency,
            receipt: Some(req.receipt),
            status: "created".to_string(),
        })
    });
    let req = TestRequest::post().uri("/api/checkout").set_json(backend.checkout_request("cust_100"));
    let (status, body) = send_request(req, backend.configure(gateway, WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["gateway_order_id"], "order_ep1");
    assert_eq!(body["order"]["total_amount"], 11_500);
    assert_eq!(body["order"]["status"], "pending_payment");
    assert_eq!(body["transaction"]["status"], "pending");
}

#[actix_web::test]
async fn forged_client_total_is_rejected() {
    let backend = TestBackend::new().await;
    backend.fill_cart("cust_101").await;
    let mut gateway = MockGateway::new();
    gateway.expect_create_order().never();
    let mut request = backend.checkout_request("cust_101");
    request["client_total"] = json!(1);
    let req = TestRequest::post().uri("/api/checkout").set_json(request);
    let (status, body) = send_request(req, backend.configure(gateway, WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_body(&body)["error"].as_str().is_some_and(|s| s.starts_with("Invalid request.")));
}

#[actix_web::test]
async fn empty_cart_is_rejected() {
    let backend = TestBackend::new().await;
    let mut gateway = MockGateway::new();
    gateway.expect_create_order().never();
    let req = TestRequest::post().uri("/api/checkout").set_json(backend.checkout_request("cust_102"));
    let (status, body) = send_request(req, backend.configure(gateway, WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid request. The cart is empty"}"#);
}

#[actix_web::test]
async fn declined_checkout_is_402() {
    let backend = TestBackend::new().await;
    backend.fill_cart("cust_103").await;
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_order()
        .times(1)
        .returning(|_| Err(GatewayError::Rejected { status: 400, message: "Currency not enabled".to_string() }));
    let req = TestRequest::post().uri("/api/checkout").set_json(backend.checkout_request("cust_103"));
    let (status, _) = send_request(req, backend.configure(gateway, WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
}

#[actix_web::test]
async fn gateway_outage_is_502_after_retries() {
    let backend = TestBackend::new().await;
    backend.fill_cart("cust_104").await;
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_order()
        .times(3)
        .returning(|_| Err(GatewayError::Unavailable { status: 503, message: "Service unavailable".to_string() }));
    let req = TestRequest::post().uri("/api/checkout").set_json(backend.checkout_request("cust_104"));
    let (status, _) = send_request(req, backend.configure(gateway, WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[actix_web::test]
async fn failed_checkout_can_be_retried() {
    let backend = TestBackend::new().await;
    backend.fill_cart("cust_105").await;
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_order()
        .returning(|_| Err(GatewayError::Rejected { status: 400, message: "Card network down".to_string() }));
    let req = TestRequest::post().uri("/api/checkout").set_json(backend.checkout_request("cust_105"));
    let (status, _) = send_request(req, backend.configure(gateway, WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    let order_id: i64 = sqlx::query_scalar("SELECT id FROM orders WHERE customer_id = 'cust_105'")
        .fetch_one(backend.db.pool())
        .await
        .expect("order was stored");
    let req = TestRequest::post().uri(&format!("/api/orders/{order_id}/retry_payment"));
    let (status, body) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["gateway_order_id"], "order_ep1");

    let req = TestRequest::post().uri("/api/orders/99999/retry_payment");
    let (status, _) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
