use actix_web::{http::StatusCode, test::TestRequest};
use order_payment_engine::traits::{GatewayError, GatewayRefund};
use serde_json::json;

use super::{
    helpers::{json_body, send_request, TestBackend},
    mocks::{accepting_gateway, MockGateway},
};
use crate::config::WebhookConfig;

/// Checks out and pays an order with total 11500. Returns the order id.
async fn paid_order(backend: &TestBackend, customer_id: &str) -> i64 {
    let (order_id, gid) = backend.checkout(customer_id).await;
    let confirmation = backend.signed_confirmation(order_id, &gid, &format!("pay_{customer_id}"));
    let req = TestRequest::post().uri("/api/payments/verify").set_json(&confirmation);
    let (status, _) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::OK);
    order_id
}

fn refunding_gateway() -> MockGateway {
    let mut gateway = accepting_gateway();
    gateway.expect_create_refund().times(1).returning(|req| {
        Ok(GatewayRefund {
            id: "rfnd_ep1".to_string(),
            payment_id: req.payment_id,
            amount: req.amount,
            status: "processed".to_string(),
        })
    });
    gateway
}

#[actix_web::test]
async fn full_refund() {
    let backend = TestBackend::new().await;
    let order_id = paid_order(&backend, "cust_400").await;
    let req = TestRequest::post()
        .uri(&format!("/api/orders/{order_id}/refund"))
        .insert_header(("X-Operator-Id", "ops_amara"))
        .set_json(json!({"reason": "Damaged in transit"}));
    let (status, body) = send_request(req, backend.configure(refunding_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["refund"]["amount"], 11_500);
    assert_eq!(body["refund"]["refund_type"], "full");
    assert_eq!(body["refund"]["status"], "processed");
    assert_eq!(body["refund"]["gateway_refund_id"], "rfnd_ep1");
    assert_eq!(body["refund"]["initiated_by"], "ops_amara");
    assert_eq!(body["order"]["status"], "refunded");

    // A second refund never reaches the gateway
    let mut gateway = accepting_gateway();
    gateway.expect_create_refund().never();
    let req = TestRequest::post().uri(&format!("/api/orders/{order_id}/refund")).set_json(json!({}));
    let (status, _) = send_request(req, backend.configure(gateway, WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn refund_above_total_is_rejected() {
    let backend = TestBackend::new().await;
    let order_id = paid_order(&backend, "cust_401").await;
    let mut gateway = accepting_gateway();
    gateway.expect_create_refund().never();
    let req = TestRequest::post()
        .uri(&format!("/api/orders/{order_id}/refund"))
        .set_json(json!({"amount": 11_501, "reason": "Goodwill"}));
    let (status, _) = send_request(req, backend.configure(gateway, WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn partial_refund_defaults_to_system_operator() {
    let backend = TestBackend::new().await;
    let order_id = paid_order(&backend, "cust_402").await;
    let req = TestRequest::post()
        .uri(&format!("/api/orders/{order_id}/refund"))
        .set_json(json!({"amount": 2_000, "reason": "Late delivery"}));
    let (status, body) = send_request(req, backend.configure(refunding_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["refund"]["refund_type"], "partial");
    assert_eq!(body["refund"]["initiated_by"], "system");
}

#[actix_web::test]
async fn failed_refund_is_502_and_not_retried() {
    let backend = TestBackend::new().await;
    let order_id = paid_order(&backend, "cust_403").await;
    let mut gateway = accepting_gateway();
    gateway
        .expect_create_refund()
        .times(1)
        .returning(|_| Err(GatewayError::Unavailable { status: 500, message: "Internal error".to_string() }));
    let req = TestRequest::post().uri(&format!("/api/orders/{order_id}/refund")).set_json(json!({}));
    let (status, _) = send_request(req, backend.configure(gateway, WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let req = TestRequest::get().uri(&format!("/api/orders/{order_id}"));
    let (_, summary) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    let summary = json_body(&summary);
    assert_eq!(summary["order"]["payment_status"], "paid");
    assert_eq!(summary["refunds"][0]["status"], "failed");
}

#[actix_web::test]
async fn unpaid_orders_cannot_be_refunded() {
    let backend = TestBackend::new().await;
    let (order_id, _) = backend.checkout("cust_404").await;
    let mut gateway = accepting_gateway();
    gateway.expect_create_refund().never();
    let req = TestRequest::post().uri(&format!("/api/orders/{order_id}/refund")).set_json(json!({}));
    let (status, _) = send_request(req, backend.configure(gateway, WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
