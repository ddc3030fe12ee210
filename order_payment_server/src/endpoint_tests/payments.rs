use actix_web::{http::StatusCode, test::TestRequest};

use super::{
    helpers::{json_body, send_request, TestBackend},
    mocks::accepting_gateway,
};
use crate::config::WebhookConfig;

#[actix_web::test]
async fn valid_confirmation_marks_the_order_paid() {
    let backend = TestBackend::new().await;
    let (order_id, gid) = backend.checkout("cust_200").await;
    let confirmation = backend.signed_confirmation(order_id, &gid, "pay_200");
    let req = TestRequest::post().uri("/api/payments/verify").set_json(&confirmation);
    let (status, body) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["idempotent"], false);
    assert_eq!(body["order"]["payment_status"], "paid");
    assert_eq!(body["order"]["status"], "processing");
    assert_eq!(body["order"]["gateway_payment_id"], "pay_200");
    let captured_at = body["order"]["captured_at"].clone();

    // The browser retries. Nothing changes and the caller is told so.
    let req = TestRequest::post().uri("/api/payments/verify").set_json(&confirmation);
    let (status, body) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["idempotent"], true);
    assert_eq!(body["order"]["captured_at"], captured_at);
}

#[actix_web::test]
async fn forged_confirmation_is_401() {
    let backend = TestBackend::new().await;
    let (order_id, gid) = backend.checkout("cust_201").await;
    let mut confirmation = backend.signed_confirmation(order_id, &gid, "pay_201");
    confirmation["gateway_signature"] = "0".repeat(64).into();
    let req = TestRequest::post().uri("/api/payments/verify").set_json(&confirmation);
    let (status, body) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json_body(&body)["error"].as_str().is_some_and(|s| s.starts_with("Signature verification failed.")));

    let req = TestRequest::get().uri(&format!("/api/orders/{order_id}"));
    let (status, body) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::OK);
    let summary = json_body(&body);
    assert_eq!(summary["order"]["status"], "payment_failed");
    assert_eq!(summary["order"]["payment_status"], "unpaid");
}

#[actix_web::test]
async fn confirmation_for_unknown_order_is_404() {
    let backend = TestBackend::new().await;
    let confirmation = backend.signed_confirmation(4242, "order_nope", "pay_nope");
    let req = TestRequest::post().uri("/api/payments/verify").set_json(&confirmation);
    let (status, body) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"Order 4242 does not exist"}"#);
}

#[actix_web::test]
async fn confirmation_for_another_gateway_order_is_400() {
    let backend = TestBackend::new().await;
    let (order_id, _) = backend.checkout("cust_202").await;
    let confirmation = backend.signed_confirmation(order_id, "order_someone_else", "pay_202");
    let req = TestRequest::post().uri("/api/payments/verify").set_json(&confirmation);
    let (status, _) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
