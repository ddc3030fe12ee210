use actix_web::{http::StatusCode, test::TestRequest};

use super::{
    helpers::{json_body, send_request, TestBackend},
    mocks::accepting_gateway,
};
use crate::config::{WebhookConfig, DEFAULT_SIGNATURE_HEADER};

fn webhook_request(body: &str, header: &str, signature: &str) -> TestRequest {
    TestRequest::post()
        .uri("/webhook/gateway")
        .insert_header(("Content-Type", "application/json"))
        .insert_header((header.to_string(), signature.to_string()))
        .set_payload(body.to_string())
}

#[actix_web::test]
async fn unsigned_webhook_is_401() {
    let backend = TestBackend::new().await;
    let (_, gid) = backend.checkout("cust_300").await;
    let (body, _) = backend.signed_webhook("payment.captured", "pay_300", &gid, 11_500);
    let req = TestRequest::post().uri("/webhook/gateway").set_payload(body);
    let (status, body) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("The webhook signature is missing"));
}

#[actix_web::test]
async fn tampered_webhook_is_401() {
    let backend = TestBackend::new().await;
    let (_, gid) = backend.checkout("cust_301").await;
    let (body, signature) = backend.signed_webhook("payment.captured", "pay_301", &gid, 11_500);
    let body = body.replace("11500", "1");
    let req = webhook_request(&body, DEFAULT_SIGNATURE_HEADER, &signature);
    let (status, _) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn captured_webhook_pays_the_order() {
    let backend = TestBackend::new().await;
    let (order_id, gid) = backend.checkout("cust_302").await;
    let (body, signature) = backend.signed_webhook("payment.captured", "pay_302", &gid, 11_500);
    let req = webhook_request(&body, DEFAULT_SIGNATURE_HEADER, &signature);
    let (status, ack) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, r#"{"received":true,"outcome":"applied"}"#);

    // Redelivery is acknowledged but changes nothing
    let req = webhook_request(&body, DEFAULT_SIGNATURE_HEADER, &signature);
    let (status, ack) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, r#"{"received":true,"outcome":"no_op"}"#);

    let req = TestRequest::get().uri(&format!("/api/orders/{order_id}"));
    let (_, summary) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    let summary = json_body(&summary);
    assert_eq!(summary["order"]["payment_status"], "paid");
    assert_eq!(summary["transactions"][0]["status"], "success");
    assert_eq!(summary["transactions"][0]["webhook_event_count"], 2);
}

#[actix_web::test]
async fn signature_header_is_configurable() {
    let backend = TestBackend::new().await;
    let (_, gid) = backend.checkout("cust_303").await;
    let config = WebhookConfig { signature_header: "X-Webhook-Signature".to_string(), ..WebhookConfig::default() };
    let (body, signature) = backend.signed_webhook("payment.authorized", "pay_303", &gid, 11_500);

    let req = webhook_request(&body, DEFAULT_SIGNATURE_HEADER, &signature);
    let (status, _) = send_request(req, backend.configure(accepting_gateway(), config.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = webhook_request(&body, "X-Webhook-Signature", &signature);
    let (status, ack) = send_request(req, backend.configure(accepting_gateway(), config)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, r#"{"received":true,"outcome":"applied"}"#);
}

#[actix_web::test]
async fn unprocessable_webhooks_are_still_acknowledged() {
    let backend = TestBackend::new().await;
    let body = "this is not json";
    let signature = backend.validator.sign_webhook(body.as_bytes());
    let req = webhook_request(body, DEFAULT_SIGNATURE_HEADER, &signature);
    let (status, ack) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&ack)["outcome"], "ignored");
}
