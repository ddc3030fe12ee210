use actix_web::{http::StatusCode, test::TestRequest};

use super::{
    helpers::{json_body, send_request, TestBackend},
    mocks::accepting_gateway,
};
use crate::config::WebhookConfig;

#[actix_web::test]
async fn unknown_order_is_404() {
    let backend = TestBackend::new().await;
    let req = TestRequest::get().uri("/api/orders/31337");
    let (status, body) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"Order 31337 does not exist"}"#);

    let req = TestRequest::get().uri("/api/orders/31337/audit");
    let (status, _) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn order_summary_and_audit_trail() {
    let backend = TestBackend::new().await;
    let (order_id, gid) = backend.checkout("cust_500").await;

    let req = TestRequest::get().uri(&format!("/api/orders/{order_id}"));
    let (status, body) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::OK);
    let summary = json_body(&body);
    assert_eq!(summary["order"]["gateway_order_id"], gid.as_str());
    assert_eq!(summary["items"][0]["name"], "Darjeeling tea");
    assert_eq!(summary["items"][0]["line_total"], 10_000);
    assert_eq!(summary["transactions"][0]["gateway_order_id"], gid.as_str());
    assert_eq!(summary["transactions"][0]["webhook_event_count"], 0);

    let req = TestRequest::get().uri(&format!("/api/orders/{order_id}/audit"));
    let (status, body) = send_request(req, backend.configure(accepting_gateway(), WebhookConfig::default())).await;
    assert_eq!(status, StatusCode::OK);
    let entries = json_body(&body);
    let events = entries
        .as_array()
        .expect("audit trail is a list")
        .iter()
        .filter_map(|e| e["event"].as_str())
        .collect::<Vec<_>>();
    assert_eq!(events, vec!["order_created", "gateway_order_created"]);
}
