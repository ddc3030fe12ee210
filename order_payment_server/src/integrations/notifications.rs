//! Posts paid and refunded orders to an external notification endpoint (a fulfilment service, say).
//!
//! Delivery is best effort. A failed delivery is logged and not retried, because the order state itself is never
//! affected by it.
use futures::future::BoxFuture;
use log::*;
use order_payment_engine::events::{EventHandlers, EventHooks, OrderPaidEvent, OrderRefundedEvent};
use reqwest::Client;
use serde_json::{json, Value};

pub const NOTIFICATION_EVENT_BUFFER_SIZE: usize = 25;

pub fn create_notification_handlers(url: &str) -> EventHandlers {
    let mut hooks = EventHooks::default();
    let client = Client::new();
    let paid_client = client.clone();
    let paid_url = url.to_string();
    // --- On OrderPaid Handler ---
    hooks.on_order_paid(move |ev| {
        let payload = order_paid_payload(&ev);
        let label = format!("order {} paid", ev.order.order_number);
        post_notification(paid_client.clone(), paid_url.clone(), payload, label)
    });
    // --- On OrderRefunded Handler ---
    let refunded_url = url.to_string();
    hooks.on_order_refunded(move |ev| {
        let payload = order_refunded_payload(&ev);
        let label = format!("order {} refunded", ev.order.order_number);
        post_notification(client.clone(), refunded_url.clone(), payload, label)
    });
    EventHandlers::new(NOTIFICATION_EVENT_BUFFER_SIZE, hooks)
}

fn post_notification(client: Client, url: String, payload: Value, label: String) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        match client.post(&url).json(&payload).send().await {
            Ok(res) if res.status().is_success() => info!("📬️ Notification sent: {label}"),
            Ok(res) => warn!("📬️ Notification endpoint answered {} for {label}", res.status()),
            Err(e) => error!("📬️ Could not send notification ({label}). {e}"),
        }
    })
}

pub fn order_paid_payload(ev: &OrderPaidEvent) -> Value {
    let order = &ev.order;
    json!({
        "event": "order_paid",
        "order_id": order.id,
        "order_number": order.order_number,
        "customer_id": order.customer_id,
        "total_amount": order.total_amount,
        "currency": order.currency,
        "gateway_payment_id": order.gateway_payment_id,
        "captured_at": order.captured_at,
    })
}

pub fn order_refunded_payload(ev: &OrderRefundedEvent) -> Value {
    let OrderRefundedEvent { order, refund } = ev;
    json!({
        "event": "order_refunded",
        "order_id": order.id,
        "order_number": order.order_number,
        "customer_id": order.customer_id,
        "refund_id": refund.gateway_refund_id,
        "refund_amount": refund.amount,
        "refund_type": refund.refund_type.as_str(),
        "currency": order.currency,
    })
}
