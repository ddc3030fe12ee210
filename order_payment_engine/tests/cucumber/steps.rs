use cucumber::{then, when};
use order_payment_engine::{
    db_types::{MinorUnits, OrderStatusType, PaymentStatus, TransactionStatus},
    objects::{CheckoutRequest, RefundRequest, WebhookOutcome},
    test_utils::system::test_address,
    traits::{AuditManagement, OrderManagement, TransactionManagement},
    PaymentFlowError,
};

use crate::cucumber::PaymentWorld;

//--------------------------------------       Checkout        ---------------------------------------------------------
async fn checkout(world: &mut PaymentWorld, customer_id: String, client_total: Option<i64>) {
    let request =
        CheckoutRequest { customer_id, shipping_address: test_address(), client_total: client_total.map(MinorUnits::from) };
    let result = world.system().checkout.checkout(request).await;
    if let Some(checkout) = world.record(result) {
        world.checkout = Some(checkout);
    }
}

#[when(expr = "customer '{word}' checks out")]
async fn check_out(world: &mut PaymentWorld, customer_id: String) {
    checkout(world, customer_id, None).await;
}

#[when(expr = "customer '{word}' checks out claiming a total of {int}")]
async fn check_out_with_total(world: &mut PaymentWorld, customer_id: String, total: i64) {
    checkout(world, customer_id, Some(total)).await;
}

#[then(expr = "the gateway received {int} order request(s)")]
async fn gateway_order_calls(world: &mut PaymentWorld, count: u32) {
    assert_eq!(world.system().gateway.order_calls(), count);
}

#[then(expr = "the gateway was asked to collect {int}")]
async fn gateway_order_amount(world: &mut PaymentWorld, amount: i64) {
    let requests = world.system().gateway.order_requests();
    let last = requests.last().expect("No gateway order was requested");
    assert_eq!(last.amount, MinorUnits::from(amount));
}

#[then(expr = "the order total is {int}")]
async fn order_total(world: &mut PaymentWorld, total: i64) {
    assert_eq!(world.checkout().order.total_amount, MinorUnits::from(total));
}

//--------------------------------------     Confirmation      ---------------------------------------------------------
#[when(expr = "the customer confirms payment '{word}' with a valid signature")]
async fn confirm_valid(world: &mut PaymentWorld, payment_id: String) {
    let confirmation = world.system().signed_confirmation(world.order_id(), &world.gateway_order_id(), &payment_id);
    let result = world.system().verifier.confirm_payment(confirmation).await;
    world.confirmation = world.record(result);
}

#[when(expr = "the customer confirms payment '{word}' with a forged signature")]
async fn confirm_forged(world: &mut PaymentWorld, payment_id: String) {
    let mut confirmation = world.system().signed_confirmation(world.order_id(), &world.gateway_order_id(), &payment_id);
    confirmation.gateway_signature = world.system().validator.sign_payment("order_forged", &payment_id);
    let result = world.system().verifier.confirm_payment(confirmation).await;
    world.confirmation = world.record(result);
}

#[when(expr = "the customer confirms payment '{word}' while the gateway sends the captured webhook")]
async fn confirm_and_webhook(world: &mut PaymentWorld, payment_id: String) {
    let sys = world.system();
    let gateway_order_id = world.gateway_order_id();
    let amount = world.checkout().order.total_amount.value();
    let confirmation = sys.signed_confirmation(world.order_id(), &gateway_order_id, &payment_id);
    let (body, sig) = sys.signed_webhook("payment.captured", &payment_id, &gateway_order_id, amount);
    let (confirmed, webhook) =
        tokio::join!(sys.verifier.confirm_payment(confirmation), sys.webhooks.process(body.as_bytes(), Some(&sig)));
    let webhook = webhook.expect("Webhook was rejected");
    world.webhook_outcome = Some(webhook);
    world.confirmation = world.record(confirmed);
}

#[then("the last confirmation was idempotent")]
async fn confirmation_idempotent(world: &mut PaymentWorld) {
    let confirmation = world.confirmation.as_ref().expect("No confirmation succeeded");
    assert!(confirmation.idempotent);
}

#[then("the last confirmation succeeded")]
async fn confirmation_succeeded(world: &mut PaymentWorld) {
    assert!(world.last_error.is_none(), "{:?}", world.last_error);
    assert!(world.confirmation.is_some());
}

//--------------------------------------        Webhooks       ---------------------------------------------------------
#[when(expr = "the gateway sends a '{word}' webhook for payment '{word}' of {int}")]
async fn send_webhook(world: &mut PaymentWorld, event: String, payment_id: String, amount: i64) {
    let gateway_order_id = world.gateway_order_id();
    let (body, sig) = world.system().signed_webhook(&event, &payment_id, &gateway_order_id, amount);
    let result = world.system().webhooks.process(body.as_bytes(), Some(&sig)).await;
    world.webhook_outcome = world.record(result);
}

#[when(expr = "the gateway transaction record for the order is lost")]
async fn lose_transaction(world: &mut PaymentWorld) {
    sqlx::query("DELETE FROM payment_transactions WHERE gateway_order_id = $1")
        .bind(world.gateway_order_id())
        .execute(world.system().db.pool())
        .await
        .expect("Error deleting transaction");
}

#[then(expr = "the webhook outcome is '{word}'")]
async fn webhook_outcome(world: &mut PaymentWorld, expected: String) {
    let outcome = world.webhook_outcome.as_ref().expect("No webhook was processed");
    let actual = match outcome {
        WebhookOutcome::Applied => "applied",
        WebhookOutcome::NoOp => "no_op",
        WebhookOutcome::Ignored(_) => "ignored",
        WebhookOutcome::Failed(_) => "failed",
    };
    assert_eq!(actual, expected, "{outcome:?}");
}

//--------------------------------------        Refunds        ---------------------------------------------------------
#[when(expr = "an operator refunds {int}")]
async fn refund_amount(world: &mut PaymentWorld, amount: i64) {
    let request = RefundRequest { amount: Some(MinorUnits::from(amount)), reason: Some("Customer request".into()) };
    let result = world.system().refunds.refund_order(world.order_id(), request, "operator_1").await;
    world.record(result);
}

#[when("an operator refunds the order in full")]
async fn refund_full(world: &mut PaymentWorld) {
    let result = world.system().refunds.refund_order(world.order_id(), RefundRequest::default(), "operator_1").await;
    world.record(result);
}

#[then(expr = "the gateway received {int} refund request(s)")]
async fn gateway_refund_calls(world: &mut PaymentWorld, count: u32) {
    assert_eq!(world.system().gateway.refund_calls(), count);
}

//--------------------------------------     Order state       ---------------------------------------------------------
#[then(expr = "the order is '{word}' and '{word}'")]
async fn order_state(world: &mut PaymentWorld, status: String, payment_status: String) {
    let order = world.system().db.fetch_order(world.order_id()).await.unwrap().expect("Order does not exist");
    assert_eq!(order.status, status.parse::<OrderStatusType>().unwrap());
    assert_eq!(order.payment_status, payment_status.parse::<PaymentStatus>().unwrap());
}

#[then(expr = "the payment transaction is '{word}'")]
async fn transaction_state(world: &mut PaymentWorld, status: String) {
    let tx = world
        .system()
        .db
        .fetch_transaction_by_gateway_order_id(&world.gateway_order_id())
        .await
        .unwrap()
        .expect("Transaction does not exist");
    assert_eq!(tx.status, status.parse::<TransactionStatus>().unwrap());
    assert_eq!(tx.order_id, Some(world.order_id()));
}

#[then(expr = "there is exactly {int} '{word}' audit entry for payment '{word}'")]
async fn audit_count(world: &mut PaymentWorld, count: usize, event: String, payment_id: String) {
    let entries = world.system().db.fetch_audit_entries_for_payment(&payment_id).await.unwrap();
    assert_eq!(entries.iter().filter(|e| e.event == event).count(), count, "{entries:#?}");
}

#[then(expr = "the request fails with a {word} error")]
async fn request_failed(world: &mut PaymentWorld, kind: String) {
    let err = world.last_error.as_ref().expect("The last request did not fail");
    let matched = match kind.as_str() {
        "validation" => matches!(err, PaymentFlowError::Validation(_)),
        "signature" => matches!(err, PaymentFlowError::SignatureVerification(_)),
        "conflict" => matches!(err, PaymentFlowError::Conflict(_)),
        "gateway" => matches!(err, PaymentFlowError::Gateway(_)),
        "not_found" => matches!(err, PaymentFlowError::NotFound(_)),
        _ => panic!("Unknown error kind {kind}"),
    };
    assert!(matched, "Expected a {kind} error, got {err:?}");
}
