use order_payment_engine::{
    db_types::{MinorUnits, NewRefund, OrderStatusType, PaymentStatus, RefundStatus, RefundType, TransactionStatus},
    objects::{CheckoutResult, RefundRequest},
    test_utils::PaymentSystem,
    traits::{DatabaseError, GatewayError, OrderManagement, RefundManagement, TransactionManagement},
    PaymentFlowError,
};

async fn paid_order(sys: &PaymentSystem, customer_id: &str, payment_id: &str) -> CheckoutResult {
    let checkout = sys.checkout_standard_order(customer_id).await;
    let confirmation = sys.signed_confirmation(checkout.order.id, &checkout.gateway_order_id, payment_id);
    sys.verifier.confirm_payment(confirmation).await.expect("Payment confirmation failed");
    checkout
}

fn refund_of(amount: Option<i64>) -> RefundRequest {
    RefundRequest { amount: amount.map(MinorUnits::from), reason: Some("Damaged in transit".into()) }
}

#[tokio::test]
async fn full_refund() {
    let sys = PaymentSystem::new().await;
    let checkout = paid_order(&sys, "alice", "pay_001").await;
    let result = sys.refunds.refund_order(checkout.order.id, RefundRequest::default(), "operator_1").await.unwrap();

    assert_eq!(result.refund.status, RefundStatus::Processed);
    assert_eq!(result.refund.refund_type, RefundType::Full);
    assert_eq!(result.refund.amount, MinorUnits::from(11_500));
    assert_eq!(result.refund.gateway_refund_id.as_deref(), Some("rfnd_gw1"));
    assert_eq!(result.refund.initiated_by, "operator_1");
    assert_eq!(result.order.status, OrderStatusType::Refunded);
    assert_eq!(result.order.payment_status, PaymentStatus::Unpaid);

    let requests = sys.gateway.refund_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].payment_id, "pay_001");
    assert_eq!(requests[0].amount, MinorUnits::from(11_500));

    let summary = sys.orders.order_summary(checkout.order.id).await.unwrap();
    assert_eq!(summary.transactions[0].transaction.status, TransactionStatus::Refunded);
    assert_eq!(summary.refunds.len(), 1);
    assert!(summary.notes.iter().any(|n| n.note.contains("rfnd_gw1")));
    let audit = sys.orders.audit_trail(checkout.order.id).await.unwrap();
    let refund_events =
        audit.iter().filter(|e| e.event.starts_with("refund_")).map(|e| e.event.as_str()).collect::<Vec<_>>();
    assert_eq!(refund_events, vec!["refund_initiated", "refund_processed"]);
    sys.cleanup().await;
}

#[tokio::test]
async fn partial_refund() {
    let sys = PaymentSystem::new().await;
    let checkout = paid_order(&sys, "bob", "pay_002").await;
    let result = sys.refunds.refund_order(checkout.order.id, refund_of(Some(5_000)), "operator_1").await.unwrap();
    assert_eq!(result.refund.refund_type, RefundType::Partial);
    assert_eq!(result.refund.amount, MinorUnits::from(5_000));
    assert_eq!(result.refund.reason.as_deref(), Some("Damaged in transit"));
    assert_eq!(result.order.status, OrderStatusType::Refunded);
    assert_eq!(sys.gateway.refund_requests()[0].amount, MinorUnits::from(5_000));
    sys.cleanup().await;
}

#[tokio::test]
async fn refund_amount_is_bounded_by_the_order_total() {
    let sys = PaymentSystem::new().await;
    let checkout = paid_order(&sys, "carol", "pay_003").await;
    for amount in [11_501, 0, -100] {
        let err = sys.refunds.refund_order(checkout.order.id, refund_of(Some(amount)), "operator_1").await.unwrap_err();
        assert!(matches!(err, PaymentFlowError::Validation(_)), "{amount}: {err:?}");
    }
    assert_eq!(sys.gateway.refund_calls(), 0);
    assert!(sys.db.fetch_refunds_for_order(checkout.order.id).await.unwrap().is_empty());
    let order = sys.db.fetch_order(checkout.order.id).await.unwrap().unwrap();
    assert!(order.is_paid());
    sys.cleanup().await;
}

#[tokio::test]
async fn only_captured_orders_can_be_refunded() {
    let sys = PaymentSystem::new().await;
    let unpaid = sys.checkout_standard_order("dave").await;
    let err = sys.refunds.refund_order(unpaid.order.id, RefundRequest::default(), "operator_1").await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::Validation(_)), "{err:?}");

    let err = sys.refunds.refund_order(12_345, RefundRequest::default(), "operator_1").await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::NotFound(_)), "{err:?}");
    assert_eq!(sys.gateway.refund_calls(), 0);
    sys.cleanup().await;
}

#[tokio::test]
async fn double_refund_never_reaches_the_gateway() {
    let sys = PaymentSystem::new().await;
    let checkout = paid_order(&sys, "erin", "pay_005").await;
    sys.refunds.refund_order(checkout.order.id, RefundRequest::default(), "operator_1").await.unwrap();
    let err = sys.refunds.refund_order(checkout.order.id, RefundRequest::default(), "operator_2").await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::Validation(_)), "{err:?}");
    assert_eq!(sys.gateway.refund_calls(), 1);
    sys.cleanup().await;
}

#[tokio::test]
async fn failed_refunds_are_not_retried() {
    let sys = PaymentSystem::new().await;
    let checkout = paid_order(&sys, "frank", "pay_006").await;
    sys.gateway.fail_next_refund(GatewayError::Unavailable { status: 503, message: "Service unavailable".into() });
    let err = sys.refunds.refund_order(checkout.order.id, RefundRequest::default(), "operator_1").await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::Gateway(_)), "{err:?}");
    assert_eq!(sys.gateway.refund_calls(), 1);

    let summary = sys.orders.order_summary(checkout.order.id).await.unwrap();
    assert_eq!(summary.order.status, OrderStatusType::Processing);
    assert_eq!(summary.order.payment_status, PaymentStatus::Paid);
    assert_eq!(summary.refunds.len(), 1);
    assert_eq!(summary.refunds[0].status, RefundStatus::Failed);
    assert!(summary.refunds[0].error_description.is_some());
    let audit = sys.orders.audit_trail(checkout.order.id).await.unwrap();
    assert!(audit.iter().any(|e| e.event == "refund_failed"));

    // An operator can try again by hand
    let result = sys.refunds.refund_order(checkout.order.id, RefundRequest::default(), "operator_1").await.unwrap();
    assert_eq!(result.refund.status, RefundStatus::Processed);
    assert_eq!(sys.gateway.refund_calls(), 2);
    sys.cleanup().await;
}

#[tokio::test]
async fn one_pending_refund_per_order() {
    let sys = PaymentSystem::new().await;
    let checkout = paid_order(&sys, "grace", "pay_007").await;
    let tx = sys.db.fetch_transaction_by_gateway_order_id(&checkout.gateway_order_id).await.unwrap().unwrap();
    let pending = NewRefund {
        order_id: checkout.order.id,
        payment_transaction_id: tx.id,
        amount: MinorUnits::from(1_000),
        refund_type: RefundType::Partial,
        reason: None,
        initiated_by: "operator_1".into(),
    };
    sys.db.insert_refund(pending.clone()).await.unwrap();
    let err = sys.db.insert_refund(pending).await.unwrap_err();
    assert!(matches!(err, DatabaseError::RefundInProgress(_)), "{err:?}");

    let err = sys.refunds.refund_order(checkout.order.id, RefundRequest::default(), "operator_2").await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::Validation(_)), "{err:?}");
    assert_eq!(sys.gateway.refund_calls(), 0);
    sys.cleanup().await;
}

#[tokio::test]
async fn refunded_orders_cannot_be_paid_again() {
    let sys = PaymentSystem::new().await;
    let checkout = paid_order(&sys, "heidi", "pay_008").await;
    sys.refunds.refund_order(checkout.order.id, RefundRequest::default(), "operator_1").await.unwrap();

    let confirmation = sys.signed_confirmation(checkout.order.id, &checkout.gateway_order_id, "pay_009");
    let err = sys.verifier.confirm_payment(confirmation).await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::Conflict(_)), "{err:?}");

    let (body, sig) = sys.signed_webhook("payment.captured", "pay_009", &checkout.gateway_order_id, 11_500);
    let outcome = sys.webhooks.process(body.as_bytes(), Some(&sig)).await.unwrap();
    assert_eq!(outcome, order_payment_engine::objects::WebhookOutcome::NoOp);
    let order = sys.db.fetch_order(checkout.order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Refunded);
    assert_eq!(order.payment_status, PaymentStatus::Unpaid);

    let err = sys.checkout.retry_payment(checkout.order.id).await.unwrap_err();
    assert!(matches!(err, PaymentFlowError::Conflict(_)), "{err:?}");
    sys.cleanup().await;
}
