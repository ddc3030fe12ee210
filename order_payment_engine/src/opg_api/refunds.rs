//! Operator-initiated refunds of captured payments.
//!
//! A refund is recorded as `pending` before the gateway is called, and at most one refund per order can be pending
//! at a time. Failed refunds are never retried automatically, since repeating a refund call risks paying out twice.
use std::{fmt::Debug, sync::Arc};

use log::*;
use serde_json::json;

use crate::{
    db_types::{
        AuditCategory,
        NewAuditEntry,
        NewRefund,
        NoteVisibility,
        Order,
        OrderStatusType,
        PaymentTransaction,
        Refund,
        RefundStatus,
        RefundType,
        TransactionStatus,
    },
    events::{EventProducers, OrderRefundedEvent},
    opg_api::{
        audit::AuditSink,
        errors::PaymentFlowError,
        objects::{RefundRequest, RefundResult},
    },
    traits::{GatewayRefundRequest, OrderPaymentDatabase, PaymentGateway},
};

pub struct RefundOrchestrator<B, G> {
    db: B,
    gateway: Arc<G>,
    audit: AuditSink<B>,
    producers: EventProducers,
}

impl<B, G> Debug for RefundOrchestrator<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundOrchestrator")
    }
}

impl<B: Clone, G> RefundOrchestrator<B, G> {
    pub fn new(db: B, gateway: Arc<G>) -> Self {
        let audit = AuditSink::new(db.clone());
        Self { db, gateway, audit, producers: EventProducers::default() }
    }

    pub fn with_producers(mut self, producers: EventProducers) -> Self {
        self.producers = producers;
        self
    }
}

impl<B, G> RefundOrchestrator<B, G>
where
    B: OrderPaymentDatabase,
    G: PaymentGateway,
{
    /// Refunds all or part of a captured order. The amount defaults to the order total.
    ///
    /// Every precondition is checked before the gateway is contacted. If the gateway call fails, the refund is
    /// marked as failed and the order stays paid.
    pub async fn refund_order(
        &self,
        order_id: i64,
        request: RefundRequest,
        initiated_by: &str,
    ) -> Result<RefundResult, PaymentFlowError> {
        let order =
            self.db.fetch_order(order_id).await?.ok_or_else(|| PaymentFlowError::NotFound(format!("Order {order_id}")))?;
        if order.status == OrderStatusType::Refunded {
            return Err(PaymentFlowError::Validation(format!("Order {} has already been refunded", order.order_number)));
        }
        let Some(payment_id) = order.gateway_payment_id.clone().filter(|_| order.is_captured()) else {
            return Err(PaymentFlowError::Validation(format!(
                "Order {} has no captured payment to refund",
                order.order_number
            )));
        };
        let amount = request.amount.unwrap_or(order.total_amount);
        if !amount.is_positive() {
            return Err(PaymentFlowError::Validation(format!("The refund amount must be positive, not {amount}")));
        }
        if amount > order.total_amount {
            return Err(PaymentFlowError::Validation(format!(
                "The refund amount of {amount} exceeds the order total of {}",
                order.total_amount
            )));
        }
        let refund_type = if amount == order.total_amount { RefundType::Full } else { RefundType::Partial };
        let transaction = self.captured_transaction(&order).await?;
        let existing = self.db.fetch_refunds_for_order(order.id).await?;
        if existing.iter().any(|r| r.status == RefundStatus::Pending) {
            return Err(PaymentFlowError::Validation(format!(
                "Order {} already has a refund in progress",
                order.order_number
            )));
        }

        let refund = self
            .db
            .insert_refund(NewRefund {
                order_id: order.id,
                payment_transaction_id: transaction.id,
                amount,
                refund_type,
                reason: request.reason.clone(),
                initiated_by: initiated_by.to_string(),
            })
            .await?;
        info!("💸️ {refund_type} refund #{} of {amount} for order {} initiated by {initiated_by}", refund.id, order.order_number);
        self.audit
            .record(
                NewAuditEntry::new(AuditCategory::Refund, "refund_initiated", initiated_by)
                    .for_order(order.id)
                    .with_gateway_payment_id(payment_id.as_str())
                    .with_details(format!("refund={} amount={amount} type={refund_type}", refund.id)),
            )
            .await;

        let gateway_request = GatewayRefundRequest {
            payment_id: payment_id.clone(),
            amount,
            notes: json!({
                "order_id": order.id.to_string(),
                "order_number": order.order_number,
                "refund_id": refund.id.to_string(),
                "reason": request.reason.unwrap_or_default(),
            }),
        };
        match self.gateway.create_refund(gateway_request).await {
            Ok(gateway_refund) => self.complete(refund, &payment_id, &gateway_refund.id, initiated_by).await,
            Err(e) => {
                error!("💸️ The gateway could not process refund #{} for order {}. {e}", refund.id, order.order_number);
                if let Err(db_err) = self.db.fail_refund(refund.id, &e.to_string()).await {
                    error!("💸️ Could not mark refund #{} as failed. {db_err}", refund.id);
                }
                self.audit
                    .record(
                        NewAuditEntry::new(AuditCategory::Refund, "refund_failed", initiated_by)
                            .for_order(order.id)
                            .with_gateway_payment_id(payment_id.as_str())
                            .with_details(format!("refund={} {e}", refund.id)),
                    )
                    .await;
                Err(PaymentFlowError::Gateway(e.to_string()))
            },
        }
    }

    async fn captured_transaction(&self, order: &Order) -> Result<PaymentTransaction, PaymentFlowError> {
        let transactions = self.db.fetch_transactions_for_order(order.id).await?;
        transactions
            .into_iter()
            .filter(|t| t.status == TransactionStatus::Success)
            .find(|t| t.gateway_payment_id == order.gateway_payment_id || Some(&t.gateway_order_id) == order.gateway_order_id.as_ref())
            .ok_or_else(|| {
                PaymentFlowError::Validation(format!("Order {} has no successful payment transaction", order.order_number))
            })
    }

    async fn complete(
        &self,
        refund: Refund,
        payment_id: &str,
        gateway_refund_id: &str,
        initiated_by: &str,
    ) -> Result<RefundResult, PaymentFlowError> {
        let (refund, order) = self.db.complete_refund(refund.id, gateway_refund_id).await?.ok_or_else(|| {
            PaymentFlowError::Conflict(format!("Refund #{} was no longer pending when the gateway confirmed it", refund.id))
        })?;
        info!(
            "💸️ Refund #{} of {} processed by the gateway as {gateway_refund_id}. Order {} is now {}",
            refund.id, refund.amount, order.order_number, order.status
        );
        let note = format!("Refund of {} {} processed ({gateway_refund_id})", refund.amount, order.currency);
        if let Err(e) = self.db.add_order_note(order.id, NoteVisibility::Admin, &note).await {
            warn!("💸️ Could not add refund note to order {}. {e}", order.order_number);
        }
        self.audit
            .record(
                NewAuditEntry::new(AuditCategory::Refund, "refund_processed", initiated_by)
                    .for_order(order.id)
                    .with_gateway_payment_id(payment_id)
                    .with_details(format!("refund={} gateway_refund={gateway_refund_id} amount={}", refund.id, refund.amount)),
            )
            .await;
        for producer in &self.producers.order_refunded_producer {
            producer.publish_event(OrderRefundedEvent::new(order.clone(), refund.clone())).await;
        }
        Ok(RefundResult { refund, order })
    }
}
