//! Verifies payment confirmations relayed by the customer's browser after the gateway's payment form completes.
//!
//! The confirmation and the gateway's `payment.captured` webhook race each other. Both paths record the capture with
//! the same guarded update, so whichever arrives second finds the order already paid and reports an idempotent
//! success instead of recording the capture twice.
use std::{fmt::Debug, sync::Arc};

use chrono::Utc;
use log::*;
use serde_json::json;

use crate::{
    db_types::{AuditCategory, NewAuditEntry, NewPaymentTransaction, NoteVisibility, Order, PaymentTransaction},
    events::{EventProducers, OrderPaidEvent},
    helpers::SignatureValidator,
    opg_api::{
        audit::AuditSink,
        errors::PaymentFlowError,
        objects::{ConfirmationResult, PaymentConfirmation},
    },
    traits::{CaptureDetails, OrderPaymentDatabase, PaymentGateway},
};

pub const SIGNATURE_MISMATCH: &str = "SIGNATURE_MISMATCH";

pub struct PaymentVerifier<B, G> {
    db: B,
    gateway: Arc<G>,
    validator: SignatureValidator,
    audit: AuditSink<B>,
    producers: EventProducers,
}

impl<B, G> Debug for PaymentVerifier<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentVerifier")
    }
}

impl<B: Clone, G> PaymentVerifier<B, G> {
    pub fn new(db: B, gateway: Arc<G>, validator: SignatureValidator) -> Self {
        let audit = AuditSink::new(db.clone());
        Self { db, gateway, validator, audit, producers: EventProducers::default() }
    }

    pub fn with_producers(mut self, producers: EventProducers) -> Self {
        self.producers = producers;
        self
    }
}

impl<B, G> PaymentVerifier<B, G>
where
    B: OrderPaymentDatabase,
    G: PaymentGateway,
{
    /// Verifies the gateway's signature over a completed payment and records the capture.
    ///
    /// Confirming a payment that has already been recorded for the same gateway order succeeds with
    /// `idempotent: true`, without re-checking the signature.
    pub async fn confirm_payment(
        &self,
        confirmation: PaymentConfirmation,
    ) -> Result<ConfirmationResult, PaymentFlowError> {
        let PaymentConfirmation { order_id, gateway_order_id, gateway_payment_id, gateway_signature } = confirmation;
        if gateway_order_id.trim().is_empty() || gateway_payment_id.trim().is_empty() || gateway_signature.trim().is_empty()
        {
            return Err(PaymentFlowError::Validation(
                "The gateway order id, payment id and signature are all required".to_string(),
            ));
        }
        let order =
            self.db.fetch_order(order_id).await?.ok_or_else(|| PaymentFlowError::NotFound(format!("Order {order_id}")))?;

        if order.is_captured() && order.gateway_order_id.as_deref() == Some(gateway_order_id.as_str()) {
            debug!("💳️ Order {} is already paid. Confirmation for {gateway_payment_id} is a no-op", order.order_number);
            return self.idempotent_result(order, &gateway_payment_id).await;
        }
        if order.status.is_terminal() {
            return Err(PaymentFlowError::Conflict(format!(
                "Order {} is {} and cannot accept a payment",
                order.order_number, order.status
            )));
        }
        if order.gateway_order_id.as_deref() != Some(gateway_order_id.as_str()) {
            self.audit
                .record(
                    NewAuditEntry::new(AuditCategory::Security, "gateway_order_mismatch", order.customer_id.as_str())
                        .for_order(order.id)
                        .with_gateway_order_id(gateway_order_id.as_str())
                        .with_gateway_payment_id(gateway_payment_id.as_str())
                        .with_details(format!("expected {:?}", order.gateway_order_id)),
                )
                .await;
            return Err(PaymentFlowError::Validation(format!(
                "Gateway order {gateway_order_id} does not belong to order {}",
                order.order_number
            )));
        }
        if !self.validator.verify_payment(&gateway_order_id, &gateway_payment_id, &gateway_signature) {
            self.reject_signature(&order, &gateway_order_id, &gateway_payment_id).await;
            return Err(PaymentFlowError::SignatureVerification(format!(
                "The signature for payment {gateway_payment_id} is not valid"
            )));
        }
        debug!("💳️ Signature for payment {gateway_payment_id} on order {} is valid", order.order_number);

        let raw_payload = self.payment_snapshot(&gateway_order_id, &gateway_payment_id).await;
        let capture = CaptureDetails::new(gateway_payment_id.as_str(), raw_payload).with_signature(gateway_signature);
        let updated = self.db.mark_order_paid(order.id, capture).await?;
        let transaction = self.record_transaction(&order, &gateway_order_id, &gateway_payment_id).await?;
        self.clear_cart(&order.customer_id).await;

        match updated {
            Some(paid) => {
                info!("💳️ Payment {gateway_payment_id} captured for order {}. Amount: {}", paid.order_number, paid.total_amount);
                self.audit
                    .record(
                        NewAuditEntry::new(AuditCategory::Payment, "payment_captured", paid.customer_id.as_str())
                            .for_order(paid.id)
                            .with_gateway_order_id(gateway_order_id.as_str())
                            .with_gateway_payment_id(gateway_payment_id.as_str())
                            .with_details(format!("source=confirmation amount={}", paid.total_amount)),
                    )
                    .await;
                let note = format!("Payment {gateway_payment_id} received. Amount: {} {}", paid.total_amount, paid.currency);
                if let Err(e) = self.db.add_order_note(paid.id, NoteVisibility::Customer, &note).await {
                    warn!("💳️ Could not add payment note to order {}. {e}", paid.order_number);
                }
                for producer in &self.producers.order_paid_producer {
                    producer.publish_event(OrderPaidEvent::new(paid.clone())).await;
                }
                Ok(ConfirmationResult { order: paid, transaction: Some(transaction), idempotent: false })
            },
            None => {
                let current = self
                    .db
                    .fetch_order(order.id)
                    .await?
                    .ok_or_else(|| PaymentFlowError::NotFound(format!("Order {}", order.id)))?;
                if current.is_paid() {
                    debug!("💳️ Order {} was paid concurrently. Confirmation is a no-op", current.order_number);
                    self.audit_idempotent(&current, &gateway_payment_id).await;
                    Ok(ConfirmationResult { order: current, transaction: Some(transaction), idempotent: true })
                } else {
                    Err(PaymentFlowError::Conflict(format!(
                        "Order {} is {} and could not be marked as paid",
                        current.order_number, current.status
                    )))
                }
            },
        }
    }

    async fn idempotent_result(
        &self,
        order: Order,
        gateway_payment_id: &str,
    ) -> Result<ConfirmationResult, PaymentFlowError> {
        self.clear_cart(&order.customer_id).await;
        self.audit_idempotent(&order, gateway_payment_id).await;
        let transaction = match order.gateway_order_id.as_deref() {
            Some(gid) => self.db.fetch_transaction_by_gateway_order_id(gid).await?,
            None => None,
        };
        Ok(ConfirmationResult { order, transaction, idempotent: true })
    }

    async fn audit_idempotent(&self, order: &Order, gateway_payment_id: &str) {
        let mut entry = NewAuditEntry::new(AuditCategory::Verification, "verification_idempotent", order.customer_id.as_str())
            .for_order(order.id)
            .with_gateway_payment_id(gateway_payment_id);
        if let Some(gid) = &order.gateway_order_id {
            entry = entry.with_gateway_order_id(gid.as_str());
        }
        self.audit.record(entry).await;
    }

    async fn reject_signature(&self, order: &Order, gateway_order_id: &str, gateway_payment_id: &str) {
        warn!("💳️ Invalid signature for payment {gateway_payment_id} on order {}", order.order_number);
        if let Err(e) = self.db.mark_order_payment_failed(order.id).await {
            error!("💳️ Could not mark order {} as payment_failed. {e}", order.order_number);
        }
        match self.db.fetch_transaction_by_gateway_order_id(gateway_order_id).await {
            Ok(Some(tx)) => {
                let result = self
                    .db
                    .mark_transaction_failed(tx.id, SIGNATURE_MISMATCH, "Payment confirmation signature did not verify")
                    .await;
                if let Err(e) = result {
                    error!("💳️ Could not mark transaction #{} as failed. {e}", tx.id);
                }
            },
            Ok(None) => debug!("💳️ No transaction exists for gateway order {gateway_order_id}"),
            Err(e) => error!("💳️ Could not fetch transaction for gateway order {gateway_order_id}. {e}"),
        }
        self.audit
            .record(
                NewAuditEntry::new(AuditCategory::Security, "signature_rejected", order.customer_id.as_str())
                    .for_order(order.id)
                    .with_gateway_order_id(gateway_order_id)
                    .with_gateway_payment_id(gateway_payment_id)
                    .with_details("source=confirmation"),
            )
            .await;
    }

    /// Fetches the payment from the gateway so that a copy of it can be stored with the order. The capture has
    /// already been authenticated by its signature, so a failure here only loses the snapshot.
    async fn payment_snapshot(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        match self.gateway.fetch_payment(gateway_payment_id).await {
            Ok(payment) => serde_json::to_string(&payment).unwrap_or_default(),
            Err(e) => {
                warn!("💳️ Could not fetch payment {gateway_payment_id} from the gateway. {e}");
                json!({
                    "order_id": gateway_order_id,
                    "payment_id": gateway_payment_id,
                    "source": "confirmation",
                    "received_at": Utc::now().to_rfc3339(),
                })
                .to_string()
            },
        }
    }

    async fn record_transaction(
        &self,
        order: &Order,
        gateway_order_id: &str,
        gateway_payment_id: &str,
    ) -> Result<PaymentTransaction, PaymentFlowError> {
        let new_tx = NewPaymentTransaction::pending(order.id, gateway_order_id, order.total_amount, &order.currency)
            .with_payment_id(gateway_payment_id);
        let (tx, created) = self.db.fetch_or_create_transaction(new_tx).await?;
        if created {
            warn!("💳️ No transaction existed for gateway order {gateway_order_id}. One has been created.");
        }
        let tx = match self.db.mark_transaction_success(tx.id, gateway_payment_id).await? {
            Some(tx) => tx,
            None => {
                trace!("💳️ Transaction #{} is already {}", tx.id, tx.status);
                tx
            },
        };
        Ok(tx)
    }

    async fn clear_cart(&self, customer_id: &str) {
        match self.db.clear_cart(customer_id).await {
            Ok(n) => trace!("💳️ Cleared {n} items from the cart of {customer_id}"),
            Err(e) => warn!("💳️ Could not clear the cart of {customer_id}. {e}"),
        }
    }
}
