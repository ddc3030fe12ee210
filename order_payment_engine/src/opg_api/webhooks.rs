//! Reconciles local state with the gateway's asynchronous event notifications.
//!
//! Webhooks are authenticated against the raw request body before anything else happens. Once authenticated, every
//! event is appended to the webhook log of its transaction and the request is acknowledged, whatever the outcome, so
//! that the gateway does not keep redelivering it. Events can arrive in any order and more than once.
use log::*;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    db_types::{
        AuditCategory,
        MinorUnits,
        NewAuditEntry,
        NewPaymentTransaction,
        NewWebhookEvent,
        NoteVisibility,
        Order,
        PaymentTransaction,
        TransactionStatus,
    },
    events::{EventProducers, OrderPaidEvent},
    helpers::SignatureValidator,
    opg_api::{audit::AuditSink, errors::PaymentFlowError, objects::WebhookOutcome},
    traits::{CaptureDetails, OrderPaymentDatabase},
};

pub const AMOUNT_MISMATCH: &str = "AMOUNT_MISMATCH";
pub const PAYMENT_FAILED: &str = "PAYMENT_FAILED";
const WEBHOOK_ACTOR: &str = "gateway_webhook";

//--------------------------------------   Webhook envelope    ---------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<EntityWrapper>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityWrapper {
    pub entity: PaymentEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: Option<MinorUnits>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    Authorized,
    Captured,
    Failed,
    Refund,
    Other,
}

impl WebhookEventKind {
    /// Classifies an event name. Both `payment.captured` and `order.paid` signal a capture.
    pub fn from_event_name(name: &str) -> Self {
        let name = name.trim();
        if name.starts_with("refund.") {
            return Self::Refund;
        }
        match name.strip_prefix("payment.").unwrap_or(name) {
            "authorized" => Self::Authorized,
            "captured" | "order.paid" => Self::Captured,
            "failed" => Self::Failed,
            _ => Self::Other,
        }
    }
}

impl WebhookEnvelope {
    pub fn kind(&self) -> WebhookEventKind {
        WebhookEventKind::from_event_name(&self.event)
    }

    pub fn payment(&self) -> Option<&PaymentEntity> {
        self.payload.payment.as_ref().map(|w| &w.entity)
    }
}

//--------------------------------------   WebhookReconciler   ---------------------------------------------------------
pub struct WebhookReconciler<B> {
    db: B,
    validator: SignatureValidator,
    audit: AuditSink<B>,
    events: PaymentEventApplier<B>,
}

impl<B> std::fmt::Debug for WebhookReconciler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookReconciler (strict capture amount: {})", self.events.strict_capture_amount)
    }
}

impl<B: Clone> WebhookReconciler<B> {
    pub fn new(db: B, validator: SignatureValidator) -> Self {
        let audit = AuditSink::new(db.clone());
        let events = PaymentEventApplier::new(db.clone());
        Self { db, validator, audit, events }
    }

    pub fn with_producers(mut self, producers: EventProducers) -> Self {
        self.events = self.events.with_producers(producers);
        self
    }

    /// When set (the default), a capture whose amount differs from the order total is not applied.
    pub fn with_strict_capture_amount(mut self, strict: bool) -> Self {
        self.events = self.events.with_strict_capture_amount(strict);
        self
    }
}

impl<B> WebhookReconciler<B>
where B: OrderPaymentDatabase
{
    /// Authenticates and applies a webhook.
    ///
    /// Only an authentication failure is returned as an error. Every authenticated webhook produces an `Ok` outcome,
    /// including those that could not be processed, so that the caller acknowledges it to the gateway.
    pub async fn process(&self, raw_body: &[u8], signature: Option<&str>) -> Result<WebhookOutcome, PaymentFlowError> {
        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            self.audit
                .record(
                    NewAuditEntry::new(AuditCategory::Security, "webhook_signature_missing", WEBHOOK_ACTOR)
                        .with_details(format!("body_length={}", raw_body.len())),
                )
                .await;
            return Err(PaymentFlowError::SignatureVerification("The webhook signature is missing".to_string()));
        };
        if !self.validator.verify_webhook(raw_body, signature) {
            self.audit
                .record(
                    NewAuditEntry::new(AuditCategory::Security, "webhook_signature_rejected", WEBHOOK_ACTOR)
                        .with_details(format!("body_length={}", raw_body.len())),
                )
                .await;
            return Err(PaymentFlowError::SignatureVerification("The webhook signature is not valid".to_string()));
        }
        let raw = String::from_utf8_lossy(raw_body);
        match self.reconcile(&raw).await {
            Ok(outcome) => {
                debug!("🪝️ Webhook processed: {outcome:?}");
                Ok(outcome)
            },
            Err(e) => {
                error!("🪝️ Could not process an authenticated webhook. {e}");
                self.audit
                    .record(
                        NewAuditEntry::new(AuditCategory::Webhook, "webhook_processing_failed", WEBHOOK_ACTOR)
                            .with_details(&e),
                    )
                    .await;
                Ok(WebhookOutcome::Failed(e.to_string()))
            },
        }
    }

    async fn reconcile(&self, raw: &str) -> Result<WebhookOutcome, PaymentFlowError> {
        let envelope = match serde_json::from_str::<WebhookEnvelope>(raw) {
            Ok(e) => e,
            Err(e) => {
                warn!("🪝️ Authenticated webhook is not a valid event. {e}");
                self.audit
                    .record(
                        NewAuditEntry::new(AuditCategory::Webhook, "webhook_malformed", WEBHOOK_ACTOR).with_details(&e),
                    )
                    .await;
                return Ok(WebhookOutcome::Ignored(format!("Malformed event: {e}")));
            },
        };
        let kind = envelope.kind();
        trace!("🪝️ Received '{}' webhook ({kind:?})", envelope.event);
        let Some(payment) = envelope.payment() else {
            return self.record_unlinked(&envelope, "The event carries no payment entity").await;
        };
        let Some(gateway_order_id) = payment.order_id.as_deref().filter(|s| !s.is_empty()) else {
            return self.record_unlinked(&envelope, "The payment is not linked to a gateway order").await;
        };

        let order = self.db.fetch_order_by_gateway_order_id(gateway_order_id).await?;
        let transaction = self.transaction_for(gateway_order_id, payment, order.as_ref()).await?;
        self.db
            .append_webhook_event(NewWebhookEvent {
                transaction_id: transaction.id,
                event_type: envelope.event.clone(),
                gateway_payment_id: Some(payment.id.clone()),
                raw_payload: raw.to_string(),
            })
            .await?;

        match order {
            Some(order) => self.events.apply(kind, &envelope.event, &order, &transaction, payment, raw).await,
            None => self.record_without_order(&envelope, &transaction, payment).await,
        }
    }

    /// Events that cannot be linked to a transaction are not stored in the webhook log, but they are audited.
    async fn record_unlinked(&self, envelope: &WebhookEnvelope, reason: &str) -> Result<WebhookOutcome, PaymentFlowError> {
        debug!("🪝️ '{}' webhook ignored. {reason}", envelope.event);
        self.audit
            .record(
                NewAuditEntry::new(AuditCategory::Webhook, "webhook_recorded", WEBHOOK_ACTOR)
                    .with_details(format!("{}: {reason}", envelope.event)),
            )
            .await;
        Ok(WebhookOutcome::Ignored(reason.to_string()))
    }

    /// The gateway order is not (or no longer) the one stored on any order.
    ///
    /// Either checkout has not attached it yet, in which case the stored event is replayed when it does, or a payment
    /// retry has replaced it. A capture on a replaced gateway order is money the customer has paid, so it is flagged
    /// for an operator.
    async fn record_without_order(
        &self,
        envelope: &WebhookEnvelope,
        transaction: &PaymentTransaction,
        payment: &PaymentEntity,
    ) -> Result<WebhookOutcome, PaymentFlowError> {
        let gateway_order_id = transaction.gateway_order_id.as_str();
        let superseded = match transaction.order_id {
            Some(order_id) => self.db.fetch_order(order_id).await?,
            None => None,
        };
        let Some(order) = superseded else {
            warn!("🪝️ '{}' webhook for unknown gateway order {gateway_order_id}", envelope.event);
            self.audit
                .record(
                    NewAuditEntry::new(AuditCategory::Webhook, "webhook_unknown_order", WEBHOOK_ACTOR)
                        .with_gateway_order_id(gateway_order_id)
                        .with_gateway_payment_id(payment.id.as_str())
                        .with_details(envelope.event.as_str()),
                )
                .await;
            return Ok(WebhookOutcome::Ignored(format!("No order for gateway order {gateway_order_id}")));
        };
        let current = order.gateway_order_id.as_deref().unwrap_or("none");
        if envelope.kind() != WebhookEventKind::Captured {
            debug!(
                "🪝️ '{}' webhook for gateway order {gateway_order_id}, which order {} no longer uses (now {current})",
                envelope.event, order.order_number
            );
            return Ok(WebhookOutcome::Ignored(format!("Gateway order {gateway_order_id} has been superseded")));
        }
        let description = format!(
            "Payment {} of {:?} was captured on gateway order {gateway_order_id}, which this order no longer uses \
             (now {current}). It must be reconciled manually.",
            payment.id, payment.amount
        );
        error!("🪝️ Order {}: {description}", order.order_number);
        if let Err(e) = self.db.add_order_note(order.id, NoteVisibility::Admin, &description).await {
            error!("🪝️ Could not add a note to order {}. {e}", order.order_number);
        }
        self.audit
            .record(
                NewAuditEntry::new(AuditCategory::Security, "capture_on_superseded_gateway_order", WEBHOOK_ACTOR)
                    .for_order(order.id)
                    .with_gateway_order_id(gateway_order_id)
                    .with_gateway_payment_id(payment.id.as_str())
                    .with_details(description.as_str()),
            )
            .await;
        Ok(WebhookOutcome::Ignored(description))
    }

    /// Finds the transaction for the gateway order, creating it if this webhook is the first we've heard of it.
    async fn transaction_for(
        &self,
        gateway_order_id: &str,
        payment: &PaymentEntity,
        order: Option<&Order>,
    ) -> Result<PaymentTransaction, PaymentFlowError> {
        let new_tx = NewPaymentTransaction {
            order_id: order.map(|o| o.id),
            gateway_order_id: gateway_order_id.to_string(),
            gateway_payment_id: Some(payment.id.clone()),
            amount: payment.amount.or(order.map(|o| o.total_amount)).unwrap_or_default(),
            currency: payment
                .currency
                .clone()
                .or_else(|| order.map(|o| o.currency.clone()))
                .unwrap_or_default(),
            status: TransactionStatus::Pending,
        };
        let (tx, created) = self.db.fetch_or_create_transaction(new_tx).await?;
        if created {
            info!("🪝️ Transaction #{} created from a webhook for gateway order {gateway_order_id}", tx.id);
            let mut entry = NewAuditEntry::new(AuditCategory::Webhook, "transaction_created_from_webhook", WEBHOOK_ACTOR)
                .with_gateway_order_id(gateway_order_id)
                .with_gateway_payment_id(payment.id.as_str());
            if let Some(order) = order {
                entry = entry.for_order(order.id);
            }
            self.audit.record(entry).await;
        }
        match (tx.order_id, order) {
            (None, Some(order)) => {
                let linked = self.db.link_transaction_to_order(tx.id, order.id).await?;
                Ok(linked.unwrap_or(tx))
            },
            _ => Ok(tx),
        }
    }
}

//--------------------------------------  PaymentEventApplier  ---------------------------------------------------------
/// Applies authenticated payment events to an order and its transaction.
///
/// The webhook reconciler uses it for live events. Checkout uses it to replay events that reached the webhook log
/// before the gateway order was attached to its order.
pub struct PaymentEventApplier<B> {
    db: B,
    audit: AuditSink<B>,
    producers: EventProducers,
    strict_capture_amount: bool,
}

impl<B: Clone> PaymentEventApplier<B> {
    pub fn new(db: B) -> Self {
        let audit = AuditSink::new(db.clone());
        Self { db, audit, producers: EventProducers::default(), strict_capture_amount: true }
    }

    pub fn with_producers(mut self, producers: EventProducers) -> Self {
        self.producers = producers;
        self
    }

    pub fn with_strict_capture_amount(mut self, strict: bool) -> Self {
        self.strict_capture_amount = strict;
        self
    }
}

impl<B> PaymentEventApplier<B>
where B: OrderPaymentDatabase
{
    pub async fn apply(
        &self,
        kind: WebhookEventKind,
        event: &str,
        order: &Order,
        transaction: &PaymentTransaction,
        payment: &PaymentEntity,
        raw: &str,
    ) -> Result<WebhookOutcome, PaymentFlowError> {
        match kind {
            WebhookEventKind::Authorized => self.apply_authorized(order, transaction, payment).await,
            WebhookEventKind::Captured => self.apply_captured(order, transaction, payment, raw).await,
            WebhookEventKind::Failed => self.apply_failed(order, transaction, payment, event).await,
            WebhookEventKind::Refund | WebhookEventKind::Other => {
                self.audit
                    .record(
                        NewAuditEntry::new(AuditCategory::Webhook, "webhook_recorded", WEBHOOK_ACTOR)
                            .for_order(order.id)
                            .with_gateway_order_id(transaction.gateway_order_id.as_str())
                            .with_gateway_payment_id(payment.id.as_str())
                            .with_details(event),
                    )
                    .await;
                Ok(WebhookOutcome::Ignored(format!("'{event}' events do not change payment state")))
            },
        }
    }

    /// Re-applies the payment events stored in the transaction's webhook log to `order_id`, in arrival order.
    ///
    /// Events that do not drive a state change are skipped. The order and transaction are reloaded before each event,
    /// so the usual idempotency guards apply.
    pub async fn replay_stored_events(
        &self,
        order_id: i64,
        transaction: &PaymentTransaction,
    ) -> Result<Vec<WebhookOutcome>, PaymentFlowError> {
        let events = self.db.fetch_webhook_events(transaction.id).await?;
        let mut outcomes = Vec::with_capacity(events.len());
        for stored in events {
            let envelope = match serde_json::from_str::<WebhookEnvelope>(&stored.raw_payload) {
                Ok(e) => e,
                Err(e) => {
                    warn!("🪝️ Stored webhook event #{} cannot be replayed. {e}", stored.id);
                    continue;
                },
            };
            let kind = envelope.kind();
            let Some(payment) = envelope.payment() else { continue };
            if matches!(kind, WebhookEventKind::Refund | WebhookEventKind::Other) {
                continue;
            }
            let order =
                self.db.fetch_order(order_id).await?.ok_or_else(|| PaymentFlowError::NotFound(format!("Order {order_id}")))?;
            let current = self
                .db
                .fetch_transaction_by_gateway_order_id(&transaction.gateway_order_id)
                .await?
                .unwrap_or_else(|| transaction.clone());
            info!("🪝️ Replaying stored '{}' event #{} for order {}", envelope.event, stored.id, order.order_number);
            let outcome = self.apply(kind, &envelope.event, &order, &current, payment, &stored.raw_payload).await?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn apply_authorized(
        &self,
        order: &Order,
        transaction: &PaymentTransaction,
        payment: &PaymentEntity,
    ) -> Result<WebhookOutcome, PaymentFlowError> {
        let updated = self.db.mark_order_authorized(order.id, &payment.id).await?;
        if transaction.gateway_payment_id.is_none() {
            self.db.record_transaction_payment_id(transaction.id, &payment.id).await?;
        }
        match updated {
            Some(o) => {
                info!("🪝️ Payment {} authorized for order {}", payment.id, o.order_number);
                self.audit
                    .record(
                        NewAuditEntry::new(AuditCategory::Webhook, "payment_authorized", WEBHOOK_ACTOR)
                            .for_order(o.id)
                            .with_gateway_order_id(transaction.gateway_order_id.as_str())
                            .with_gateway_payment_id(payment.id.as_str()),
                    )
                    .await;
                Ok(WebhookOutcome::Applied)
            },
            None => {
                debug!("🪝️ Order {} is {}. Authorization for {} is a no-op", order.order_number, order.status, payment.id);
                Ok(WebhookOutcome::NoOp)
            },
        }
    }

    async fn apply_captured(
        &self,
        order: &Order,
        transaction: &PaymentTransaction,
        payment: &PaymentEntity,
        raw: &str,
    ) -> Result<WebhookOutcome, PaymentFlowError> {
        if order.is_paid() || order.status.is_terminal() {
            debug!("🪝️ Order {} is already {}. Capture of {} is a no-op", order.order_number, order.status, payment.id);
            if order.is_paid() && transaction.status != TransactionStatus::Success {
                self.db.mark_transaction_success(transaction.id, &payment.id).await?;
            }
            return Ok(WebhookOutcome::NoOp);
        }
        if self.strict_capture_amount && !payment.amount.map(|a| a.matches(order.total_amount)).unwrap_or(false) {
            let description = format!("Captured {:?}, but the order total is {}", payment.amount, order.total_amount);
            warn!("🪝️ {description} (order {}, payment {})", order.order_number, payment.id);
            self.db.mark_transaction_failed(transaction.id, AMOUNT_MISMATCH, &description).await?;
            self.audit
                .record(
                    NewAuditEntry::new(AuditCategory::Security, "capture_amount_mismatch", WEBHOOK_ACTOR)
                        .for_order(order.id)
                        .with_gateway_order_id(transaction.gateway_order_id.as_str())
                        .with_gateway_payment_id(payment.id.as_str())
                        .with_details(description.as_str()),
                )
                .await;
            return Ok(WebhookOutcome::Ignored(description));
        }
        let capture = CaptureDetails::new(payment.id.as_str(), raw.to_string());
        let updated = self.db.mark_order_paid(order.id, capture).await?;
        self.db.mark_transaction_success(transaction.id, &payment.id).await?;
        let Some(paid) = updated else {
            debug!("🪝️ Order {} was paid concurrently. Capture of {} is a no-op", order.order_number, payment.id);
            return Ok(WebhookOutcome::NoOp);
        };
        info!("🪝️ Payment {} captured for order {}. Amount: {}", payment.id, paid.order_number, paid.total_amount);
        self.audit
            .record(
                NewAuditEntry::new(AuditCategory::Payment, "payment_captured", WEBHOOK_ACTOR)
                    .for_order(paid.id)
                    .with_gateway_order_id(transaction.gateway_order_id.as_str())
                    .with_gateway_payment_id(payment.id.as_str())
                    .with_details(format!("source=webhook amount={}", paid.total_amount)),
            )
            .await;
        let note = format!("Payment {} received. Amount: {} {}", payment.id, paid.total_amount, paid.currency);
        if let Err(e) = self.db.add_order_note(paid.id, NoteVisibility::Customer, &note).await {
            warn!("🪝️ Could not add payment note to order {}. {e}", paid.order_number);
        }
        if let Err(e) = self.db.clear_cart(&paid.customer_id).await {
            warn!("🪝️ Could not clear the cart of {}. {e}", paid.customer_id);
        }
        for producer in &self.producers.order_paid_producer {
            producer.publish_event(OrderPaidEvent::new(paid.clone())).await;
        }
        Ok(WebhookOutcome::Applied)
    }

    async fn apply_failed(
        &self,
        order: &Order,
        transaction: &PaymentTransaction,
        payment: &PaymentEntity,
        event: &str,
    ) -> Result<WebhookOutcome, PaymentFlowError> {
        let code = payment.error_code.as_deref().unwrap_or(PAYMENT_FAILED);
        let description = payment.error_description.as_deref().unwrap_or("The gateway reported a failed payment");
        let updated_order = self.db.mark_order_payment_failed(order.id).await?;
        let updated_tx = self.db.mark_transaction_failed(transaction.id, code, description).await?;
        if updated_order.is_none() && updated_tx.is_none() {
            debug!("🪝️ Order {} is {}. Failure of {} is a no-op", order.order_number, order.status, payment.id);
            return Ok(WebhookOutcome::NoOp);
        }
        info!("🪝️ Payment {} failed for order {}. {code}: {description}", payment.id, order.order_number);
        self.audit
            .record(
                NewAuditEntry::new(AuditCategory::Webhook, "payment_failed", WEBHOOK_ACTOR)
                    .for_order(order.id)
                    .with_gateway_order_id(transaction.gateway_order_id.as_str())
                    .with_gateway_payment_id(payment.id.as_str())
                    .with_details(format!("{event} {code}: {description}")),
            )
            .await;
        Ok(WebhookOutcome::Applied)
    }
}

/// Parses the event name out of a raw body without validating the rest. Used for logging only.
pub fn peek_event_name(raw_body: &[u8]) -> Option<String> {
    let value = serde_json::from_slice::<Value>(raw_body).ok()?;
    value.get("event").and_then(Value::as_str).map(str::to_string)
}
