//! Checkout turns a customer's cart into an order and opens a matching order with the payment gateway.
//!
//! The order is always persisted before the gateway is called. If the gateway call fails, the order is left in
//! `payment_failed` without a payment transaction, and [`CheckoutOrchestrator::retry_payment`] can attach a fresh
//! gateway order to it later.
//!
//! The gateway may report on a new gateway order before checkout has attached it. Those webhooks are stored against
//! an orphan transaction, and are replayed onto the order as soon as it is attached.
use std::{fmt::Debug, sync::Arc};

use log::*;
use serde_json::{json, Value};

use crate::{
    db_types::{
        AuditCategory,
        NewAuditEntry,
        NewOrder,
        NewPaymentTransaction,
        NoteVisibility,
        Order,
        OrderStatusType,
        PaymentTransaction,
    },
    events::EventProducers,
    helpers::{new_order_number, with_retry, RetryPolicy},
    opg_api::{
        audit::AuditSink,
        errors::PaymentFlowError,
        objects::{CheckoutRequest, CheckoutResult},
        pricing::PricingPolicy,
        webhooks::PaymentEventApplier,
    },
    traits::{GatewayError, GatewayOrderRequest, OrderPaymentDatabase, PaymentGateway},
};

const REQUIRED_ADDRESS_FIELDS: [&str; 4] = ["line1", "city", "postal_code", "country"];

pub struct CheckoutOrchestrator<B, G> {
    db: B,
    gateway: Arc<G>,
    pricing: PricingPolicy,
    retry: RetryPolicy,
    audit: AuditSink<B>,
    early_events: PaymentEventApplier<B>,
}

impl<B, G> Debug for CheckoutOrchestrator<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutOrchestrator ({:?})", self.pricing)
    }
}

impl<B: Clone, G> CheckoutOrchestrator<B, G> {
    pub fn new(db: B, gateway: Arc<G>, pricing: PricingPolicy) -> Self {
        let audit = AuditSink::new(db.clone());
        let early_events = PaymentEventApplier::new(db.clone());
        Self { db, gateway, pricing, retry: RetryPolicy::default(), audit, early_events }
    }

    /// Replaces the default retry policy used for opening gateway orders.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Producers for events raised when a webhook that arrived ahead of checkout is replayed.
    pub fn with_producers(mut self, producers: EventProducers) -> Self {
        self.early_events = self.early_events.with_producers(producers);
        self
    }

    /// Must match the webhook reconciler's setting.
    pub fn with_strict_capture_amount(mut self, strict: bool) -> Self {
        self.early_events = self.early_events.with_strict_capture_amount(strict);
        self
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G> CheckoutOrchestrator<B, G>
where
    B: OrderPaymentDatabase,
    G: PaymentGateway,
{
    /// Creates an order from the customer's cart and opens a gateway order for its total.
    ///
    /// All amounts are computed from current catalog prices. If the request carries a client-side total that differs
    /// from the computed total by more than one minor unit, the checkout is rejected before anything is stored.
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutResult, PaymentFlowError> {
        let CheckoutRequest { customer_id, shipping_address, client_total } = request;
        if customer_id.trim().is_empty() {
            return Err(PaymentFlowError::Validation("A customer id is required".to_string()));
        }
        validate_address(&shipping_address)?;
        let cart = self.db.fetch_cart(&customer_id).await?;
        let product_ids = cart.iter().map(|c| c.product_id).collect::<Vec<_>>();
        let products = self.db.fetch_products(&product_ids).await?;
        let price = self.pricing.price_cart(&cart, &products)?;
        if let Some(client_total) = client_total {
            if !price.total.matches(client_total) {
                warn!(
                    "🛒️ Customer {customer_id} submitted a total of {client_total}, but the cart comes to {}. The \
                     checkout is rejected.",
                    price.total
                );
                return Err(PaymentFlowError::Validation(format!(
                    "The submitted total of {client_total} does not match the order total of {}",
                    price.total
                )));
            }
        }
        let new_order = NewOrder {
            order_number: new_order_number(),
            customer_id: customer_id.clone(),
            currency: self.pricing.currency.clone(),
            subtotal: price.subtotal,
            tax: price.tax,
            shipping: price.shipping,
            discount: price.discount,
            total_amount: price.total,
            shipping_address,
            items: price.items,
        };
        let order = self.db.insert_order(new_order).await?;
        info!("🛒️ Order {} (#{}) created for {customer_id}. Total: {}", order.order_number, order.id, order.total_amount);
        self.audit
            .record(
                NewAuditEntry::new(AuditCategory::Payment, "order_created", customer_id.as_str())
                    .for_order(order.id)
                    .with_details(format!("total={} currency={}", order.total_amount, order.currency)),
            )
            .await;
        self.open_gateway_order(order).await
    }

    /// Opens a new gateway order for an order whose previous payment attempt failed, or that never got one.
    ///
    /// A new payment transaction is created. Earlier transactions are kept as history.
    pub async fn retry_payment(&self, order_id: i64) -> Result<CheckoutResult, PaymentFlowError> {
        let order =
            self.db.fetch_order(order_id).await?.ok_or_else(|| PaymentFlowError::NotFound(format!("Order {order_id}")))?;
        if order.is_paid() || order.status.is_terminal() {
            return Err(PaymentFlowError::Conflict(format!(
                "Order {} is {} ({}). It cannot take another payment.",
                order.order_number, order.status, order.payment_status
            )));
        }
        match (order.status, order.gateway_order_id.as_deref()) {
            (OrderStatusType::PaymentFailed, _) | (OrderStatusType::PendingPayment, None) => {},
            (status, gateway_order) => {
                return Err(PaymentFlowError::Conflict(format!(
                    "Order {} is {status} on gateway order {gateway_order:?}. Only failed payments can be retried.",
                    order.order_number
                )));
            },
        }
        info!("🛒️ Retrying payment for order {} (#{order_id})", order.order_number);
        self.open_gateway_order(order).await
    }

    async fn open_gateway_order(&self, order: Order) -> Result<CheckoutResult, PaymentFlowError> {
        let request = GatewayOrderRequest {
            amount: order.total_amount,
            currency: order.currency.clone(),
            receipt: order.order_number.clone(),
            notes: gateway_notes(&order),
        };
        let gateway = &self.gateway;
        let result = with_retry(&self.retry, GatewayError::is_retryable, |attempt| {
            let request = request.clone();
            async move {
                debug!("🛒️ Opening gateway order for {} (attempt {attempt})", request.receipt);
                gateway.create_order(request).await
            }
        })
        .await;
        let gateway_order = match result {
            Ok(gateway_order) => gateway_order,
            Err(e) => {
                self.handle_gateway_failure(&order, &e).await;
                return Err(PaymentFlowError::from_checkout_error(e));
            },
        };
        if !gateway_order.amount.matches(order.total_amount) {
            warn!(
                "🛒️ Gateway order {} is for {}, but order {} totals {}",
                gateway_order.id, gateway_order.amount, order.order_number, order.total_amount
            );
        }
        let transaction =
            NewPaymentTransaction::pending(order.id, &gateway_order.id, order.total_amount, &order.currency);
        let (order, transaction) =
            self.db.attach_gateway_order(order.id, order.version, transaction).await?.ok_or_else(|| {
                PaymentFlowError::Conflict(format!(
                    "Order #{} was modified while gateway order {} was being opened",
                    order.id, gateway_order.id
                ))
            })?;
        info!("🛒️ Order {} is awaiting payment on gateway order {}", order.order_number, gateway_order.id);
        self.audit
            .record(
                NewAuditEntry::new(AuditCategory::Payment, "gateway_order_created", "system")
                    .for_order(order.id)
                    .with_gateway_order_id(gateway_order.id.as_str())
                    .with_details(format!("amount={} transaction={}", transaction.amount, transaction.id)),
            )
            .await;
        let (order, transaction) = self.replay_early_events(order, transaction).await;
        Ok(CheckoutResult { order, transaction, gateway_order_id: gateway_order.id })
    }

    /// A replay failure does not fail the checkout, since the gateway order is already attached.
    async fn replay_early_events(&self, order: Order, transaction: PaymentTransaction) -> (Order, PaymentTransaction) {
        let outcomes = match self.early_events.replay_stored_events(order.id, &transaction).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                error!("🛒️ Could not replay early webhooks for order {}. {e}", order.order_number);
                return (order, transaction);
            },
        };
        if outcomes.is_empty() {
            return (order, transaction);
        }
        info!("🛒️ Replayed {} early webhook(s) onto order {}: {outcomes:?}", outcomes.len(), order.order_number);
        let order = match self.db.fetch_order(order.id).await {
            Ok(Some(updated)) => updated,
            Ok(None) => order,
            Err(e) => {
                warn!("🛒️ Could not reload order {}. {e}", order.order_number);
                order
            },
        };
        let transaction = match self.db.fetch_transaction_by_gateway_order_id(&transaction.gateway_order_id).await {
            Ok(Some(updated)) => updated,
            Ok(None) => transaction,
            Err(e) => {
                warn!("🛒️ Could not reload transaction #{}. {e}", transaction.id);
                transaction
            },
        };
        (order, transaction)
    }

    async fn handle_gateway_failure(&self, order: &Order, e: &GatewayError) {
        error!("🛒️ Could not open a gateway order for order {}. {e}", order.order_number);
        match self.db.mark_order_payment_failed(order.id).await {
            Ok(Some(_)) => debug!("🛒️ Order {} marked as payment_failed", order.order_number),
            Ok(None) => debug!("🛒️ Order {} was already {}", order.order_number, order.status),
            Err(db_err) => error!("🛒️ Could not mark order {} as payment_failed. {db_err}", order.order_number),
        }
        let note = format!("Could not open a payment with the gateway: {e}");
        if let Err(db_err) = self.db.add_order_note(order.id, NoteVisibility::Admin, &note).await {
            error!("🛒️ Could not add a note to order {}. {db_err}", order.order_number);
        }
        self.audit
            .record(
                NewAuditEntry::new(AuditCategory::Payment, "gateway_order_failed", "system")
                    .for_order(order.id)
                    .with_details(e),
            )
            .await;
    }
}

fn gateway_notes(order: &Order) -> Value {
    json!({
        "order_id": order.id.to_string(),
        "order_number": order.order_number,
        "customer_id": order.customer_id,
    })
}

fn validate_address(address: &Value) -> Result<(), PaymentFlowError> {
    let Some(fields) = address.as_object() else {
        return Err(PaymentFlowError::Validation("The shipping address must be an object".to_string()));
    };
    let missing = REQUIRED_ADDRESS_FIELDS
        .iter()
        .filter(|f| fields.get(**f).and_then(Value::as_str).map(|s| s.trim().is_empty()).unwrap_or(true))
        .copied()
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PaymentFlowError::Validation(format!("The shipping address is missing: {}", missing.join(", "))))
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::validate_address;

    #[test]
    fn addresses_need_the_basic_fields() {
        let ok = json!({"line1": "1 Main St", "city": "Pune", "postal_code": "411001", "country": "IN"});
        assert!(validate_address(&ok).is_ok());
        let err = validate_address(&json!({"line1": "1 Main St", "city": " "})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request. The shipping address is missing: city, postal_code, country");
        assert!(validate_address(&json!("1 Main St")).is_err());
    }
}
