use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db_types::{MinorUnits, Order, OrderItem, OrderNote, PaymentTransaction, Refund};

//--------------------------------------       Checkout        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub shipping_address: Value,
    /// The total the client displayed. Only used to detect a mismatch; it is never charged.
    #[serde(default)]
    pub client_total: Option<MinorUnits>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub order: Order,
    pub transaction: PaymentTransaction,
    /// Handed to the client so that it can open the gateway's payment form.
    pub gateway_order_id: String,
}

//--------------------------------------     Confirmation      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub order_id: i64,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationResult {
    pub order: Order,
    pub transaction: Option<PaymentTransaction>,
    /// True if the payment had already been recorded before this call.
    pub idempotent: bool,
}

//--------------------------------------        Webhooks       ---------------------------------------------------------
/// What happened to an authenticated webhook. The gateway is sent a success response in every case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The event advanced the order or transaction state.
    Applied,
    /// The event was valid, but the state had already moved past it.
    NoOp,
    /// The event was recorded but does not drive any state change.
    Ignored(String),
    /// The event could not be processed. The failure has been logged and audited.
    Failed(String),
}

//--------------------------------------        Refunds        ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Defaults to the full order total
    #[serde(default)]
    pub amount: Option<MinorUnits>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundResult {
    pub refund: Refund,
    pub order: Order,
}

//--------------------------------------        Queries        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    #[serde(flatten)]
    pub transaction: PaymentTransaction,
    pub webhook_event_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub notes: Vec<OrderNote>,
    pub transactions: Vec<TransactionSummary>,
    pub refunds: Vec<Refund>,
}
