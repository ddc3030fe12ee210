use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
pub use opg_common::MinorUnits;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(&'static str, String);

/// Implements `Display`, `FromStr` and a lenient `From<String>` for the status-like enums in this module, using the
/// same snake_case names that are stored in the database and sent over the wire.
macro_rules! text_enum {
    ($name:ident, $fallback:expr, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    s => Err(ConversionError(stringify!($name), s.to_string())),
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                value.parse().unwrap_or_else(|_| {
                    error!("Invalid {}: {value}. But this conversion cannot fail. Defaulting to {}", stringify!($name), $fallback);
                    $fallback
                })
            }
        }
    };
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// The order has been created and no successful payment has been recorded yet.
    PendingPayment,
    /// The payment was authorized or captured. The order can now be fulfilled.
    Processing,
    /// The order has been fulfilled.
    Completed,
    /// The order has been cancelled. Terminal.
    Cancelled,
    /// The last payment attempt failed. A new attempt may be started.
    PaymentFailed,
    /// The payment has been returned to the customer. Terminal.
    Refunded,
}

text_enum!(OrderStatusType, OrderStatusType::PendingPayment, {
    PendingPayment => "pending_payment",
    Processing => "processing",
    Completed => "completed",
    Cancelled => "cancelled",
    PaymentFailed => "payment_failed",
    Refunded => "refunded",
});

impl OrderStatusType {
    /// No payment-state transition may leave a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Refunded | Self::Cancelled)
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

text_enum!(PaymentStatus, PaymentStatus::Unpaid, {
    Unpaid => "unpaid",
    Partial => "partial",
    Paid => "paid",
});

//--------------------------------------   TransactionStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

text_enum!(TransactionStatus, TransactionStatus::Pending, {
    Pending => "pending",
    Success => "success",
    Failed => "failed",
    Refunded => "refunded",
});

//--------------------------------------   Refund enums        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundType {
    Full,
    Partial,
}

text_enum!(RefundType, RefundType::Full, {
    Full => "full",
    Partial => "partial",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Processed,
    Failed,
}

text_enum!(RefundStatus, RefundStatus::Pending, {
    Pending => "pending",
    Processed => "processed",
    Failed => "failed",
});

//--------------------------------------   NoteVisibility      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NoteVisibility {
    /// Shown to the customer
    Customer,
    /// Internal only
    Admin,
}

text_enum!(NoteVisibility, NoteVisibility::Admin, {
    Customer => "customer",
    Admin => "admin",
});

//--------------------------------------   AuditCategory       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Payment,
    Verification,
    Webhook,
    Refund,
    Security,
}

text_enum!(AuditCategory, AuditCategory::Payment, {
    Payment => "payment",
    Verification => "verification",
    Webhook => "webhook",
    Refund => "refund",
    Security => "security",
});

//--------------------------------------        Order       ------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// Human-readable identifier, also used as the gateway receipt.
    pub order_number: String,
    pub customer_id: String,
    pub status: OrderStatusType,
    pub payment_status: PaymentStatus,
    pub currency: String,
    pub subtotal: MinorUnits,
    pub tax: MinorUnits,
    pub shipping: MinorUnits,
    pub discount: MinorUnits,
    /// Computed from catalog prices when the order is created. Never updated afterwards.
    pub total_amount: MinorUnits,
    pub shipping_address: Json<Value>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    /// Stored for audit purposes only.
    pub raw_gateway_payload: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// True if a successful payment has been recorded along with the gateway payment id that captured it.
    pub fn is_captured(&self) -> bool {
        self.is_paid() && self.gateway_payment_id.is_some()
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub customer_id: String,
    pub currency: String,
    pub subtotal: MinorUnits,
    pub tax: MinorUnits,
    pub shipping: MinorUnits,
    pub discount: MinorUnits,
    pub total_amount: MinorUnits,
    pub shipping_address: Value,
    pub items: Vec<NewOrderItem>,
}

//--------------------------------------       OrderItem       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub name: String,
    pub unit_price: MinorUnits,
    pub quantity: i64,
    pub line_total: MinorUnits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub name: String,
    pub unit_price: MinorUnits,
    pub quantity: i64,
    pub line_total: MinorUnits,
}

//--------------------------------------       OrderNote       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderNote {
    pub id: i64,
    pub order_id: i64,
    pub visibility: NoteVisibility,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  PaymentTransaction   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: i64,
    pub order_id: Option<i64>,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: TransactionStatus,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentTransaction {
    pub order_id: Option<i64>,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: TransactionStatus,
}

impl NewPaymentTransaction {
    pub fn pending(order_id: i64, gateway_order_id: &str, amount: MinorUnits, currency: &str) -> Self {
        Self {
            order_id: Some(order_id),
            gateway_order_id: gateway_order_id.to_string(),
            gateway_payment_id: None,
            amount,
            currency: currency.to_string(),
            status: TransactionStatus::Pending,
        }
    }

    pub fn with_payment_id<S: Into<String>>(mut self, payment_id: S) -> Self {
        self.gateway_payment_id = Some(payment_id.into());
        self
    }
}

//--------------------------------------     WebhookEvent      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: i64,
    pub transaction_id: i64,
    pub event_type: String,
    pub gateway_payment_id: Option<String>,
    /// The request body exactly as it was received.
    pub raw_payload: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWebhookEvent {
    pub transaction_id: i64,
    pub event_type: String,
    pub gateway_payment_id: Option<String>,
    pub raw_payload: String,
}

//--------------------------------------        Refund         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Refund {
    pub id: i64,
    pub order_id: i64,
    pub payment_transaction_id: i64,
    pub gateway_refund_id: Option<String>,
    pub amount: MinorUnits,
    pub refund_type: RefundType,
    pub status: RefundStatus,
    pub reason: Option<String>,
    /// Operator identity
    pub initiated_by: String,
    pub error_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefund {
    pub order_id: i64,
    pub payment_transaction_id: i64,
    pub amount: MinorUnits,
    pub refund_type: RefundType,
    pub reason: Option<String>,
    pub initiated_by: String,
}

//--------------------------------------      AuditEntry       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub order_id: Option<i64>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub category: AuditCategory,
    pub event: String,
    pub actor: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub order_id: Option<i64>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub category: AuditCategory,
    pub event: String,
    pub actor: String,
    pub details: Option<String>,
}

impl NewAuditEntry {
    pub fn new<E: Into<String>, A: Into<String>>(category: AuditCategory, event: E, actor: A) -> Self {
        Self {
            order_id: None,
            gateway_order_id: None,
            gateway_payment_id: None,
            category,
            event: event.into(),
            actor: actor.into(),
            details: None,
        }
    }

    pub fn for_order(mut self, order_id: i64) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_gateway_order_id<S: Into<String>>(mut self, id: S) -> Self {
        self.gateway_order_id = Some(id.into());
        self
    }

    pub fn with_gateway_payment_id<S: Into<String>>(mut self, id: S) -> Self {
        self.gateway_payment_id = Some(id.into());
        self
    }

    pub fn with_details<S: Display>(mut self, details: S) -> Self {
        self.details = Some(details.to_string());
        self
    }
}

//--------------------------------------   Catalog and cart    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: MinorUnits,
    pub sale_price: Option<MinorUnits>,
    pub active: bool,
}

impl Product {
    /// The discount per unit, if a sale price below the list price is set.
    pub fn unit_discount(&self) -> MinorUnits {
        match self.sale_price {
            Some(sale) if sale < self.price => self.price - sale,
            _ => MinorUnits::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CartItem {
    pub customer_id: String,
    pub product_id: i64,
    pub quantity: i64,
}
