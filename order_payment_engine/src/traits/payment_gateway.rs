use opg_common::MinorUnits;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Request to open a remote order with the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrderRequest {
    pub amount: MinorUnits,
    pub currency: String,
    /// Our own reference for the order. We use the order number.
    pub receipt: String,
    /// Free-form key/value notes
    pub notes: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: String,
    pub method: Option<String>,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRefundRequest {
    pub payment_id: String,
    pub amount: MinorUnits,
    pub notes: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: MinorUnits,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The gateway refused the request (4xx). Repeating it will not help.
    #[error("The payment gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The gateway failed to handle the request (5xx).
    #[error("The payment gateway is unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },
    #[error("Could not reach the payment gateway: {0}")]
    Transport(String),
    #[error("The payment gateway sent a response we could not understand: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Server-class and transport failures are transient. Client-class rejections are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable { .. } | GatewayError::Transport(_))
    }
}

/// The outbound payment gateway client.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    /// Opens a remote order for the given amount. Returns the gateway-assigned order.
    async fn create_order(&self, request: GatewayOrderRequest) -> Result<GatewayOrder, GatewayError>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError>;

    /// Refunds (part of) a captured payment. Callers must not repeat a failed refund automatically.
    async fn create_refund(&self, request: GatewayRefundRequest) -> Result<GatewayRefund, GatewayError>;
}
