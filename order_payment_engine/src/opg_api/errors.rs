use thiserror::Error;

use crate::traits::{DatabaseError, GatewayError};

/// The error taxonomy of the payment flows.
///
/// An operation that was already completed is not an error. Those calls succeed, and say so with an `idempotent`
/// flag on the result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentFlowError {
    #[error("Invalid request. {0}")]
    Validation(String),
    #[error("{0} does not exist")]
    NotFound(String),
    #[error("The payment gateway declined the request. {0}")]
    PaymentDeclined(String),
    #[error("Payment gateway error. {0}")]
    Gateway(String),
    #[error("Signature verification failed. {0}")]
    SignatureVerification(String),
    #[error("The request conflicts with the current state of the order. {0}")]
    Conflict(String),
    #[error("Database error. {0}")]
    Database(String),
}

impl PaymentFlowError {
    /// Maps a failure to open a gateway order. The gateway refusing the payment is distinct from the gateway failing.
    pub fn from_checkout_error(e: GatewayError) -> Self {
        match e {
            GatewayError::Rejected { .. } => Self::PaymentDeclined(e.to_string()),
            _ => Self::Gateway(e.to_string()),
        }
    }
}

impl From<DatabaseError> for PaymentFlowError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::OrderNotFound(id) => Self::NotFound(format!("Order {id}")),
            DatabaseError::TransactionNotFound(id) => Self::NotFound(format!("Payment transaction {id}")),
            DatabaseError::RefundNotFound(id) => Self::NotFound(format!("Refund {id}")),
            DatabaseError::RefundInProgress(id) => Self::Validation(format!("Order {id} already has a refund in progress")),
            e => Self::Database(e.to_string()),
        }
    }
}
