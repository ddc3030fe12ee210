use thiserror::Error;

use crate::traits::{
    AuditManagement,
    CartManagement,
    CatalogManagement,
    OrderManagement,
    RefundManagement,
    TransactionManagement,
};

/// This trait defines the highest level of behaviour for backends supporting the reconciliation engine.
///
/// A backend must be cheap to clone, since each orchestrator holds its own handle.
pub trait OrderPaymentDatabase:
    Clone + OrderManagement + TransactionManagement + RefundManagement + AuditManagement + CatalogManagement + CartManagement
{
    /// The URL of the database
    fn url(&self) -> &str;
}

#[derive(Debug, Clone, Error)]
pub enum DatabaseError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderNotFound(i64),
    #[error("An order with number {0} already exists")]
    OrderNumberExists(String),
    #[error("The requested payment transaction {0} does not exist")]
    TransactionNotFound(i64),
    #[error("The requested refund {0} does not exist")]
    RefundNotFound(i64),
    #[error("Order {0} already has a refund in progress")]
    RefundInProgress(i64),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(e: sqlx::Error) -> Self {
        DatabaseError::DatabaseError(e.to_string())
    }
}
