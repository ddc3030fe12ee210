//! #  Storage and gateway contracts
//!
//! This module defines the interfaces that the reconciliation engine depends on. Backends implement the storage
//! traits, and the HTTP integration layer implements [`PaymentGateway`].
//!
//! ## Storage
//! * [`OrderPaymentDatabase`] is the umbrella trait for a complete backend.
//! * [`OrderManagement`] stores orders, their items and notes, and performs the guarded order status transitions.
//! * [`TransactionManagement`] stores payment transactions and the append-only webhook event log.
//! * [`RefundManagement`] stores refunds and completes them atomically.
//! * [`AuditManagement`] stores the insert-only audit trail.
//! * [`CatalogManagement`] and [`CartManagement`] are narrow, read-mostly views of the catalog and the cart.
//!
//! Every status transition is a conditional update keyed on the expected prior state. Methods that perform one
//! return `Ok(None)` when the row was not in an eligible state, i.e. when another writer got there first.
//!
//! ## Gateway
//! * [`PaymentGateway`] is the outbound payment gateway client.
mod audit_management;
mod catalog;
mod data_objects;
mod order_management;
mod order_payment_database;
mod payment_gateway;
mod refund_management;
mod transaction_management;

pub use audit_management::AuditManagement;
pub use catalog::{CartManagement, CatalogManagement};
pub use data_objects::CaptureDetails;
pub use order_management::OrderManagement;
pub use order_payment_database::{DatabaseError, OrderPaymentDatabase};
pub use payment_gateway::{
    GatewayError,
    GatewayOrder,
    GatewayOrderRequest,
    GatewayPayment,
    GatewayRefund,
    GatewayRefundRequest,
    PaymentGateway,
};
pub use refund_management::RefundManagement;
pub use transaction_management::TransactionManagement;
