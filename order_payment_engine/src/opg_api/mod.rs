//! # Payment flow API
//!
//! The orchestrators in this module implement the order and payment lifecycle on top of the storage traits and the
//! [`crate::traits::PaymentGateway`] client. They hold no state of their own beyond configuration, so any number of
//! them can run concurrently against the same database.
//!
//! * [`checkout::CheckoutOrchestrator`] prices the cart, creates the order and opens the gateway order.
//! * [`verifier::PaymentVerifier`] checks the signature on a browser-relayed payment confirmation and records the
//!   capture.
//! * [`webhooks::WebhookReconciler`] applies the gateway's event notifications.
//! * [`refunds::RefundOrchestrator`] refunds captured payments.
//! * [`orders::OrderQueryApi`] reads orders back.
//! * [`audit::AuditSink`] is the append-only audit trail they all write to.
pub mod audit;
pub mod checkout;
pub mod errors;
pub mod objects;
pub mod orders;
pub mod pricing;
pub mod refunds;
pub mod verifier;
pub mod webhooks;

pub use audit::{AuditSink, SECURITY_LOG_TARGET};
pub use checkout::CheckoutOrchestrator;
pub use errors::PaymentFlowError;
pub use orders::OrderQueryApi;
pub use pricing::{PriceBreakdown, PricingPolicy};
pub use refunds::RefundOrchestrator;
pub use verifier::PaymentVerifier;
pub use webhooks::{PaymentEventApplier, WebhookReconciler};
