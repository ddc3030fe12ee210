//! Order Payment Engine
//!
//! The order payment engine reconciles a shop's orders with the payments taken for them by an external payment
//! gateway. It is gateway-agnostic: the gateway is reached through the [`PaymentGateway`] trait, which the server
//! implements over HTTP and tests replace with a deterministic fake.
//!
//! The library is divided into the following sections:
//! 1. Storage ([`mod@traits`] and [`SqliteDatabase`]). Every state transition on an order, payment transaction or
//!    refund is a conditional update keyed on the expected prior state, so that concurrent writers (a browser-relayed
//!    confirmation and a webhook, say) can never apply the same transition twice.
//! 2. The payment flow API ([`mod@opg_api`]): checkout, payment verification, webhook reconciliation, refunds and the
//!    audit trail.
//! 3. Gateway signature checks ([`SignatureValidator`]) and the retry policy for outbound calls ([`mod@helpers`]).
//!
//! The engine also emits events when an order is paid or refunded. See [`mod@events`] for how to hook into them.
mod sqlite;

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod opg_api;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use helpers::{RetryPolicy, SignatureValidator};
pub use opg_api::{
    objects,
    AuditSink,
    CheckoutOrchestrator,
    OrderQueryApi,
    PaymentFlowError,
    PaymentVerifier,
    PricingPolicy,
    RefundOrchestrator,
    WebhookReconciler,
};
pub use sqlite::{db::db_url, SqliteDatabase};
pub use traits::{OrderPaymentDatabase, PaymentGateway};
