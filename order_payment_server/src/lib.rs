//! # Order payment gateway server
//!
//! This crate hosts the HTTP front end of the order payment engine. It is responsible for:
//! * Taking checkouts and opening gateway orders for them.
//! * Verifying the signed payment confirmations that browsers relay after a payment.
//! * Receiving the gateway's webhooks and handing them to the reconciler.
//! * Operator actions: refunds, order summaries and the audit trail.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/api/checkout`, `/api/orders/{id}/retry_payment`: Order creation.
//! * `/api/payments/verify`: Browser-relayed payment confirmations.
//! * `/api/orders/{id}`, `/api/orders/{id}/audit`, `/api/orders/{id}/refund`: Operator routes.
//! * `/webhook/gateway`: Event notifications from the payment gateway.
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
