//! A thin REST client for the payment gateway's order, payment and refund endpoints.
mod api;
mod config;
mod data_objects;
mod error;

pub use api::GatewayApi;
pub use config::GatewayConfig;
pub use data_objects::{NewGatewayOrder, NewGatewayRefund, RemoteOrder, RemotePayment, RemoteRefund};
pub use error::GatewayApiError;
