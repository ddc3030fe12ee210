use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::GatewayConfig,
    data_objects::{NewGatewayOrder, NewGatewayRefund, RemoteOrder, RemotePayment, RemoteRefund},
    GatewayApiError,
};

#[derive(Clone)]
pub struct GatewayApi {
    config: GatewayConfig,
    client: Arc<Client>,
}

impl std::fmt::Debug for GatewayApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GatewayApi ({})", self.config.base_url)
    }
}

impl GatewayApi {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<T, GatewayApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {method} {url}");
        let mut req = self
            .client
            .request(method, url)
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.reveal()));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| GatewayApiError::RestRequestError(e.to_string()))?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| GatewayApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| GatewayApiError::RestResponseError(e.to_string()))?;
            Err(GatewayApiError::QueryError { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.config.base_url)
    }

    pub async fn create_order(&self, order: NewGatewayOrder) -> Result<RemoteOrder, GatewayApiError> {
        debug!("Opening gateway order for receipt {} ({} {})", order.receipt, order.amount, order.currency);
        let result = self.rest_query::<RemoteOrder, _>(Method::POST, "/orders", Some(order)).await?;
        info!("Gateway order {} created", result.id);
        Ok(result)
    }

    pub async fn fetch_payment(&self, payment_id: &str) -> Result<RemotePayment, GatewayApiError> {
        let path = format!("/payments/{payment_id}");
        debug!("Fetching payment {payment_id}");
        self.rest_query::<RemotePayment, ()>(Method::GET, &path, None).await
    }

    /// Refunds (part of) a payment. The gateway treats every call as a new refund, so never repeat a failed call
    /// without checking the payment first.
    pub async fn create_refund(
        &self,
        payment_id: &str,
        refund: NewGatewayRefund,
    ) -> Result<RemoteRefund, GatewayApiError> {
        let path = format!("/payments/{payment_id}/refund");
        debug!("Refunding {} of payment {payment_id}", refund.amount);
        let result = self.rest_query::<RemoteRefund, _>(Method::POST, &path, Some(refund)).await?;
        info!("Refund {} for payment {payment_id} is {}", result.id, result.status);
        Ok(result)
    }
}
