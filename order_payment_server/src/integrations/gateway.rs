//! Adapts the gateway REST client to the engine's [`PaymentGateway`] trait.
use gateway_tools::{GatewayApi, GatewayApiError, NewGatewayOrder, NewGatewayRefund};
use log::*;
use order_payment_engine::traits::{
    GatewayError,
    GatewayOrder,
    GatewayOrderRequest,
    GatewayPayment,
    GatewayRefund,
    GatewayRefundRequest,
    PaymentGateway,
};

#[derive(Debug, Clone)]
pub struct HttpGateway {
    api: GatewayApi,
}

impl HttpGateway {
    pub fn new(api: GatewayApi) -> Self {
        Self { api }
    }
}

impl PaymentGateway for HttpGateway {
    async fn create_order(&self, request: GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let GatewayOrderRequest { amount, currency, receipt, notes } = request;
        let order = self.api.create_order(NewGatewayOrder { amount, currency, receipt, notes }).await.map_err(map_error)?;
        Ok(GatewayOrder {
            id: order.id,
            amount: order.amount,
            currency: order.currency,
            receipt: order.receipt,
            status: order.status,
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let payment = self.api.fetch_payment(payment_id).await.map_err(map_error)?;
        Ok(GatewayPayment {
            id: payment.id,
            order_id: payment.order_id,
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            method: payment.method,
            error_code: payment.error_code,
            error_description: payment.error_description,
        })
    }

    async fn create_refund(&self, request: GatewayRefundRequest) -> Result<GatewayRefund, GatewayError> {
        let GatewayRefundRequest { payment_id, amount, notes } = request;
        let refund =
            self.api.create_refund(&payment_id, NewGatewayRefund { amount, notes }).await.map_err(map_error)?;
        Ok(GatewayRefund { id: refund.id, payment_id: refund.payment_id, amount: refund.amount, status: refund.status })
    }
}

/// 4xx answers are rejections, 5xx answers mean the gateway is unavailable.
pub fn map_error(e: GatewayApiError) -> GatewayError {
    debug!("💳️ Gateway call failed. {e}");
    match e {
        GatewayApiError::QueryError { status, message } if (400..500).contains(&status) => {
            GatewayError::Rejected { status, message }
        },
        GatewayApiError::QueryError { status, message } => GatewayError::Unavailable { status, message },
        GatewayApiError::RestRequestError(s) | GatewayApiError::RestResponseError(s) => GatewayError::Transport(s),
        GatewayApiError::JsonError(s) => GatewayError::InvalidResponse(s),
        GatewayApiError::Initialization(s) => GatewayError::Transport(s),
    }
}
