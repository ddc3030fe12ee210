use mockall::mock;
use order_payment_engine::traits::{
    GatewayError,
    GatewayOrder,
    GatewayOrderRequest,
    GatewayPayment,
    GatewayRefund,
    GatewayRefundRequest,
    PaymentGateway,
};

mock! {
    pub Gateway {}
    impl PaymentGateway for Gateway {
        async fn create_order(&self, request: GatewayOrderRequest) -> Result<GatewayOrder, GatewayError>;
        async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError>;
        async fn create_refund(&self, request: GatewayRefundRequest) -> Result<GatewayRefund, GatewayError>;
    }
}

/// A gateway that opens every order it is asked for, numbering them `order_ep1`, `order_ep2`, ...
pub fn accepting_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    let mut n = 0;
    gateway.expect_create_order().returning(move |req| {
        n += 1;
        Ok(GatewayOrder {
            id: format!("order_ep{n}"),
            amount: req.amount,
            currency: req.currency,
            receipt: Some(req.receipt),
            status: "created".to_string(),
        })
    });
    gateway
        .expect_fetch_payment()
        .returning(|id| Err(GatewayError::Rejected { status: 404, message: format!("{id} not found") }));
    gateway
}
