use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
};

use crate::{
    db_types::MinorUnits,
    traits::{
        GatewayError,
        GatewayOrder,
        GatewayOrderRequest,
        GatewayPayment,
        GatewayRefund,
        GatewayRefundRequest,
        PaymentGateway,
    },
};

/// A deterministic, in-memory payment gateway.
///
/// Unless a response has been scripted, every order and refund request succeeds. Order ids are `order_gw{n}` and
/// refund ids are `rfnd_gw{n}`, numbered from 1 in call order.
#[derive(Debug, Default)]
pub struct FakeGateway {
    order_results: Mutex<VecDeque<Result<(), GatewayError>>>,
    refund_results: Mutex<VecDeque<Result<(), GatewayError>>>,
    payments: Mutex<HashMap<String, GatewayPayment>>,
    order_requests: Mutex<Vec<GatewayOrderRequest>>,
    refund_requests: Mutex<Vec<GatewayRefundRequest>>,
    order_calls: AtomicU32,
    refund_calls: AtomicU32,
    payment_calls: AtomicU32,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next order-create call fails with `err`. Calls can be queued.
    pub fn fail_next_order(&self, err: GatewayError) {
        self.order_results.lock().unwrap().push_back(Err(err));
    }

    /// The next refund call fails with `err`. Calls can be queued.
    pub fn fail_next_refund(&self, err: GatewayError) {
        self.refund_results.lock().unwrap().push_back(Err(err));
    }

    /// Makes the payment available to `fetch_payment`. Unknown payments are reported as not found.
    pub fn add_payment(&self, id: &str, gateway_order_id: &str, amount: MinorUnits) {
        let payment = GatewayPayment {
            id: id.to_string(),
            order_id: Some(gateway_order_id.to_string()),
            amount,
            currency: "INR".to_string(),
            status: "captured".to_string(),
            method: Some("card".to_string()),
            error_code: None,
            error_description: None,
        };
        self.payments.lock().unwrap().insert(id.to_string(), payment);
    }

    pub fn order_calls(&self) -> u32 {
        self.order_calls.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> u32 {
        self.refund_calls.load(Ordering::SeqCst)
    }

    pub fn payment_calls(&self) -> u32 {
        self.payment_calls.load(Ordering::SeqCst)
    }

    pub fn order_requests(&self) -> Vec<GatewayOrderRequest> {
        self.order_requests.lock().unwrap().clone()
    }

    pub fn refund_requests(&self) -> Vec<GatewayRefundRequest> {
        self.refund_requests.lock().unwrap().clone()
    }
}

impl PaymentGateway for FakeGateway {
    async fn create_order(&self, request: GatewayOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let n = self.order_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.order_requests.lock().unwrap().push(request.clone());
        let scripted = self.order_results.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(()))?;
        Ok(GatewayOrder {
            id: format!("order_gw{n}"),
            amount: request.amount,
            currency: request.currency,
            receipt: Some(request.receipt),
            status: "created".to_string(),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        self.payment_calls.fetch_add(1, Ordering::SeqCst);
        self.payments
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected { status: 404, message: format!("Payment {payment_id} not found") })
    }

    async fn create_refund(&self, request: GatewayRefundRequest) -> Result<GatewayRefund, GatewayError> {
        let n = self.refund_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.refund_requests.lock().unwrap().push(request.clone());
        let scripted = self.refund_results.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(()))?;
        Ok(GatewayRefund {
            id: format!("rfnd_gw{n}"),
            payment_id: request.payment_id,
            amount: request.amount,
            status: "processed".to_string(),
        })
    }
}
