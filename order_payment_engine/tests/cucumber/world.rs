use cucumber::World;
use order_payment_engine::{
    objects::{CheckoutResult, ConfirmationResult, WebhookOutcome},
    test_utils::PaymentSystem,
    PaymentFlowError,
};

#[derive(Default, Debug, World)]
pub struct PaymentWorld {
    pub system: Option<PaymentSystem>,
    pub checkout: Option<CheckoutResult>,
    pub confirmation: Option<ConfirmationResult>,
    pub webhook_outcome: Option<WebhookOutcome>,
    pub last_error: Option<PaymentFlowError>,
}

impl PaymentWorld {
    pub fn system(&self) -> &PaymentSystem {
        self.system.as_ref().expect("Payment system not initialised")
    }

    pub fn checkout(&self) -> &CheckoutResult {
        self.checkout.as_ref().expect("No order has been checked out")
    }

    pub fn order_id(&self) -> i64 {
        self.checkout().order.id
    }

    pub fn gateway_order_id(&self) -> String {
        self.checkout().gateway_order_id.clone()
    }

    /// Records the result of a step. Errors are kept for later assertions rather than failing the step.
    pub fn record<T>(&mut self, result: Result<T, PaymentFlowError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            },
            Err(e) => {
                self.last_error = Some(e);
                None
            },
        }
    }
}
