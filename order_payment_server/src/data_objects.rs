use order_payment_engine::objects::WebhookOutcome;
use serde::{Deserialize, Serialize};

/// The body returned to the gateway for every authenticated webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(flatten)]
    pub outcome: WebhookOutcome,
}

impl WebhookAck {
    pub fn new(outcome: WebhookOutcome) -> Self {
        Self { received: true, outcome }
    }
}
