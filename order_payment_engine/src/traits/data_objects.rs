use chrono::{DateTime, Utc};

/// The fields written onto an order when its payment is captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDetails {
    pub gateway_payment_id: String,
    /// Only the synchronous confirmation path carries a signature.
    pub gateway_signature: Option<String>,
    pub raw_payload: String,
    pub captured_at: DateTime<Utc>,
}

impl CaptureDetails {
    pub fn new<S: Into<String>>(gateway_payment_id: S, raw_payload: String) -> Self {
        Self { gateway_payment_id: gateway_payment_id.into(), gateway_signature: None, raw_payload, captured_at: Utc::now() }
    }

    pub fn with_signature<S: Into<String>>(mut self, signature: S) -> Self {
        self.gateway_signature = Some(signature.into());
        self
    }
}
