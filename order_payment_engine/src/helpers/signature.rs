//! # Gateway signatures
//!
//! The gateway authenticates the two kinds of message it sends us with an HMAC-SHA256 tag, hex-encoded.
//!
//! * A payment confirmation, relayed by the customer's browser after checkout, is signed over the text
//!   `{gateway_order_id}|{gateway_payment_id}` using the API key secret.
//! * A webhook is signed over the raw request body, byte for byte, using the webhook secret. The body must never be
//!   parsed and re-serialized before verification, since the result is not guaranteed to be byte-identical.
//!
//! Tags are compared in constant time.
use hmac::{Hmac, Mac};
use log::trace;
use opg_common::Secret;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Error)]
pub enum SignatureConfigError {
    #[error("The {0} secret is not configured")]
    MissingSecret(&'static str),
}

/// Calculates the hex-encoded HMAC-SHA256 of `message` under `secret`.
pub fn calculate_hmac(secret: &[u8], message: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Returns true if `signature` is the hex-encoded HMAC-SHA256 of `message` under `secret`.
///
/// Malformed signatures (wrong length, not hex) simply fail to verify.
pub fn verify_hmac(secret: &[u8], message: &[u8], signature: &str) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        trace!("🔐️ Signature is not valid hex");
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    let expected = mac.finalize().into_bytes();
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

/// True iff `signature == hex(HMAC-SHA256(secret, "{gateway_order_id}|{gateway_payment_id}"))`
pub fn verify_payment_signature(secret: &str, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
    let message = format!("{gateway_order_id}|{gateway_payment_id}");
    verify_hmac(secret.as_bytes(), message.as_bytes(), signature)
}

/// Verifies gateway signatures. Construction fails if either secret is missing, which should be treated as fatal.
#[derive(Debug, Clone)]
pub struct SignatureValidator {
    confirmation_secret: Secret<String>,
    webhook_secret: Secret<String>,
}

impl SignatureValidator {
    pub fn new(
        confirmation_secret: Secret<String>,
        webhook_secret: Secret<String>,
    ) -> Result<Self, SignatureConfigError> {
        if confirmation_secret.is_empty() {
            return Err(SignatureConfigError::MissingSecret("payment confirmation"));
        }
        if webhook_secret.is_empty() {
            return Err(SignatureConfigError::MissingSecret("webhook"));
        }
        Ok(Self { confirmation_secret, webhook_secret })
    }

    /// Checks the signature the gateway issued for a completed payment.
    pub fn verify_payment(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
        verify_payment_signature(self.confirmation_secret.reveal(), gateway_order_id, gateway_payment_id, signature)
    }

    /// Checks a webhook signature against the exact bytes of the request body.
    pub fn verify_webhook(&self, raw_body: &[u8], signature: &str) -> bool {
        verify_hmac(self.webhook_secret.reveal().as_bytes(), raw_body, signature)
    }

    /// Signs a payment confirmation the way the gateway does. Useful for tests and sandbox tooling.
    pub fn sign_payment(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        let message = format!("{gateway_order_id}|{gateway_payment_id}");
        calculate_hmac(self.confirmation_secret.reveal().as_bytes(), message.as_bytes())
    }

    /// Signs a webhook body the way the gateway does. Useful for tests and sandbox tooling.
    pub fn sign_webhook(&self, raw_body: &[u8]) -> String {
        calculate_hmac(self.webhook_secret.reveal().as_bytes(), raw_body)
    }
}
