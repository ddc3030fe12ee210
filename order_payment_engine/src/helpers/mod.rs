mod order_number;
mod retry;
mod signature;

pub use order_number::new_order_number;
pub use retry::{with_retry, RetryPolicy};
pub use signature::{
    calculate_hmac,
    verify_hmac,
    verify_payment_signature,
    SignatureConfigError,
    SignatureValidator,
};
