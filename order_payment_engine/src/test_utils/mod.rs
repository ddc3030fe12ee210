//! Helpers for tests of the engine and of crates that embed it. Enabled with the `test_utils` feature.
pub mod fake_gateway;
pub mod prepare_env;
pub mod system;

pub use fake_gateway::FakeGateway;
pub use system::{PaymentSystem, TEST_CONFIRMATION_SECRET, TEST_WEBHOOK_SECRET};
