use std::{sync::Arc, time::Duration};

use log::*;
use opg_common::Secret;
use serde_json::{json, Value};
use sqlx::{migrate::MigrateDatabase, Sqlite};

use super::{
    fake_gateway::FakeGateway,
    prepare_env::{prepare_test_env, random_db_path},
};
use crate::{
    db_types::{MinorUnits, Product},
    events::EventProducers,
    objects::{CheckoutRequest, CheckoutResult, PaymentConfirmation},
    CheckoutOrchestrator,
    OrderQueryApi,
    PaymentVerifier,
    PricingPolicy,
    RefundOrchestrator,
    RetryPolicy,
    SignatureValidator,
    SqliteDatabase,
    WebhookReconciler,
};

pub const TEST_CONFIRMATION_SECRET: &str = "confirm_secret";
pub const TEST_WEBHOOK_SECRET: &str = "webhook_secret";

/// A complete engine over a fresh SQLite file and a [`FakeGateway`].
///
/// The pricing policy is 10% tax, a shipping fee of 500 and free shipping from 20000, so a single item priced at
/// 10000 gives an order total of 11500.
pub struct PaymentSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub gateway: Arc<FakeGateway>,
    pub validator: SignatureValidator,
    pub checkout: CheckoutOrchestrator<SqliteDatabase, FakeGateway>,
    pub verifier: PaymentVerifier<SqliteDatabase, FakeGateway>,
    pub webhooks: WebhookReconciler<SqliteDatabase>,
    pub refunds: RefundOrchestrator<SqliteDatabase, FakeGateway>,
    pub orders: OrderQueryApi<SqliteDatabase>,
}

impl std::fmt::Debug for PaymentSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentSystem ({})", self.db_path)
    }
}

pub fn test_pricing() -> PricingPolicy {
    PricingPolicy {
        currency: "INR".to_string(),
        tax_rate_bps: 1_000,
        shipping_fee: MinorUnits::from(500),
        free_shipping_threshold: Some(MinorUnits::from(20_000)),
    }
}

pub fn test_address() -> Value {
    json!({"line1": "12 MG Road", "city": "Bengaluru", "postal_code": "560001", "country": "IN"})
}

impl PaymentSystem {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let db_path = random_db_path();
        prepare_test_env(&db_path).await;
        let db = SqliteDatabase::new_with_url(&db_path, 5).await.expect("Error creating connection to database");
        debug!("🚀️ Created database: {db_path}");
        let gateway = Arc::new(FakeGateway::new());
        let validator = SignatureValidator::new(
            Secret::new(TEST_CONFIRMATION_SECRET.to_string()),
            Secret::new(TEST_WEBHOOK_SECRET.to_string()),
        )
        .expect("Test secrets are set");
        let retry = RetryPolicy::default().with_initial_delay(Duration::from_millis(1));
        let checkout = CheckoutOrchestrator::new(db.clone(), gateway.clone(), test_pricing())
            .with_retry_policy(retry)
            .with_producers(producers.clone());
        let verifier =
            PaymentVerifier::new(db.clone(), gateway.clone(), validator.clone()).with_producers(producers.clone());
        let webhooks = WebhookReconciler::new(db.clone(), validator.clone()).with_producers(producers.clone());
        let refunds = RefundOrchestrator::new(db.clone(), gateway.clone()).with_producers(producers);
        let orders = OrderQueryApi::new(db.clone());
        Self { db_path, db, gateway, validator, checkout, verifier, webhooks, refunds, orders }
    }

    /// Adds a product to the catalog and `quantity` of it to the customer's cart.
    pub async fn add_to_cart(&self, customer_id: &str, name: &str, price: i64, quantity: i64) -> Product {
        let product =
            self.db.insert_product(name, MinorUnits::from(price), None).await.expect("Error inserting product");
        self.db.set_cart_item(customer_id, product.id, quantity).await.expect("Error adding to cart");
        product
    }

    /// Fills the customer's cart with one item priced at 10000 and checks out.
    pub async fn checkout_standard_order(&self, customer_id: &str) -> CheckoutResult {
        self.add_to_cart(customer_id, "Filter coffee beans", 10_000, 1).await;
        let request =
            CheckoutRequest { customer_id: customer_id.to_string(), shipping_address: test_address(), client_total: None };
        self.checkout.checkout(request).await.expect("Checkout failed")
    }

    /// A confirmation carrying a valid signature
    pub fn signed_confirmation(&self, order_id: i64, gateway_order_id: &str, payment_id: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            order_id,
            gateway_order_id: gateway_order_id.to_string(),
            gateway_payment_id: payment_id.to_string(),
            gateway_signature: self.validator.sign_payment(gateway_order_id, payment_id),
        }
    }

    /// Returns a webhook body and its signature.
    pub fn signed_webhook(&self, event: &str, payment_id: &str, gateway_order_id: &str, amount: i64) -> (String, String) {
        let body = webhook_body(event, payment_id, gateway_order_id, amount);
        let signature = self.validator.sign_webhook(body.as_bytes());
        (body, signature)
    }

    pub async fn cleanup(mut self) {
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        if let Err(e) = Sqlite::drop_database(&self.db_path).await {
            warn!("🚀️ Failed to remove database {}: {e}", self.db_path);
        }
    }
}

pub fn webhook_body(event: &str, payment_id: &str, gateway_order_id: &str, amount: i64) -> String {
    let status = event.strip_prefix("payment.").unwrap_or(event);
    json!({
        "event": event,
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": gateway_order_id,
                    "amount": amount,
                    "currency": "INR",
                    "status": status,
                }
            }
        }
    })
    .to_string()
}
