use std::{sync::Arc, time::Duration};

use actix_web::{
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use log::debug;
use opg_common::{MinorUnits, Secret};
use order_payment_engine::{
    objects::CheckoutRequest,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        system::{test_address, test_pricing, webhook_body},
        TEST_CONFIRMATION_SECRET,
        TEST_WEBHOOK_SECRET,
    },
    CheckoutOrchestrator,
    OrderQueryApi,
    PaymentVerifier,
    RefundOrchestrator,
    RetryPolicy,
    SignatureValidator,
    SqliteDatabase,
    WebhookReconciler,
};
use serde_json::{json, Value};

use super::mocks::{accepting_gateway, MockGateway};
use crate::{
    config::WebhookConfig,
    routes::{
        AuditTrailRoute,
        CheckoutRoute,
        GatewayWebhookRoute,
        OrderSummaryRoute,
        RefundOrderRoute,
        RetryPaymentRoute,
        VerifyPaymentRoute,
    },
};

/// A throwaway database plus the signing keys the test routes are configured with.
pub struct TestBackend {
    pub db: SqliteDatabase,
    pub validator: SignatureValidator,
}

impl TestBackend {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        let validator = SignatureValidator::new(
            Secret::new(TEST_CONFIRMATION_SECRET.to_string()),
            Secret::new(TEST_WEBHOOK_SECRET.to_string()),
        )
        .expect("Test secrets are set");
        Self { db, validator }
    }

    /// Puts one item priced at 10000 in the customer's cart. With the test pricing policy the order total is 11500.
    pub async fn fill_cart(&self, customer_id: &str) {
        let product =
            self.db.insert_product("Darjeeling tea", MinorUnits::from(10_000), None).await.expect("Error adding product");
        self.db.set_cart_item(customer_id, product.id, 1).await.expect("Error filling cart");
    }

    pub fn checkout_request(&self, customer_id: &str) -> Value {
        let request = CheckoutRequest {
            customer_id: customer_id.to_string(),
            shipping_address: test_address(),
            client_total: None,
        };
        serde_json::to_value(request).expect("serializable")
    }

    /// Checks out a standard order over HTTP. Returns the order id and the gateway order id.
    pub async fn checkout(&self, customer_id: &str) -> (i64, String) {
        self.fill_cart(customer_id).await;
        let req = TestRequest::post().uri("/api/checkout").set_json(self.checkout_request(customer_id));
        let (status, body) = send_request(req, self.configure(accepting_gateway(), WebhookConfig::default())).await;
        assert_eq!(status, StatusCode::OK, "Checkout failed: {body}");
        let body = json_body(&body);
        let order_id = body["order"]["id"].as_i64().expect("order id");
        let gateway_order_id = body["gateway_order_id"].as_str().expect("gateway order id").to_string();
        (order_id, gateway_order_id)
    }

    /// A confirmation body carrying a valid signature
    pub fn signed_confirmation(&self, order_id: i64, gateway_order_id: &str, payment_id: &str) -> Value {
        json!({
            "order_id": order_id,
            "gateway_order_id": gateway_order_id,
            "gateway_payment_id": payment_id,
            "gateway_signature": self.validator.sign_payment(gateway_order_id, payment_id),
        })
    }

    pub fn signed_webhook(&self, event: &str, payment_id: &str, gateway_order_id: &str, amount: i64) -> (String, String) {
        let body = webhook_body(event, payment_id, gateway_order_id, amount);
        let signature = self.validator.sign_webhook(body.as_bytes());
        (body, signature)
    }

    /// Registers every API and webhook route against this backend and the given gateway.
    pub fn configure(&self, gateway: MockGateway, webhook: WebhookConfig) -> impl FnOnce(&mut ServiceConfig) {
        let db = self.db.clone();
        let validator = self.validator.clone();
        move |cfg| {
            let gateway = Arc::new(gateway);
            let retry = RetryPolicy::default().with_initial_delay(Duration::from_millis(1));
            let checkout = CheckoutOrchestrator::new(db.clone(), gateway.clone(), test_pricing())
                .with_retry_policy(retry)
                .with_strict_capture_amount(webhook.strict_capture_amount);
            let verifier = PaymentVerifier::new(db.clone(), gateway.clone(), validator.clone());
            let webhooks = WebhookReconciler::new(db.clone(), validator)
                .with_strict_capture_amount(webhook.strict_capture_amount);
            let refunds = RefundOrchestrator::new(db.clone(), gateway);
            let orders = OrderQueryApi::new(db);
            cfg.app_data(web::Data::new(checkout))
                .app_data(web::Data::new(verifier))
                .app_data(web::Data::new(webhooks))
                .app_data(web::Data::new(refunds))
                .app_data(web::Data::new(orders))
                .app_data(web::Data::new(webhook))
                .service(
                    web::scope("/api")
                        .service(CheckoutRoute::<SqliteDatabase, MockGateway>::new())
                        .service(RetryPaymentRoute::<SqliteDatabase, MockGateway>::new())
                        .service(VerifyPaymentRoute::<SqliteDatabase, MockGateway>::new())
                        .service(RefundOrderRoute::<SqliteDatabase, MockGateway>::new())
                        .service(AuditTrailRoute::<SqliteDatabase>::new())
                        .service(OrderSummaryRoute::<SqliteDatabase>::new()),
                )
                .service(web::scope("/webhook").service(GatewayWebhookRoute::<SqliteDatabase>::new()));
        }
    }
}

/// Sends a single request to a fresh app built by `configure` and returns the status and the body as a string.
pub async fn send_request<F>(req: TestRequest, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let app = test::init_service(App::new().configure(configure)).await;
    debug!("Making request");
    let res = test::call_service(&app, req.to_request()).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

pub fn json_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Response is not JSON ({e}): {body}"))
}
