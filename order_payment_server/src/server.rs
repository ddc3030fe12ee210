use std::{sync::Arc, time::Duration};

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::{future::ok, FutureExt};
use gateway_tools::GatewayApi;
use log::*;
use order_payment_engine::{
    events::EventProducers,
    traits::PaymentGateway,
    CheckoutOrchestrator,
    OrderQueryApi,
    PaymentVerifier,
    RefundOrchestrator,
    SignatureValidator,
    SqliteDatabase,
    WebhookReconciler,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    helpers::get_remote_ip,
    integrations::{gateway::HttpGateway, notifications::create_notification_handlers},
    routes::{
        health,
        AuditTrailRoute,
        CheckoutRoute,
        GatewayWebhookRoute,
        OrderSummaryRoute,
        RefundOrderRoute,
        RetryPaymentRoute,
        VerifyPaymentRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let validator = config.signature_validator()?;
    let gateway = HttpGateway::new(GatewayApi::new(config.gateway.clone())?);
    let producers = match &config.notification_url {
        Some(url) => {
            info!("📬️ Order notifications will be sent to {url}");
            let handlers = create_notification_handlers(url);
            let producers = handlers.producers();
            handlers.start_handlers().await;
            producers
        },
        None => EventProducers::default(),
    };
    let srv = create_server_instance(config, db, Arc::new(gateway), validator, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance<G>(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: Arc<G>,
    validator: SignatureValidator,
    producers: EventProducers,
) -> Result<Server, ServerError>
where
    G: PaymentGateway + Send + Sync + 'static,
{
    let srv = HttpServer::new(move || {
        let checkout_api = CheckoutOrchestrator::new(db.clone(), gateway.clone(), config.pricing.clone())
            .with_retry_policy(config.retry)
            .with_producers(producers.clone())
            .with_strict_capture_amount(config.webhook.strict_capture_amount);
        let verifier_api =
            PaymentVerifier::new(db.clone(), gateway.clone(), validator.clone()).with_producers(producers.clone());
        let webhook_api = WebhookReconciler::new(db.clone(), validator.clone())
            .with_producers(producers.clone())
            .with_strict_capture_amount(config.webhook.strict_capture_amount);
        let refund_api = RefundOrchestrator::new(db.clone(), gateway.clone()).with_producers(producers.clone());
        let orders_api = OrderQueryApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("opg::access_log"))
            .app_data(web::Data::new(checkout_api))
            .app_data(web::Data::new(verifier_api))
            .app_data(web::Data::new(webhook_api))
            .app_data(web::Data::new(refund_api))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(config.webhook.clone()));
        let api_scope = web::scope("/api")
            .service(CheckoutRoute::<SqliteDatabase, G>::new())
            .service(RetryPaymentRoute::<SqliteDatabase, G>::new())
            .service(VerifyPaymentRoute::<SqliteDatabase, G>::new())
            .service(RefundOrderRoute::<SqliteDatabase, G>::new())
            .service(AuditTrailRoute::<SqliteDatabase>::new())
            .service(OrderSummaryRoute::<SqliteDatabase>::new());
        let use_x_forwarded_for = config.use_x_forwarded_for;
        let use_forwarded = config.use_forwarded;
        let gateway_whitelist = config.webhook.whitelist.clone();
        let webhook_scope = web::scope("/webhook")
            .wrap_fn(move |req, srv| {
                let peer_ip = get_remote_ip(req.request(), use_x_forwarded_for, use_forwarded);
                let whitelisted = match (peer_ip, &gateway_whitelist) {
                    (Some(ip), Some(whitelist)) => {
                        info!("🪝️ Gateway webhook from {ip}");
                        whitelist.contains(&ip)
                    },
                    (_, None) => true,
                    (None, Some(_)) => {
                        warn!("🪝️ No IP address found in gateway webhook request, denying access.");
                        false
                    },
                };
                if whitelisted {
                    srv.call(req)
                } else {
                    warn!(target: "opg::security", "🪝️ Webhook from {peer_ip:?} is not on the gateway whitelist");
                    ok(req.error_response(ServerError::ForbiddenPeer)).boxed_local()
                }
            })
            .service(GatewayWebhookRoute::<SqliteDatabase>::new());
        app.service(health).service(api_scope).service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
