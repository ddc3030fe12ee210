//! Request handler definitions
//!
//! Define each route and its handler here. The real work happens in the engine's orchestrators; handlers only
//! extract the request, call through, and shape the response.
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every handler here is async, and so is every call it makes into
//! the engine.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use order_payment_engine::{
    objects::{CheckoutRequest, PaymentConfirmation, RefundRequest},
    opg_api::webhooks::peek_event_name,
    traits::{OrderPaymentDatabase, PaymentGateway},
    CheckoutOrchestrator,
    OrderQueryApi,
    PaymentVerifier,
    RefundOrchestrator,
    WebhookReconciler,
};

use crate::{
    config::WebhookConfig,
    data_objects::WebhookAck,
    errors::ServerError,
    helpers::operator_id,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl OrderPaymentDatabase, PaymentGateway);
/// Creates an order from the customer's cart and opens a gateway order for it.
///
/// The response carries the gateway order id that the client hands to the gateway's payment form. Any total the
/// client sends is only compared against the server-side total; it is never charged.
pub async fn checkout<B, G>(
    body: web::Json<CheckoutRequest>,
    api: web::Data<CheckoutOrchestrator<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderPaymentDatabase,
    G: PaymentGateway,
{
    let request = body.into_inner();
    debug!("💻️ POST checkout for customer {}", request.customer_id);
    let result = api.checkout(request).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(retry_payment => Post "/orders/{id}/retry_payment" impl OrderPaymentDatabase, PaymentGateway);
pub async fn retry_payment<B, G>(
    path: web::Path<i64>,
    api: web::Data<CheckoutOrchestrator<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderPaymentDatabase,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    debug!("💻️ POST retry_payment for order {order_id}");
    let result = api.retry_payment(order_id).await?;
    Ok(HttpResponse::Ok().json(result))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(verify_payment => Post "/payments/verify" impl OrderPaymentDatabase, PaymentGateway);
/// Verifies a payment confirmation relayed by the customer's browser.
///
/// Repeating a successful confirmation is not an error. The response's `idempotent` flag says whether this call
/// recorded the payment or found it already recorded.
pub async fn verify_payment<B, G>(
    body: web::Json<PaymentConfirmation>,
    api: web::Data<PaymentVerifier<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderPaymentDatabase,
    G: PaymentGateway,
{
    let confirmation = body.into_inner();
    debug!("💻️ POST verify payment {} for order {}", confirmation.gateway_payment_id, confirmation.order_id);
    let result = api.confirm_payment(confirmation).await?;
    Ok(HttpResponse::Ok().json(result))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(gateway_webhook => Post "/gateway" impl OrderPaymentDatabase);
/// Receives the gateway's event notifications.
///
/// The signature covers the raw body, so the body is read as bytes and handed over untouched. Every authenticated
/// webhook is acknowledged with a 200, even if it could not be applied, so that the gateway does not keep
/// redelivering it.
pub async fn gateway_webhook<B: OrderPaymentDatabase>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<WebhookReconciler<B>>,
    config: web::Data<WebhookConfig>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ Received '{}' webhook", peek_event_name(&body).unwrap_or_else(|| "unknown".to_string()));
    let signature = req.headers().get(config.signature_header.as_str()).and_then(|v| v.to_str().ok());
    let outcome = api.process(&body, signature).await.map_err(|e| {
        warn!("💻️ Rejected webhook from {:?}. {e}", req.connection_info().peer_addr());
        e
    })?;
    Ok(HttpResponse::Ok().json(WebhookAck::new(outcome)))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_summary => Get "/orders/{id}" impl OrderPaymentDatabase);
pub async fn order_summary<B: OrderPaymentDatabase>(
    path: web::Path<i64>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order {order_id}");
    let summary = api.order_summary(order_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

route!(audit_trail => Get "/orders/{id}/audit" impl OrderPaymentDatabase);
pub async fn audit_trail<B: OrderPaymentDatabase>(
    path: web::Path<i64>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET audit trail for order {order_id}");
    let entries = api.audit_trail(order_id).await?;
    Ok(HttpResponse::Ok().json(entries))
}

//----------------------------------------------   Refunds  ----------------------------------------------------
route!(refund_order => Post "/orders/{id}/refund" impl OrderPaymentDatabase, PaymentGateway);
/// Refunds all or part of a captured order. The operator is named in the `X-Operator-Id` header.
///
/// A failed gateway call is reported as a 502 and is never retried automatically. The operator may retry once the
/// failure is understood.
pub async fn refund_order<B, G>(
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<RefundRequest>,
    api: web::Data<RefundOrchestrator<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderPaymentDatabase,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    let operator = operator_id(&req);
    info!("💻️ POST refund for order {order_id} by {operator}");
    let result = api.refund_order(order_id, body.into_inner(), &operator).await?;
    Ok(HttpResponse::Ok().json(result))
}
