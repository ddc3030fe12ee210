use std::{env, net::IpAddr, str::FromStr, time::Duration};

use gateway_tools::GatewayConfig;
use log::*;
use opg_common::{helpers::parse_boolean_flag, MinorUnits, Secret};
use order_payment_engine::{PricingPolicy, RetryPolicy, SignatureValidator};

use crate::errors::ServerError;

const DEFAULT_OPG_HOST: &str = "127.0.0.1";
const DEFAULT_OPG_PORT: u16 = 8360;
pub const DEFAULT_SIGNATURE_HEADER: &str = "X-Gateway-Signature";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Gateway API credentials. The key secret doubles as the payment confirmation signing secret.
    pub gateway: GatewayConfig,
    pub webhook: WebhookConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    pub pricing: PricingPolicy,
    /// Retry policy for opening gateway orders. Refunds are never retried.
    pub retry: RetryPolicy,
    /// Paid and refunded orders are posted here, if set.
    pub notification_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub secret: Secret<String>,
    /// The request header that carries the signature of the webhook body
    pub signature_header: String,
    /// If supplied, requests against /webhook endpoints will be checked against a whitelist of gateway IP addresses.
    /// To explicitly disable the whitelist, set this to "false", "none", or "0".
    pub whitelist: Option<Vec<IpAddr>>,
    /// When true, a capture for an amount other than the order total is recorded but not applied.
    pub strict_capture_amount: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: Secret::default(),
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            whitelist: None,
            strict_capture_amount: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OPG_HOST.to_string(),
            port: DEFAULT_OPG_PORT,
            database_url: String::default(),
            gateway: GatewayConfig::default(),
            webhook: WebhookConfig::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            pricing: PricingPolicy::default(),
            retry: RetryPolicy::default(),
            notification_url: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("OPG_HOST").ok().unwrap_or_else(|| DEFAULT_OPG_HOST.into());
        let port = env_or("OPG_PORT", DEFAULT_OPG_PORT);
        let database_url = env::var("OPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ OPG_DATABASE_URL is not set. Please set it to the URL for the order payments database.");
            String::default()
        });
        let gateway = GatewayConfig::new_from_env_or_default();
        let webhook = WebhookConfig::from_env_or_default();
        let use_x_forwarded_for = parse_boolean_flag(env::var("OPG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("OPG_USE_FORWARDED").ok(), false);
        let pricing = pricing_from_env();
        let retry = RetryPolicy::default()
            .with_max_attempts(env_or("OPG_GATEWAY_MAX_ATTEMPTS", 3))
            .with_initial_delay(Duration::from_millis(env_or("OPG_GATEWAY_RETRY_DELAY_MS", 250)));
        let notification_url = env::var("OPG_NOTIFICATION_URL").ok().filter(|s| !s.trim().is_empty());
        if notification_url.is_none() {
            info!("🪛️ OPG_NOTIFICATION_URL is not set. Order notifications are disabled.");
        }
        Self {
            host,
            port,
            database_url,
            gateway,
            webhook,
            use_x_forwarded_for,
            use_forwarded,
            pricing,
            retry,
            notification_url,
        }
    }

    /// Builds the validator for confirmation and webhook signatures. Missing secrets are a fatal configuration error.
    pub fn signature_validator(&self) -> Result<SignatureValidator, ServerError> {
        SignatureValidator::new(self.gateway.key_secret.clone(), self.webhook.secret.clone())
            .map_err(|e| ServerError::ConfigurationError(e.to_string()))
    }
}

impl WebhookConfig {
    pub fn from_env_or_default() -> Self {
        let secret = Secret::new(env::var("OPG_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ OPG_WEBHOOK_SECRET is not set. Please set it to the webhook secret for your gateway account.");
            String::default()
        }));
        let signature_header = env::var("OPG_WEBHOOK_SIGNATURE_HEADER")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SIGNATURE_HEADER.to_string());
        let whitelist = env::var("OPG_GATEWAY_IP_WHITELIST").ok().and_then(|s| parse_whitelist(&s));
        match &whitelist {
            Some(whitelist) if whitelist.is_empty() => {
                warn!(
                    "🚨️ The gateway IP whitelist was configured, but is empty. The server will run, but won't \
                     accept any incoming webhooks."
                );
            },
            Some(whitelist) => info!("🪛️ Gateway IP whitelist: {whitelist:?}"),
            None => warn!("🚨️ No gateway IP whitelist is set. Webhooks will be accepted from any address."),
        }
        let strict_capture_amount = parse_boolean_flag(env::var("OPG_STRICT_CAPTURE_AMOUNT").ok(), true);
        Self { secret, signature_header, whitelist, strict_capture_amount }
    }
}

pub fn parse_whitelist(s: &str) -> Option<Vec<IpAddr>> {
    if ["none", "false", "0"].contains(&s.trim().to_lowercase().as_str()) {
        info!(
            "🪛️ Gateway IP whitelist is disabled. If this is not what you want, set OPG_GATEWAY_IP_WHITELIST to a \
             comma-separated list of IP addresses to enable it."
        );
        return None;
    }
    let ip_addrs = s
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            s.parse::<IpAddr>()
                .map_err(|e| warn!("🪛️ Ignoring invalid IP address ({s}) in OPG_GATEWAY_IP_WHITELIST: {e}"))
                .ok()
        })
        .collect();
    Some(ip_addrs)
}

fn pricing_from_env() -> PricingPolicy {
    let defaults = PricingPolicy::default();
    let currency = env::var("OPG_CURRENCY").ok().map(|s| s.trim().to_uppercase()).unwrap_or(defaults.currency);
    let tax_rate_bps = env_or("OPG_TAX_RATE_BPS", defaults.tax_rate_bps);
    let shipping_fee = MinorUnits::from(env_or("OPG_SHIPPING_FEE", defaults.shipping_fee.value()));
    let free_shipping_threshold = match env::var("OPG_FREE_SHIPPING_THRESHOLD") {
        Ok(s) if ["none", "false", "0"].contains(&s.trim().to_lowercase().as_str()) => None,
        Ok(s) => match s.trim().parse::<i64>() {
            Ok(v) => Some(MinorUnits::from(v)),
            Err(e) => {
                error!("🪛️ {s} is not a valid value for OPG_FREE_SHIPPING_THRESHOLD. {e} Using the default instead.");
                defaults.free_shipping_threshold
            },
        },
        Err(_) => defaults.free_shipping_threshold,
    };
    PricingPolicy { currency, tax_rate_bps, shipping_fee, free_shipping_threshold }
}

/// Reads and parses an environment variable, falling back to `default` if it is missing or invalid.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}
