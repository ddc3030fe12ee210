use std::time::Duration;

use log::*;
use opg_common::Secret;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Base URL of the gateway API, without a trailing slash
    pub base_url: String,
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: &str, key_id: &str, key_secret: Secret<String>) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { base_url, key_id: key_id.to_string(), key_secret, timeout: DEFAULT_TIMEOUT }
    }

    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("OPG_GATEWAY_URL").unwrap_or_else(|_| {
            warn!("OPG_GATEWAY_URL not set, using the sandbox default");
            "https://sandbox.gateway.example.com".to_string()
        });
        let key_id = std::env::var("OPG_GATEWAY_KEY_ID").unwrap_or_else(|_| {
            warn!("OPG_GATEWAY_KEY_ID not set, using (probably useless) default");
            "key_test_00000000".to_string()
        });
        let key_secret = Secret::new(std::env::var("OPG_GATEWAY_KEY_SECRET").unwrap_or_else(|_| {
            warn!("OPG_GATEWAY_KEY_SECRET not set. Calls to the gateway will fail.");
            String::new()
        }));
        let timeout = std::env::var("OPG_GATEWAY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("Invalid value for OPG_GATEWAY_TIMEOUT_SECS: {s}. {e}"))
                    .ok()
            })
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        let mut config = Self::new(&base_url, &key_id, key_secret);
        config.timeout = timeout;
        config
    }
}
