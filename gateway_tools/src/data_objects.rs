use opg_common::MinorUnits;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct NewGatewayOrder {
    pub amount: MinorUnits,
    pub currency: String,
    pub receipt: String,
    pub notes: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteOrder {
    pub id: String,
    pub amount: MinorUnits,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemotePayment {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewGatewayRefund {
    pub amount: MinorUnits,
    pub notes: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: MinorUnits,
    pub status: String,
}
