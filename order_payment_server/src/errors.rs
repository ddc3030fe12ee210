use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use gateway_tools::GatewayApiError;
use order_payment_engine::PaymentFlowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Requests from this address are not allowed.")]
    ForbiddenPeer,
    #[error("{0}")]
    PaymentFlow(#[from] PaymentFlowError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ForbiddenPeer => StatusCode::FORBIDDEN,
            Self::PaymentFlow(e) => match e {
                PaymentFlowError::Validation(_) => StatusCode::BAD_REQUEST,
                PaymentFlowError::NotFound(_) => StatusCode::NOT_FOUND,
                PaymentFlowError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
                PaymentFlowError::Gateway(_) => StatusCode::BAD_GATEWAY,
                PaymentFlowError::SignatureVerification(_) => StatusCode::UNAUTHORIZED,
                PaymentFlowError::Conflict(_) => StatusCode::CONFLICT,
                PaymentFlowError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            // Storage details stay in the logs
            Self::PaymentFlow(PaymentFlowError::Database(_)) => {
                "An internal error occurred. Please try again later.".to_string()
            },
            e => e.to_string(),
        };
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": message }).to_string())
    }
}

impl From<GatewayApiError> for ServerError {
    fn from(e: GatewayApiError) -> Self {
        Self::InitializeError(format!("Could not create the payment gateway client. {e}"))
    }
}
