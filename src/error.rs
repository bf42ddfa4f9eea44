use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Error messages shared between handlers, payment clients and tests.
pub mod msg {
    pub const UNKNOWN_PRICE_REF: &str = "Unknown price reference";
    pub const APP_NOT_FOUND: &str = "App not found";
    pub const PLAN_NOT_FOUND: &str = "Subscription plan not found";
    pub const FREE_PRODUCT: &str = "Free products do not require checkout";
    pub const MODE_MISMATCH: &str = "Checkout mode does not match the product's pricing";
    pub const NO_PROCESSOR_PRICE: &str = "Product has no processor price configured";
    pub const REDIRECT_NOT_ALLOWED: &str = "Redirect URL must be on the storefront origin";
    pub const PAYMENTS_DISABLED: &str = "Payments are not configured";
    pub const CHECKOUT_SESSION_NOT_FOUND: &str = "Checkout session not found";
    pub const PROCESSOR_UNAVAILABLE: &str = "Payment processor unavailable, retry later";
    pub const PROCESSOR_REJECTED: &str = "Payment processor rejected the checkout request";

    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in signature";
    pub const INVALID_WEBHOOK_SECRET: &str = "Invalid webhook secret";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    /// A dependency (payment processor) failed transiently; the caller may retry.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retriable: bool,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl AppError {
    /// Whether a client should retry the same request later.
    pub fn is_retriable(&self) -> bool {
        matches!(self, AppError::Unavailable(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retriable = self.is_retriable();
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Unavailable(reason) => {
                tracing::warn!("Service unavailable: {}", reason);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service unavailable",
                    Some(msg::PROCESSOR_UNAVAILABLE.to_string()),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            retriable,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Converts `Option<T>` lookups into `AppError::NotFound`.
pub trait OptionExt<T> {
    fn or_not_found(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, message: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(message.to_string()))
    }
}
