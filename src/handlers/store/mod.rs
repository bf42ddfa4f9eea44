//! Authenticated storefront API (bearer access token).

mod checkout;
mod entitlements;
mod transactions;

pub use checkout::*;
pub use entitlements::*;
pub use transactions::*;

use axum::{
    Router,
    routing::{get, post},
};

use crate::db::AppState;
use crate::rate_limit;

/// Read-only routes, always mounted.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/entitlements", get(get_entitlements))
        .route("/entitlements/{app_id}", get(get_app_ownership))
        .route("/transactions", get(list_transactions))
        .route("/notifications", get(list_notifications))
}

/// `POST /checkout`, mounted only when a payment processor is configured.
/// `rate_limit_rpm` of 0 disables the per-IP limiter.
pub fn checkout_router(rate_limit_rpm: u32) -> Router<AppState> {
    let router = Router::new().route("/checkout", post(create_checkout));
    if rate_limit_rpm > 0 {
        router.layer(rate_limit::checkout_layer(rate_limit_rpm))
    } else {
        router
    }
}
