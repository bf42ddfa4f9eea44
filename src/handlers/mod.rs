pub mod public;
pub mod sandbox;
pub mod store;
pub mod webhooks;

use axum::Router;

use crate::db::AppState;

/// The full API. Payment routes (`/checkout`, `/webhook`) exist only when a
/// processor is configured; the `/checkout/sandbox` page only for the sandbox.
pub fn router(state: &AppState, checkout_rate_limit_rpm: u32) -> Router<AppState> {
    let mut app = Router::new()
        .merge(public::router())
        .merge(store::router());

    if state.payments.is_some() {
        app = app
            .merge(store::checkout_router(checkout_rate_limit_rpm))
            .merge(webhooks::router());
        if state.payments.as_ref().is_some_and(|p| p.is_sandbox()) {
            app = app.merge(sandbox::router());
        }
    } else {
        tracing::warn!("Payments not configured: /checkout and /webhook are disabled");
    }

    app
}
