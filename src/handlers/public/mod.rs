//! Unauthenticated endpoints: health and the purchasable catalog.

use axum::{Router, extract::State, routing::get};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::models::{App, SubscriptionPlan};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    payments_enabled: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        payments_enabled: state.payments.is_some(),
    })
}

/// Purchase-relevant view of an app (pricing and price reference).
async fn get_app(State(state): State<AppState>, Path(app_id): Path<String>) -> Result<Json<App>> {
    let conn = state.db.get()?;
    let app = queries::get_app_by_id(&conn, &app_id)?.or_not_found(msg::APP_NOT_FOUND)?;
    Ok(Json(app))
}

async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<SubscriptionPlan>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_plans(&conn)?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/apps/{app_id}", get(get_app))
        .route("/plans", get(list_plans))
}
