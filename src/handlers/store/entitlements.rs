use axum::extract::State;
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{AuthUser, Json, Path};
use crate::id::is_valid_prefixed_id;
use crate::models::SubscriptionTier;

/// Durable entitlements of the caller: the single read behind a client cache load.
#[derive(Debug, Serialize)]
pub struct EntitlementsResponse {
    pub user_id: String,
    /// IDs of apps the user has been granted.
    pub product_ids: Vec<String>,
    pub subscription_tier: SubscriptionTier,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OwnershipResponse {
    pub app_id: String,
    pub owned: bool,
}

pub async fn get_entitlements(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<EntitlementsResponse>> {
    let conn = state.db.get()?;

    let product_ids = queries::list_app_purchases(&conn, &user.user_id)?
        .into_iter()
        .map(|p| p.app_id)
        .collect();
    let profile = queries::get_profile(&conn, &user.user_id)?;

    Ok(Json(EntitlementsResponse {
        user_id: user.user_id,
        product_ids,
        subscription_tier: profile
            .as_ref()
            .map(|p| p.subscription_tier)
            .unwrap_or_default(),
        current_period_end: profile.and_then(|p| p.current_period_end),
    }))
}

/// Precise ownership check for one app, straight from the durable store.
pub async fn get_app_ownership(
    State(state): State<AppState>,
    user: AuthUser,
    Path(app_id): Path<String>,
) -> Result<Json<OwnershipResponse>> {
    if !is_valid_prefixed_id(&app_id) || !app_id.starts_with("vs_app_") {
        return Err(AppError::BadRequest("Invalid app id".into()));
    }

    let conn = state.db.get()?;
    queries::get_app_by_id(&conn, &app_id)?.or_not_found(msg::APP_NOT_FOUND)?;
    let owned = queries::user_owns_app(&conn, &user.user_id, &app_id)?;

    Ok(Json(OwnershipResponse { app_id, owned }))
}
