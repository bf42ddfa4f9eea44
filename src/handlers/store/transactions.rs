use axum::extract::State;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{AuthUser, Json, Query};
use crate::models::{Notification, Transaction};
use crate::pagination::{Paginated, PaginationQuery};

/// The caller's own purchase ledger, newest first.
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Paginated<Transaction>>> {
    let conn = state.db.get()?;
    let limit = pagination.limit();
    let offset = pagination.offset();

    let items = queries::list_transactions_for_user(&conn, &user.user_id, limit, offset)?;
    let total = queries::count_transactions_for_user(&conn, &user.user_id)?;

    Ok(Json(Paginated::new(items, total, limit, offset)))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Notification>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_notifications(&conn, &user.user_id)?))
}
