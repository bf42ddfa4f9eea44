use serde::Serialize;

/// Durable grant of an app to a user. At most one per (user, app).
#[derive(Debug, Clone, Serialize)]
pub struct AppPurchase {
    pub id: String,
    pub user_id: String,
    pub app_id: String,
    pub transaction_id: String,
    pub processor_reference: String,
    pub granted_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreateAppPurchase {
    pub user_id: String,
    pub app_id: String,
    pub transaction_id: String,
    pub processor_reference: String,
}
