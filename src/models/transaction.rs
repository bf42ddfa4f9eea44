use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::PlanTier;

/// Processor checkout mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

/// Ledger status.
///
/// Transitions: `pending -> completed`, `pending -> failed`,
/// `failed -> completed` (late async success). `completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// Append-only record of a purchase attempt. Never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub app_id: Option<String>,
    pub plan_tier: Option<PlanTier>,
    pub mode: CheckoutMode,
    pub amount_cents: i64,
    pub currency: String,
    /// Processor checkout session ID (`cs_…`) or invoice ID for renewals.
    pub processor_reference: String,
    pub status: TransactionStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct CreateTransaction {
    pub user_id: String,
    pub app_id: Option<String>,
    pub plan_tier: Option<PlanTier>,
    pub mode: CheckoutMode,
    pub amount_cents: i64,
    pub currency: String,
    pub processor_reference: String,
    pub status: TransactionStatus,
}
