use serde::Serialize;

use super::{PlanTier, SubscriptionTier};

/// Storefront user, keyed by the auth provider's user ID.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: String,
    pub email: Option<String>,
    pub subscription_tier: SubscriptionTier,
    /// Watermark: the paid period runs until this Unix timestamp.
    pub current_period_end: Option<i64>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Profile {
    /// The plan the user is currently entitled to, if any.
    ///
    /// A missing watermark on a paid tier counts as active.
    pub fn active_plan(&self, now: i64) -> Option<PlanTier> {
        let plan = self.subscription_tier.plan()?;
        match self.current_period_end {
            Some(end) if end <= now => None,
            _ => Some(plan),
        }
    }
}

/// Overwrites the subscription fields of a profile.
#[derive(Debug, Clone)]
pub struct SubscriptionUpdate {
    pub user_id: String,
    pub tier: SubscriptionTier,
    pub current_period_end: Option<i64>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
}
