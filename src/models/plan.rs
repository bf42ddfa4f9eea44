use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Prefix for subscription plans in product keys (`plan:pro`).
pub const PLAN_KEY_PREFIX: &str = "plan:";

/// Tier recorded on a profile. Overwritten on every subscription event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl SubscriptionTier {
    pub fn plan(&self) -> Option<PlanTier> {
        match self {
            SubscriptionTier::Free => None,
            SubscriptionTier::Pro => Some(PlanTier::Pro),
            SubscriptionTier::Enterprise => Some(PlanTier::Enterprise),
        }
    }
}

/// A purchasable subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlanTier {
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn product_key(&self) -> String {
        format!("{}{}", PLAN_KEY_PREFIX, self.as_ref())
    }
}

impl From<PlanTier> for SubscriptionTier {
    fn from(tier: PlanTier) -> Self {
        match tier {
            PlanTier::Pro => SubscriptionTier::Pro,
            PlanTier::Enterprise => SubscriptionTier::Enterprise,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub tier: PlanTier,
    pub stripe_price_id: String,
    pub price_cents: i64,
    pub currency: String,
}
