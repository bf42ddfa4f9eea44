//! Type definitions for the Vibe Store SDK

use serde::{Deserialize, Serialize};

/// Prefix for subscription plans in product keys (`plan:pro`).
pub const PLAN_KEY_PREFIX: &str = "plan:";

/// How an app is monetized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingType {
    Free,
    OneTime,
    Subscription,
    /// Free to open, premium content needs a one-time purchase
    Freemium,
}

/// Processor checkout mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

/// Tier recorded on the user's profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

/// A purchasable subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    /// Cache/gate key of this plan.
    pub fn product_key(&self) -> String {
        format!("{}{}", PLAN_KEY_PREFIX, self.as_str())
    }
}

impl SubscriptionTier {
    pub fn plan(&self) -> Option<PlanTier> {
        match self {
            Self::Free => None,
            Self::Pro => Some(PlanTier::Pro),
            Self::Enterprise => Some(PlanTier::Enterprise),
        }
    }
}

/// Purchase-relevant view of an app (`GET /apps/{id}`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppProduct {
    pub id: String,
    pub pricing_type: PricingType,
    #[serde(default)]
    pub price_cents: i64,
    /// Processor price reference, absent for free apps
    #[serde(rename = "stripe_price_id", default)]
    pub price_ref: Option<String>,
}

/// A subscription plan (`GET /plans`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlanProduct {
    pub tier: PlanTier,
    pub price_cents: i64,
    #[serde(rename = "stripe_price_id")]
    pub price_ref: String,
}

/// Anything the Gate can be asked about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Product {
    App(AppProduct),
    Plan(PlanProduct),
}

impl Product {
    /// The app ID, or `plan:<tier>`.
    pub fn key(&self) -> String {
        match self {
            Product::App(app) => app.id.clone(),
            Product::Plan(plan) => plan.tier.product_key(),
        }
    }

    /// Free products never need a checkout.
    pub fn is_free(&self) -> bool {
        match self {
            Product::App(app) => app.pricing_type == PricingType::Free || app.price_cents == 0,
            Product::Plan(plan) => plan.price_cents == 0,
        }
    }

    pub fn price_ref(&self) -> Option<&str> {
        match self {
            Product::App(app) => app.price_ref.as_deref(),
            Product::Plan(plan) => Some(&plan.price_ref),
        }
    }

    pub fn checkout_mode(&self) -> CheckoutMode {
        match self {
            Product::App(app) if app.pricing_type == PricingType::Subscription => {
                CheckoutMode::Subscription
            }
            Product::App(_) => CheckoutMode::Payment,
            Product::Plan(_) => CheckoutMode::Subscription,
        }
    }
}

/// Durable entitlements of the signed-in user (`GET /entitlements`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntitlementSnapshot {
    pub user_id: String,
    /// IDs of owned apps
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub subscription_tier: SubscriptionTier,
    /// Paid-through watermark (Unix seconds)
    pub current_period_end: Option<i64>,
}

impl EntitlementSnapshot {
    /// The plan that currently grants access, if any.
    ///
    /// A watermark at or before `now` means the period has run out. A paid
    /// tier without a watermark is trusted as active.
    pub fn active_plan(&self, now: i64) -> Option<PlanTier> {
        let plan = self.subscription_tier.plan()?;
        match self.current_period_end {
            Some(end) if end <= now => None,
            _ => Some(plan),
        }
    }

    /// Every product key this snapshot entitles, apps first.
    pub fn product_keys(&self, now: i64) -> Vec<String> {
        let mut keys = self.product_ids.clone();
        if let Some(plan) = self.active_plan(now) {
            keys.push(plan.product_key());
        }
        keys
    }
}

/// Body of `POST /checkout`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub price_ref: String,
    pub mode: CheckoutMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
}

/// Result from starting a checkout session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResult {
    /// Processor session ID
    pub session_id: String,
    /// URL to redirect the user to
    pub url: String,
}

/// Durable ownership check (`GET /entitlements/{app_id}`)
#[derive(Debug, Clone, Deserialize)]
pub struct Ownership {
    pub app_id: String,
    pub owned: bool,
}
