use super::{App, CheckoutMode, SubscriptionPlan};

/// Anything a user can buy: an app or a subscription plan.
#[derive(Debug, Clone)]
pub enum Product {
    App(App),
    Plan(SubscriptionPlan),
}

impl Product {
    /// Identifier used by entitlement caches: the app ID or `plan:<tier>`.
    pub fn key(&self) -> String {
        match self {
            Product::App(app) => app.id.clone(),
            Product::Plan(plan) => plan.tier.product_key(),
        }
    }

    pub fn checkout_mode(&self) -> Option<CheckoutMode> {
        match self {
            Product::App(app) if app.is_free() => None,
            Product::App(app) => app.pricing_type.checkout_mode(),
            Product::Plan(_) => Some(CheckoutMode::Subscription),
        }
    }

    pub fn price_cents(&self) -> i64 {
        match self {
            Product::App(app) => app.price_cents,
            Product::Plan(plan) => plan.price_cents,
        }
    }

    pub fn currency(&self) -> &str {
        match self {
            Product::App(app) => &app.currency,
            Product::Plan(plan) => &plan.currency,
        }
    }

    pub fn stripe_price_id(&self) -> Option<&str> {
        match self {
            Product::App(app) => app.stripe_price_id.as_deref(),
            Product::Plan(plan) => Some(&plan.stripe_price_id),
        }
    }
}
