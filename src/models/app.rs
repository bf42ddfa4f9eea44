use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::CheckoutMode;

/// How an app is monetized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PricingType {
    Free,
    OneTime,
    Subscription,
    /// Free to open, premium content requires a one-time purchase.
    Freemium,
}

impl PricingType {
    /// Checkout mode required to buy this app, or `None` if it is free.
    pub fn checkout_mode(&self) -> Option<CheckoutMode> {
        match self {
            PricingType::Free => None,
            PricingType::Subscription => Some(CheckoutMode::Subscription),
            PricingType::OneTime | PricingType::Freemium => Some(CheckoutMode::Payment),
        }
    }
}

/// A marketplace app listing (the purchasable part of it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub developer_id: String,
    pub name: String,
    pub pricing_type: PricingType,
    pub price_cents: i64,
    pub currency: String,
    /// Processor price reference (`price_…`), absent for free apps.
    pub stripe_price_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl App {
    pub fn is_free(&self) -> bool {
        self.pricing_type == PricingType::Free || self.price_cents == 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApp {
    pub name: String,
    pub pricing_type: PricingType,
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub stripe_price_id: Option<String>,
}

fn default_currency() -> String {
    "usd".to_string()
}

impl CreateApp {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name cannot be empty".into());
        }
        if self.price_cents < 0 {
            return Err("price_cents cannot be negative".into());
        }
        if self.pricing_type == PricingType::Free && self.price_cents != 0 {
            return Err("free apps must have price_cents = 0".into());
        }
        if self.pricing_type != PricingType::Free && self.stripe_price_id.is_none() {
            return Err("paid apps need a stripe_price_id".into());
        }
        Ok(())
    }
}
