use std::env;

use thiserror::Error;

use crate::models::{PlanTier, SubscriptionPlan};

/// Webhook signing secret used by the sandbox processor when none is configured.
pub const SANDBOX_WEBHOOK_SECRET: &str = "whsec_sandbox";

/// Stripe credentials for the platform account.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub publishable_key: Option<String>,
    pub webhook_secret: String,
}

/// Startup configuration that cannot be served safely.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SUPABASE_JWT_SECRET is required outside dev mode")]
    MissingJwtSecret,

    #[error("PAYMENT_SANDBOX is only allowed in dev mode (set VIBE_ENV=dev)")]
    SandboxOutsideDev,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub dev_mode: bool,
    /// Secret the auth provider signs access tokens with (HS256).
    pub jwt_secret: String,
    /// Present only when both the API key and webhook secret are set.
    pub stripe: Option<StripeConfig>,
    /// Local checkout simulation. Only honored in dev mode.
    pub payment_sandbox: bool,
    pub checkout_timeout_secs: u64,
    /// Requests per minute per IP on `/checkout` (0 = unlimited)
    pub rate_limit_checkout_rpm: u32,
    pub plans: Vec<SubscriptionPlan>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("VIBE_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        let jwt_secret = jwt_secret(non_empty_var("SUPABASE_JWT_SECRET"), dev_mode)?;

        let stripe = match (
            non_empty_var("STRIPE_SECRET_KEY"),
            non_empty_var("STRIPE_WEBHOOK_SECRET"),
        ) {
            (Some(secret_key), Some(webhook_secret)) => Some(StripeConfig {
                secret_key,
                publishable_key: non_empty_var("STRIPE_PUBLISHABLE_KEY"),
                webhook_secret,
            }),
            (Some(_), None) => {
                tracing::warn!("STRIPE_SECRET_KEY set without STRIPE_WEBHOOK_SECRET, payments disabled");
                None
            }
            _ => None,
        };

        let payment_sandbox = env::var("PAYMENT_SANDBOX")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if payment_sandbox && !dev_mode {
            return Err(ConfigError::SandboxOutsideDev);
        }

        Ok(Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "vibe_store.db".to_string()),
            base_url,
            dev_mode,
            jwt_secret,
            stripe,
            payment_sandbox,
            checkout_timeout_secs: parse_var("CHECKOUT_TIMEOUT_SECS", 15),
            rate_limit_checkout_rpm: parse_var("RATE_LIMIT_CHECKOUT_RPM", 10),
            plans: plans_from_env(),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn payments_enabled(&self) -> bool {
        self.stripe.is_some() || self.payment_sandbox
    }
}

/// Outside dev mode the token secret must be configured.
fn jwt_secret(configured: Option<String>, dev_mode: bool) -> Result<String, ConfigError> {
    match configured {
        Some(secret) => Ok(secret),
        None if dev_mode => {
            tracing::warn!("SUPABASE_JWT_SECRET not set, using insecure dev secret");
            Ok("vibe-store-dev-jwt-secret".to_string())
        }
        None => Err(ConfigError::MissingJwtSecret),
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Subscription plans are defined by `PLAN_<TIER>_PRICE_ID` / `PLAN_<TIER>_PRICE_CENTS`.
/// A tier without a price ID is not offered.
fn plans_from_env() -> Vec<SubscriptionPlan> {
    [(PlanTier::Pro, "PRO", 999), (PlanTier::Enterprise, "ENTERPRISE", 4999)]
        .into_iter()
        .filter_map(|(tier, key, default_cents)| {
            let price_id = non_empty_var(&format!("PLAN_{}_PRICE_ID", key))?;
            Some(SubscriptionPlan {
                tier,
                stripe_price_id: price_id,
                price_cents: parse_var(&format!("PLAN_{}_PRICE_CENTS", key), default_cents),
                currency: "usd".to_string(),
            })
        })
        .collect()
}
