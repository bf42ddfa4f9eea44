//! Payment processor integration.
//!
//! `PaymentProcessor` is the seam the checkout initiator and webhook ingestor
//! talk to. Production uses Stripe; dev mode can opt into a local sandbox that
//! hands out `cs_sandbox_…` sessions and verifies Stripe-shaped webhooks.

mod sandbox;
mod stripe;

pub use sandbox::*;
pub use stripe::*;

use std::time::Duration;

use crate::config::{Config, SANDBOX_WEBHOOK_SECRET};
use crate::error::Result;
use crate::models::CheckoutMode;

/// Everything the processor needs to open a hosted checkout page.
#[derive(Debug, Clone)]
pub struct CheckoutSessionParams<'a> {
    pub mode: CheckoutMode,
    pub price_id: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
    /// Our user ID, echoed back as `client_reference_id`.
    pub user_id: &'a str,
    pub customer_email: Option<&'a str>,
    /// Copied onto the session (and the subscription, in subscription mode).
    pub metadata: &'a [(&'a str, &'a str)],
}

/// A processor-hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub enum PaymentProcessor {
    Stripe(StripeClient),
    Sandbox(SandboxProcessor),
}

impl PaymentProcessor {
    /// Build the processor the configuration asks for, or `None` if payments are disabled.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        if config.payment_sandbox {
            let secret = config
                .stripe
                .as_ref()
                .map(|s| s.webhook_secret.clone())
                .unwrap_or_else(|| SANDBOX_WEBHOOK_SECRET.to_string());
            return Ok(Some(PaymentProcessor::Sandbox(SandboxProcessor::new(
                &config.base_url,
                &secret,
            ))));
        }

        match &config.stripe {
            Some(stripe) => Ok(Some(PaymentProcessor::Stripe(StripeClient::new(
                stripe,
                Duration::from_secs(config.checkout_timeout_secs),
            )?))),
            None => Ok(None),
        }
    }

    pub fn is_sandbox(&self) -> bool {
        matches!(self, PaymentProcessor::Sandbox(_))
    }

    pub async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams<'_>,
    ) -> Result<CheckoutSession> {
        match self {
            PaymentProcessor::Stripe(client) => client.create_checkout_session(params).await,
            PaymentProcessor::Sandbox(sandbox) => Ok(sandbox.create_checkout_session(params)),
        }
    }

    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        match self {
            PaymentProcessor::Stripe(client) => client.verify_webhook_signature(payload, signature),
            PaymentProcessor::Sandbox(sandbox) => {
                sandbox.verify_webhook_signature(payload, signature)
            }
        }
    }
}
