use uuid::Uuid;

use super::{CheckoutSession, CheckoutSessionParams, sign_stripe_payload, verify_stripe_signature};
use crate::error::Result;

/// Offline stand-in for Stripe, only constructed in dev mode.
///
/// Sessions point at the local `/checkout/sandbox` page, which signs a
/// Stripe-shaped event with this processor's secret and hands it to the
/// webhook ingestor.
#[derive(Debug, Clone)]
pub struct SandboxProcessor {
    base_url: String,
    webhook_secret: String,
}

impl SandboxProcessor {
    pub fn new(base_url: &str, webhook_secret: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    pub fn create_checkout_session(&self, params: &CheckoutSessionParams<'_>) -> CheckoutSession {
        let id = format!("cs_sandbox_{}", Uuid::new_v4().as_simple());
        tracing::info!(
            "Sandbox checkout session {} ({} mode, price {}) for user {}",
            id,
            params.mode.as_ref(),
            params.price_id,
            params.user_id
        );
        CheckoutSession {
            url: format!(
                "{}/checkout/sandbox?session_id={}",
                self.base_url,
                urlencoding::encode(&id)
            ),
            id,
        }
    }

    /// `stripe-signature` header for a simulated event, signed now.
    pub fn sign_event(&self, payload: &[u8]) -> Result<String> {
        sign_stripe_payload(&self.webhook_secret, payload, chrono::Utc::now().timestamp())
    }

    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        verify_stripe_signature(
            &self.webhook_secret,
            payload,
            signature,
            chrono::Utc::now().timestamp(),
        )
    }
}
