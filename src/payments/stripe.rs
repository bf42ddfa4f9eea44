use std::collections::HashMap;
use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{CheckoutSession, CheckoutSessionParams};
use crate::config::StripeConfig;
use crate::error::{AppError, Result, msg};
use crate::models::CheckoutMode;

type HmacSha256 = Hmac<Sha256>;

const CHECKOUT_SESSIONS_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

/// Maximum age of a webhook timestamp before it's rejected (in seconds).
pub const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Allowed clock skew for webhook timestamps from the future (in seconds).
pub const WEBHOOK_FUTURE_SKEW_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    /// `timeout` bounds every API call; a timed-out checkout surfaces as retriable.
    pub fn new(config: &StripeConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }

    /// Create a hosted checkout session for a pre-configured Stripe price.
    pub async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams<'_>,
    ) -> Result<CheckoutSession> {
        let form = checkout_form(params);

        let response = self
            .client
            .post(CHECKOUT_SESSIONS_URL)
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Unavailable(format!("Stripe API timed out: {}", e))
                } else {
                    AppError::Unavailable(format!("Stripe API unreachable: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(AppError::Unavailable(format!(
                    "Stripe API error ({}): {}",
                    status, error_text
                )));
            }
            return Err(AppError::Internal(format!(
                "{} ({}): {}",
                msg::PROCESSOR_REJECTED,
                status,
                error_text
            )));
        }

        let session: CreateCheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse Stripe response: {}", e)))?;

        let url = session
            .url
            .ok_or_else(|| AppError::Internal("Stripe session has no redirect URL".into()))?;

        Ok(CheckoutSession {
            id: session.id,
            url,
        })
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

/// Form body for `POST /v1/checkout/sessions`.
///
/// In subscription mode the metadata is also copied to the subscription so
/// later `customer.subscription.*` events can be attributed.
fn checkout_form(params: &CheckoutSessionParams<'_>) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), params.mode.as_ref().to_string()),
        ("success_url".to_string(), params.success_url.to_string()),
        ("cancel_url".to_string(), params.cancel_url.to_string()),
        ("line_items[0][price]".to_string(), params.price_id.to_string()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("client_reference_id".to_string(), params.user_id.to_string()),
    ];

    if let Some(email) = params.customer_email {
        form.push(("customer_email".to_string(), email.to_string()));
    }

    for (key, value) in params.metadata {
        form.push((format!("metadata[{}]", key), value.to_string()));
        if params.mode == CheckoutMode::Subscription {
            form.push((format!("subscription_data[metadata][{}]", key), value.to_string()));
        }
    }

    form
}

/// Build a `stripe-signature` header (`t=…,v1=…`) for `payload`.
pub fn sign_stripe_payload(secret: &str, payload: &[u8], timestamp: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Verify a `stripe-signature` header (`t=timestamp,v1=signature[,v1=...]`).
///
/// Returns `Ok(false)` for a well-formed header that does not match or is
/// outside the timestamp tolerance, and `Err(BadRequest)` for a malformed one.
pub fn verify_stripe_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
) -> Result<bool> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            candidates.push(s);
        }
    }

    let timestamp_str =
        timestamp.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;
    if candidates.is_empty() {
        return Err(AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()));
    }

    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| AppError::BadRequest(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()))?;

    let Some(age) = now.checked_sub(timestamp) else {
        tracing::warn!("Stripe webhook rejected: timestamp {} out of range", timestamp);
        return Ok(false);
    };
    if age > WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
        tracing::warn!(
            "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
            age,
            WEBHOOK_TIMESTAMP_TOLERANCE_SECS
        );
        return Ok(false);
    }
    if age < -WEBHOOK_FUTURE_SKEW_SECS {
        tracing::warn!("Stripe webhook rejected: timestamp in the future (age={}s)", age);
        return Ok(false);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
    mac.update(timestamp_str.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    let expected_bytes = expected.as_bytes();

    // Signature length is not secret (always 64 hex chars), only the content is.
    Ok(candidates.iter().any(|candidate| {
        let provided = candidate.as_bytes();
        provided.len() == expected_bytes.len() && bool::from(expected_bytes.ct_eq(provided))
    }))
}

/// Generic Stripe webhook event; `data.object` is parsed per event type.
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    /// Event ID (`evt_…`), used for replay prevention.
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// Metadata we attach at checkout creation.
#[derive(Debug, Default, Deserialize)]
pub struct StripeMetadata {
    pub user_id: Option<String>,
    pub app_id: Option<String>,
    pub plan: Option<String>,
    pub transaction_id: Option<String>,
}

/// Stripe sends `metadata: {}` or omits it; tolerate `null` too.
fn metadata_or_default<'de, D>(deserializer: D) -> std::result::Result<StripeMetadata, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<HashMap<String, String>> = Option::deserialize(deserializer)?;
    let mut raw = raw.unwrap_or_default();
    Ok(StripeMetadata {
        user_id: raw.remove("user_id"),
        app_id: raw.remove("app_id"),
        plan: raw.remove("plan"),
        transaction_id: raw.remove("transaction_id"),
    })
}

// ============ checkout.session.* ============

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub mode: Option<String>,
    /// "paid", "unpaid" or "no_payment_required"
    pub payment_status: Option<String>,
    pub customer: Option<String>,
    pub customer_email: Option<String>,
    pub customer_details: Option<StripeCustomerDetails>,
    pub subscription: Option<String>,
    pub client_reference_id: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "metadata_or_default")]
    pub metadata: StripeMetadata,
}

impl StripeCheckoutSession {
    pub fn email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
            .or(self.customer_email.as_deref())
    }

    /// Our user ID from metadata, falling back to `client_reference_id`.
    pub fn user_id(&self) -> Option<&str> {
        self.metadata
            .user_id
            .as_deref()
            .or(self.client_reference_id.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
}

// ============ invoice.paid ============

#[derive(Debug, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    /// "subscription_create", "subscription_cycle", etc.
    pub billing_reason: Option<String>,
    pub status: Option<String>,
    pub amount_paid: Option<i64>,
    pub currency: Option<String>,
    pub lines: Option<StripeList<StripeInvoiceLine>>,
}

impl StripeInvoice {
    /// End of the billed period: the latest line item period end.
    pub fn period_end(&self) -> Option<i64> {
        self.lines
            .as_ref()?
            .data
            .iter()
            .filter_map(|line| line.period.as_ref().map(|p| p.end))
            .max()
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeInvoiceLine {
    pub period: Option<StripePeriod>,
}

#[derive(Debug, Deserialize)]
pub struct StripePeriod {
    pub start: i64,
    pub end: i64,
}

// ============ customer.subscription.* ============

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: Option<String>,
    /// "active", "trialing", "past_due", "canceled", "unpaid", ...
    pub status: String,
    pub current_period_end: Option<i64>,
    pub items: Option<StripeList<StripeSubscriptionItem>>,
    #[serde(default, deserialize_with = "metadata_or_default")]
    pub metadata: StripeMetadata,
}

impl StripeSubscription {
    /// Newer API versions moved the period end onto subscription items.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .as_ref()?
                .data
                .iter()
                .filter_map(|item| item.current_period_end)
                .max()
        })
    }

    /// Statuses that no longer grant the paid tier.
    pub fn is_lapsed(&self) -> bool {
        matches!(
            self.status.as_str(),
            "canceled" | "unpaid" | "incomplete_expired"
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItem {
    pub current_period_end: Option<i64>,
}
