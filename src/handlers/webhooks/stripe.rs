use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::db::AppState;
use crate::models::{CheckoutMode, PlanTier};
use crate::payments::{
    StripeCheckoutSession, StripeInvoice, StripeSubscription, StripeWebhookEvent,
};

use super::common::{
    CheckoutData, GrantTarget, PaymentFailureData, RenewalData, SubscriptionData, WebhookEvent,
    WebhookProvider, WebhookResult, handle_webhook,
};

/// Stripe webhook provider implementation.
pub struct StripeWebhookProvider;

impl WebhookProvider for StripeWebhookProvider {
    fn provider_name(&self) -> &'static str {
        "stripe"
    }

    fn extract_signature(&self, headers: &HeaderMap) -> Result<String, WebhookResult> {
        headers
            .get("stripe-signature")
            .ok_or((StatusCode::BAD_REQUEST, "Missing stripe-signature header"))?
            .to_str()
            .map(|s| s.to_string())
            .map_err(|e| {
                tracing::debug!("Invalid UTF-8 in Stripe signature header: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid signature header")
            })
    }

    fn verify_signature(
        &self,
        state: &AppState,
        body: &Bytes,
        signature: &str,
    ) -> Result<bool, WebhookResult> {
        let processor = state
            .payments
            .as_ref()
            .ok_or((StatusCode::NOT_FOUND, "Payments not configured"))?;

        processor
            .verify_webhook_signature(body, signature)
            .map_err(|e| {
                tracing::debug!("Stripe signature rejected: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid signature")
            })
    }

    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult> {
        let event: StripeWebhookEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::warn!("Invalid Stripe webhook JSON: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid JSON")
        })?;

        match event.event_type.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                parse_checkout_completed(&event)
            }
            "checkout.session.async_payment_failed" => {
                parse_checkout_failed(&event, "async payment failed")
            }
            "checkout.session.expired" => parse_checkout_failed(&event, "session expired"),
            "invoice.paid" => parse_invoice_paid(&event),
            "customer.subscription.updated" => parse_subscription(&event, false),
            "customer.subscription.deleted" => parse_subscription(&event, true),
            other => {
                tracing::debug!("Ignoring Stripe event type {}", other);
                Ok(WebhookEvent::Ignored)
            }
        }
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(
    event: &StripeWebhookEvent,
    what: &'static str,
) -> Result<T, WebhookResult> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        tracing::warn!("Failed to parse Stripe {} ({}): {}", what, event.event_type, e);
        (StatusCode::BAD_REQUEST, "Invalid event object")
    })
}

fn parse_plan(raw: Option<&str>, object_id: &str) -> Option<PlanTier> {
    let raw = raw?;
    match raw.parse() {
        Ok(tier) => Some(tier),
        Err(_) => {
            tracing::warn!("Unknown plan {:?} in metadata of {}", raw, object_id);
            None
        }
    }
}

fn parse_checkout_completed(event: &StripeWebhookEvent) -> Result<WebhookEvent, WebhookResult> {
    let session: StripeCheckoutSession = parse_object(event, "checkout session")?;

    match session.payment_status.as_deref() {
        Some("paid") | Some("no_payment_required") => {}
        _ => {
            return Ok(WebhookEvent::CheckoutAwaitingPayment {
                session_id: session.id,
            });
        }
    }

    let target = match (&session.metadata.app_id, &session.metadata.plan) {
        (Some(app_id), _) if !app_id.is_empty() => Some(GrantTarget::App {
            app_id: app_id.clone(),
        }),
        (_, plan) => parse_plan(plan.as_deref(), &session.id).map(|tier| GrantTarget::Plan { tier }),
    };

    Ok(WebhookEvent::CheckoutCompleted(CheckoutData {
        event_id: event.id.clone(),
        user_id: session.user_id().map(str::to_string),
        target,
        transaction_id: session.metadata.transaction_id.clone(),
        mode: session.mode.as_deref().and_then(|m| m.parse::<CheckoutMode>().ok()),
        customer_id: session.customer.clone(),
        customer_email: session.email().map(str::to_string),
        subscription_id: session.subscription.clone(),
        amount_cents: session.amount_total,
        currency: session.currency.as_ref().map(|c| c.to_lowercase()),
        period_end: None,
        session_id: session.id,
    }))
}

fn parse_checkout_failed(
    event: &StripeWebhookEvent,
    reason: &'static str,
) -> Result<WebhookEvent, WebhookResult> {
    let session: StripeCheckoutSession = parse_object(event, "checkout session")?;
    Ok(WebhookEvent::PaymentFailed(PaymentFailureData {
        event_id: event.id.clone(),
        session_id: session.id,
        reason,
    }))
}

fn parse_invoice_paid(event: &StripeWebhookEvent) -> Result<WebhookEvent, WebhookResult> {
    let invoice: StripeInvoice = parse_object(event, "invoice")?;

    if invoice.status.as_deref().is_some_and(|s| s != "paid") {
        return Ok(WebhookEvent::Ignored);
    }

    Ok(WebhookEvent::InvoicePaid(RenewalData {
        event_id: event.id.clone(),
        subscription_id: invoice.subscription.clone(),
        is_renewal: invoice.billing_reason.as_deref() == Some("subscription_cycle"),
        period_end: invoice.period_end(),
        amount_cents: invoice.amount_paid.unwrap_or(0),
        currency: invoice
            .currency
            .as_ref()
            .map(|c| c.to_lowercase())
            .unwrap_or_else(|| "usd".to_string()),
        invoice_id: invoice.id,
    }))
}

fn parse_subscription(
    event: &StripeWebhookEvent,
    deleted: bool,
) -> Result<WebhookEvent, WebhookResult> {
    let subscription: StripeSubscription = parse_object(event, "subscription")?;

    Ok(WebhookEvent::SubscriptionChanged(SubscriptionData {
        event_id: event.id.clone(),
        user_id: subscription.metadata.user_id.clone(),
        tier: parse_plan(subscription.metadata.plan.as_deref(), &subscription.id),
        customer_id: subscription.customer.clone(),
        period_end: subscription.period_end(),
        ended: deleted || subscription.is_lapsed(),
        subscription_id: subscription.id,
    }))
}

/// Axum handler for Stripe webhooks.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (status, message) = handle_webhook(&StripeWebhookProvider, &state, headers, body).await;
    if status.is_success() {
        (status, Json(json!({ "received": true }))).into_response()
    } else {
        (status, Json(json!({ "error": message }))).into_response()
    }
}
