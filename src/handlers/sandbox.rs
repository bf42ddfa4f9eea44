//! Local checkout page for the sandbox processor (dev mode only).
//!
//! Completing or cancelling signs a Stripe-shaped event with the sandbox
//! webhook secret and feeds it through the same ingestor as `/webhook`.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::{Html, Redirect},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Query;
use crate::models::{CheckoutMode, Transaction, TransactionStatus};
use crate::payments::{PaymentProcessor, SandboxProcessor};

use super::webhooks::common::handle_webhook;
use super::webhooks::stripe::StripeWebhookProvider;

#[derive(Debug, Deserialize)]
pub struct SandboxSessionQuery {
    pub session_id: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout/sandbox", get(checkout_page))
        .route("/checkout/sandbox/complete", post(complete_checkout))
        .route("/checkout/sandbox/cancel", post(cancel_checkout))
}

fn sandbox(state: &AppState) -> Result<&SandboxProcessor> {
    match &state.payments {
        Some(PaymentProcessor::Sandbox(sandbox)) => Ok(sandbox),
        _ => Err(AppError::NotFound(msg::PAYMENTS_DISABLED.into())),
    }
}

fn find_session(state: &AppState, session_id: &str) -> Result<Transaction> {
    let conn = state.db.get()?;
    queries::get_transaction_by_reference(&conn, session_id)?
        .or_not_found(msg::CHECKOUT_SESSION_NOT_FOUND)
}

async fn checkout_page(
    State(state): State<AppState>,
    Query(query): Query<SandboxSessionQuery>,
) -> Result<Html<String>> {
    sandbox(&state)?;
    let txn = find_session(&state, &query.session_id)?;
    let product = match (&txn.app_id, &txn.plan_tier) {
        (Some(app_id), _) => format!("app {}", app_id),
        (None, Some(tier)) => format!("{} plan", tier.as_ref()),
        (None, None) => "unknown product".to_string(),
    };
    let session = urlencoding::encode(&txn.processor_reference);

    Ok(Html(format!(
        r#"<!doctype html>
<html>
<head><title>Sandbox checkout</title></head>
<body>
<h1>Sandbox checkout</h1>
<p>{product}: {amount} {currency} ({mode}), status {status}</p>
<form method="post" action="/checkout/sandbox/complete?session_id={session}">
<button type="submit">Pay</button>
</form>
<form method="post" action="/checkout/sandbox/cancel?session_id={session}">
<button type="submit">Cancel</button>
</form>
</body>
</html>
"#,
        amount = format_amount(txn.amount_cents),
        currency = txn.currency.to_uppercase(),
        mode = txn.mode.as_ref(),
        status = txn.status.as_ref(),
    )))
}

fn format_amount(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// Pay: deliver `checkout.session.completed`, then land on the success page.
async fn complete_checkout(
    State(state): State<AppState>,
    Query(query): Query<SandboxSessionQuery>,
) -> Result<Redirect> {
    let txn = find_session(&state, &query.session_id)?;
    deliver(&state, "checkout.session.completed", completed_session(&txn)).await?;
    Ok(Redirect::to(&format!(
        "{}/checkout/success?session_id={}",
        state.base_url,
        urlencoding::encode(&txn.processor_reference)
    )))
}

/// Cancel: deliver `checkout.session.expired`, then land on the cancel page.
async fn cancel_checkout(
    State(state): State<AppState>,
    Query(query): Query<SandboxSessionQuery>,
) -> Result<Redirect> {
    let txn = find_session(&state, &query.session_id)?;
    if txn.status == TransactionStatus::Pending {
        let session = json!({
            "id": txn.processor_reference,
            "object": "checkout.session",
            "mode": txn.mode.as_ref(),
            "payment_status": "unpaid",
            "client_reference_id": txn.user_id,
        });
        deliver(&state, "checkout.session.expired", session).await?;
    }
    Ok(Redirect::to(&format!("{}/checkout/cancel", state.base_url)))
}

fn completed_session(txn: &Transaction) -> Value {
    let mut metadata = json!({
        "user_id": txn.user_id,
        "transaction_id": txn.id,
    });
    if let Some(app_id) = &txn.app_id {
        metadata["app_id"] = json!(app_id);
    }
    if let Some(tier) = &txn.plan_tier {
        metadata["plan"] = json!(tier.as_ref());
    }
    let subscription = (txn.mode == CheckoutMode::Subscription)
        .then(|| format!("sub_sandbox_{}", Uuid::new_v4().as_simple()));

    json!({
        "id": txn.processor_reference,
        "object": "checkout.session",
        "mode": txn.mode.as_ref(),
        "payment_status": "paid",
        "client_reference_id": txn.user_id,
        "customer": format!("cus_sandbox_{}", txn.user_id),
        "subscription": subscription,
        "amount_total": txn.amount_cents,
        "currency": txn.currency,
        "metadata": metadata,
    })
}

async fn deliver(state: &AppState, event_type: &str, object: Value) -> Result<()> {
    let sandbox = sandbox(state)?;
    let event = json!({
        "id": format!("evt_sandbox_{}", Uuid::new_v4().as_simple()),
        "object": "event",
        "type": event_type,
        "data": { "object": object },
    });
    let body = serde_json::to_vec(&event)
        .map_err(|e| AppError::Internal(format!("Failed to encode sandbox event: {}", e)))?;

    let signature = sandbox.sign_event(&body)?;
    let mut headers = HeaderMap::new();
    headers.insert(
        "stripe-signature",
        HeaderValue::from_str(&signature)
            .map_err(|e| AppError::Internal(format!("Invalid sandbox signature header: {}", e)))?,
    );

    let (status, message) =
        handle_webhook(&StripeWebhookProvider, state, headers, Bytes::from(body)).await;
    if !status.is_success() {
        tracing::warn!("Sandbox {} rejected: {} {}", event_type, status, message);
        return Err(AppError::Internal(format!("Sandbox event rejected: {}", message)));
    }
    tracing::info!("Sandbox delivered {} ({})", event_type, message);
    Ok(())
}
