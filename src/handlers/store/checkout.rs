use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{AuthUser, Json};
use crate::id::EntityType;
use crate::models::{CheckoutMode, CreateTransaction, Product, TransactionStatus};
use crate::payments::CheckoutSessionParams;

/// Stripe substitutes the session ID into this placeholder on redirect.
const DEFAULT_SUCCESS_PATH: &str = "/checkout/success?session_id={CHECKOUT_SESSION_ID}";
const DEFAULT_CANCEL_PATH: &str = "/checkout/cancel";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Processor price reference of the app or plan being bought.
    pub price_ref: String,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
    pub mode: CheckoutMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

/// Redirects must stay on the storefront origin.
fn resolve_redirect(base_url: &str, requested: Option<String>, default_path: &str) -> Result<String> {
    match requested {
        None => Ok(format!("{}{}", base_url, default_path)),
        Some(url) => {
            let on_origin = url == base_url
                || url
                    .strip_prefix(base_url)
                    .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('?'));
            if on_origin {
                Ok(url)
            } else {
                Err(AppError::BadRequest(msg::REDIRECT_NOT_ALLOWED.into()))
            }
        }
    }
}

/// Start a purchase: open a processor checkout session and record a pending
/// transaction keyed by its ID.
///
/// The processor is called first. If it fails nothing is written; if the
/// insert fails the error surfaces and no row exists. Every call is a new
/// attempt (no idempotency at this layer).
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let processor = state
        .payments
        .as_ref()
        .ok_or_else(|| AppError::NotFound(msg::PAYMENTS_DISABLED.into()))?;

    let product = {
        let conn = state.db.get()?;
        queries::find_product_by_price_ref(&conn, &request.price_ref)?
            .or_not_found(msg::UNKNOWN_PRICE_REF)?
    };

    let expected_mode = product
        .checkout_mode()
        .filter(|_| product.price_cents() > 0)
        .ok_or_else(|| AppError::BadRequest(msg::FREE_PRODUCT.into()))?;
    if request.mode != expected_mode {
        return Err(AppError::BadRequest(format!(
            "{} (expected {})",
            msg::MODE_MISMATCH,
            expected_mode.as_ref()
        )));
    }
    let price_id = product
        .stripe_price_id()
        .ok_or_else(|| AppError::BadRequest(msg::NO_PROCESSOR_PRICE.into()))?
        .to_string();

    let success_url = resolve_redirect(&state.base_url, request.success_url, DEFAULT_SUCCESS_PATH)?;
    let cancel_url = resolve_redirect(&state.base_url, request.cancel_url, DEFAULT_CANCEL_PATH)?;

    let transaction_id = EntityType::Transaction.gen_id();
    let (product_meta_key, product_meta_value) = match &product {
        Product::App(app) => ("app_id", app.id.clone()),
        Product::Plan(plan) => ("plan", plan.tier.as_ref().to_string()),
    };
    let metadata = [
        ("user_id", user.user_id.as_str()),
        ("transaction_id", transaction_id.as_str()),
        (product_meta_key, product_meta_value.as_str()),
    ];

    let session = processor
        .create_checkout_session(&CheckoutSessionParams {
            mode: expected_mode,
            price_id: &price_id,
            success_url: &success_url,
            cancel_url: &cancel_url,
            user_id: &user.user_id,
            customer_email: user.email.as_deref(),
            metadata: &metadata,
        })
        .await?;

    let conn = state.db.get()?;
    queries::ensure_profile(&conn, &user.user_id, user.email.as_deref())?;
    queries::create_transaction(
        &conn,
        &transaction_id,
        &CreateTransaction {
            user_id: user.user_id.clone(),
            app_id: match &product {
                Product::App(app) => Some(app.id.clone()),
                Product::Plan(_) => None,
            },
            plan_tier: match &product {
                Product::Plan(plan) => Some(plan.tier),
                Product::App(_) => None,
            },
            mode: expected_mode,
            amount_cents: product.price_cents(),
            currency: product.currency().to_string(),
            processor_reference: session.id.clone(),
            status: TransactionStatus::Pending,
        },
    )?;

    tracing::info!(
        "Checkout {} opened for user {} ({}, transaction {})",
        session.id,
        user.user_id,
        product.key(),
        transaction_id
    );

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}
