//! Provider-agnostic webhook processing.
//!
//! Providers verify and parse their own payloads into a `WebhookEvent`; the
//! functions here turn events into durable entitlement writes. Every grant runs
//! inside one immediate SQLite transaction so duplicate or concurrent
//! deliveries serialize on the database and produce exactly one grant.

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
};
use rusqlite::{Connection, TransactionBehavior};

use crate::db::{AppState, queries};
use crate::id::EntityType;
use crate::models::{
    CheckoutMode, CreateAppPurchase, CreateNotification, CreateTransaction, NotificationKind,
    PlanTier, SubscriptionTier, SubscriptionUpdate, TransactionStatus,
};

/// Result type for webhook operations: rendered as `{received: true}` for 2xx
/// and `{error: …}` otherwise.
pub type WebhookResult = (StatusCode, &'static str);

/// Provisional paid period when the processor has not told us the real one yet.
pub const DEFAULT_PERIOD_SECS: i64 = 30 * 86400;

/// What a completed checkout entitles the buyer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantTarget {
    App { app_id: String },
    Plan { tier: PlanTier },
}

/// Data extracted from a paid checkout session.
#[derive(Debug, Default)]
pub struct CheckoutData {
    /// Provider event ID for replay prevention.
    pub event_id: Option<String>,
    /// Processor session ID; the transaction's `processor_reference`.
    pub session_id: String,
    /// From metadata; falls back to the pending transaction when absent.
    pub user_id: Option<String>,
    pub target: Option<GrantTarget>,
    /// Transaction ID assigned at checkout creation.
    pub transaction_id: Option<String>,
    pub mode: Option<CheckoutMode>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub subscription_id: Option<String>,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub period_end: Option<i64>,
}

/// A checkout that will never be paid (async failure or session expiry).
#[derive(Debug)]
pub struct PaymentFailureData {
    pub event_id: Option<String>,
    pub session_id: String,
    pub reason: &'static str,
}

/// Subscription state change reported by the processor.
#[derive(Debug, Default)]
pub struct SubscriptionData {
    pub event_id: Option<String>,
    pub subscription_id: String,
    pub user_id: Option<String>,
    pub tier: Option<PlanTier>,
    pub customer_id: Option<String>,
    pub period_end: Option<i64>,
    /// Subscription deleted or in a status that no longer grants the tier.
    pub ended: bool,
}

/// Paid invoice for a subscription.
#[derive(Debug, Default)]
pub struct RenewalData {
    pub event_id: Option<String>,
    pub invoice_id: String,
    pub subscription_id: Option<String>,
    /// Actual renewal, as opposed to the first invoice of a new subscription.
    pub is_renewal: bool,
    pub period_end: Option<i64>,
    pub amount_cents: i64,
    pub currency: String,
}

/// Parsed webhook event with provider-agnostic data.
#[derive(Debug)]
pub enum WebhookEvent {
    CheckoutCompleted(CheckoutData),
    /// Completed session whose payment is still processing (delayed methods).
    CheckoutAwaitingPayment { session_id: String },
    PaymentFailed(PaymentFailureData),
    SubscriptionChanged(SubscriptionData),
    InvoicePaid(RenewalData),
    Ignored,
}

/// Trait for payment provider webhook handling.
pub trait WebhookProvider: Send + Sync {
    /// Provider name for logging and replay records (e.g., "stripe").
    fn provider_name(&self) -> &'static str;

    fn extract_signature(&self, headers: &HeaderMap) -> Result<String, WebhookResult>;

    fn verify_signature(
        &self,
        state: &AppState,
        body: &Bytes,
        signature: &str,
    ) -> Result<bool, WebhookResult>;

    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult>;
}

fn db_error(what: &str, e: impl std::fmt::Display) -> WebhookResult {
    tracing::error!(context = "grant_failure", "{}: {}", what, e);
    (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Outcome of a grant attempt that did not fail.
#[derive(Debug, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted {
        user_id: String,
        transaction_id: String,
        target: GrantTarget,
        /// False when the user already owned the app through another session.
        newly_granted: bool,
    },
    AlreadyProcessed,
}

/// Record a paid checkout: complete (or insert) the transaction and grant the
/// entitlement, atomically.
///
/// Re-runnable: if anything fails the database transaction rolls back and the
/// provider's retry starts from scratch.
pub fn process_checkout(
    conn: &mut Connection,
    provider: &str,
    data: &CheckoutData,
) -> Result<GrantOutcome, WebhookResult> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| db_error("Failed to start transaction", e))?;

    if let Some(event_id) = &data.event_id {
        match queries::try_record_webhook_event(&tx, provider, event_id) {
            Ok(true) => {}
            Ok(false) => return Ok(GrantOutcome::AlreadyProcessed),
            Err(e) => return Err(db_error("Failed to record webhook event", e)),
        }
    }

    let existing = queries::get_transaction_by_reference(&tx, &data.session_id)
        .map_err(|e| db_error("Failed to load transaction", e))?;

    if existing
        .as_ref()
        .is_some_and(|t| t.status == TransactionStatus::Completed)
    {
        return Ok(GrantOutcome::AlreadyProcessed);
    }

    let pending_target = existing.as_ref().and_then(|t| match (&t.app_id, t.plan_tier) {
        (Some(app_id), _) => Some(GrantTarget::App {
            app_id: app_id.clone(),
        }),
        (None, Some(tier)) => Some(GrantTarget::Plan { tier }),
        (None, None) => None,
    });

    let user_id = data
        .user_id
        .clone()
        .or_else(|| existing.as_ref().map(|t| t.user_id.clone()));
    let target = data.target.clone().or(pending_target);

    let (Some(user_id), Some(target)) = (user_id, target) else {
        tracing::warn!(
            "Checkout {} has no user/product metadata and no pending transaction, cannot grant",
            data.session_id
        );
        return Err((StatusCode::OK, "Missing metadata"));
    };

    if let GrantTarget::App { app_id } = &target {
        match queries::get_app_by_id(&tx, app_id) {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!("Checkout {} references unknown app {}", data.session_id, app_id);
                return Err((StatusCode::OK, "Unknown app"));
            }
            Err(e) => return Err(db_error("Failed to load app", e)),
        }
    }

    let transaction_id = match existing {
        Some(pending) => {
            match queries::try_complete_transaction(&tx, &data.session_id) {
                Ok(true) => {}
                Ok(false) => return Ok(GrantOutcome::AlreadyProcessed),
                Err(e) => return Err(db_error("Failed to complete transaction", e)),
            }
            pending.id
        }
        None => {
            // Webhook arrived before (or without) the pending row.
            let id = data
                .transaction_id
                .clone()
                .filter(|id| crate::id::is_valid_prefixed_id(id))
                .unwrap_or_else(|| EntityType::Transaction.gen_id());
            let input = CreateTransaction {
                user_id: user_id.clone(),
                app_id: match &target {
                    GrantTarget::App { app_id } => Some(app_id.clone()),
                    GrantTarget::Plan { .. } => None,
                },
                plan_tier: match &target {
                    GrantTarget::Plan { tier } => Some(*tier),
                    GrantTarget::App { .. } => None,
                },
                mode: data.mode.unwrap_or(match &target {
                    GrantTarget::App { .. } => CheckoutMode::Payment,
                    GrantTarget::Plan { .. } => CheckoutMode::Subscription,
                }),
                amount_cents: data.amount_cents.unwrap_or(0),
                currency: data.currency.clone().unwrap_or_else(|| "usd".to_string()),
                processor_reference: data.session_id.clone(),
                status: TransactionStatus::Completed,
            };
            queries::create_transaction(&tx, &id, &input)
                .map_err(|e| db_error("Failed to insert transaction", e))?
                .id
        }
    };

    if let Err(e) = queries::ensure_profile(&tx, &user_id, data.customer_email.as_deref()) {
        return Err(db_error("Failed to ensure profile", e));
    }

    let newly_granted = match &target {
        GrantTarget::App { app_id } => queries::grant_app_purchase(
            &tx,
            &CreateAppPurchase {
                user_id: user_id.clone(),
                app_id: app_id.clone(),
                transaction_id: transaction_id.clone(),
                processor_reference: data.session_id.clone(),
            },
        )
        .map_err(|e| db_error("Failed to grant app purchase", e))?,
        GrantTarget::Plan { tier } => {
            queries::set_subscription(
                &tx,
                &SubscriptionUpdate {
                    user_id: user_id.clone(),
                    tier: (*tier).into(),
                    current_period_end: Some(
                        data.period_end.unwrap_or_else(|| now() + DEFAULT_PERIOD_SECS),
                    ),
                    stripe_customer_id: data.customer_id.clone(),
                    stripe_subscription_id: data.subscription_id.clone(),
                },
            )
            .map_err(|e| db_error("Failed to update subscription", e))?;
            true
        }
    };

    tx.commit()
        .map_err(|e| db_error("Failed to commit grant", e))?;

    Ok(GrantOutcome::Granted {
        user_id,
        transaction_id,
        target,
        newly_granted,
    })
}

/// Mark a never-to-be-paid checkout as failed. Entitlements are untouched.
pub fn process_payment_failure(
    conn: &mut Connection,
    provider: &str,
    data: &PaymentFailureData,
) -> WebhookResult {
    let tx = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
        Ok(tx) => tx,
        Err(e) => return db_error("Failed to start transaction", e),
    };

    if let Some(event_id) = &data.event_id {
        match queries::try_record_webhook_event(&tx, provider, event_id) {
            Ok(true) => {}
            Ok(false) => return (StatusCode::OK, "Already processed"),
            Err(e) => return db_error("Failed to record webhook event", e),
        }
    }

    let marked = match queries::mark_transaction_failed(&tx, &data.session_id) {
        Ok(marked) => marked,
        Err(e) => return db_error("Failed to mark transaction failed", e),
    };

    if let Err(e) = tx.commit() {
        return db_error("Failed to commit payment failure", e);
    }

    if marked {
        tracing::info!(
            context = "payment_failed",
            "Checkout {} did not complete: {}",
            data.session_id,
            data.reason
        );
    } else {
        tracing::debug!(
            "Checkout {} {}: no pending transaction to fail",
            data.session_id,
            data.reason
        );
    }
    (StatusCode::OK, "OK")
}

/// Apply a subscription change: overwrite the tier, keep or move the watermark.
///
/// Returns the affected user when something changed.
pub fn process_subscription_change(
    conn: &mut Connection,
    provider: &str,
    data: &SubscriptionData,
) -> Result<Option<String>, WebhookResult> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| db_error("Failed to start transaction", e))?;

    if let Some(event_id) = &data.event_id {
        match queries::try_record_webhook_event(&tx, provider, event_id) {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) => return Err(db_error("Failed to record webhook event", e)),
        }
    }

    let profile = queries::get_profile_by_subscription(&tx, &data.subscription_id)
        .map_err(|e| db_error("Failed to load profile", e))?;
    let user_id = match (&data.user_id, &profile) {
        (Some(user_id), _) => user_id.clone(),
        (None, Some(profile)) => profile.id.clone(),
        (None, None) => {
            tracing::warn!(
                "Subscription {} has no user metadata and no known profile",
                data.subscription_id
            );
            return Ok(None);
        }
    };

    let current = queries::get_profile(&tx, &user_id)
        .map_err(|e| db_error("Failed to load profile", e))?;

    // Events for a subscription the user has since replaced must not touch the tier.
    if let Some(current_sub) = current.as_ref().and_then(|p| p.stripe_subscription_id.as_deref())
        && current_sub != data.subscription_id
    {
        tracing::info!(
            "Ignoring event for superseded subscription {} (user {} now on {})",
            data.subscription_id,
            user_id,
            current_sub
        );
        tx.commit()
            .map_err(|e| db_error("Failed to commit", e))?;
        return Ok(None);
    }

    let tier = if data.ended {
        SubscriptionTier::Free
    } else {
        match (data.tier, &current) {
            (Some(tier), _) => tier.into(),
            (None, Some(profile)) => profile.subscription_tier,
            (None, None) => {
                tracing::warn!(
                    "Subscription {} has no plan metadata and user {} has no profile",
                    data.subscription_id,
                    user_id
                );
                return Ok(None);
            }
        }
    };

    queries::set_subscription(
        &tx,
        &SubscriptionUpdate {
            user_id: user_id.clone(),
            tier,
            // Cancellation keeps the watermark where it was.
            current_period_end: if data.ended { None } else { data.period_end },
            stripe_customer_id: data.customer_id.clone(),
            stripe_subscription_id: Some(data.subscription_id.clone()),
        },
    )
    .map_err(|e| db_error("Failed to update subscription", e))?;

    tx.commit()
        .map_err(|e| db_error("Failed to commit subscription change", e))?;

    tracing::info!(
        "Subscription {} for user {} is now {}",
        data.subscription_id,
        user_id,
        tier.as_ref()
    );
    Ok(Some(user_id))
}

/// Advance the paid period on a paid invoice and ledger renewal revenue.
pub fn process_renewal(
    conn: &mut Connection,
    provider: &str,
    data: &RenewalData,
) -> WebhookResult {
    let Some(subscription_id) = &data.subscription_id else {
        return (StatusCode::OK, "Not a subscription invoice");
    };
    let Some(period_end) = data.period_end else {
        tracing::warn!("Invoice {} has no billing period", data.invoice_id);
        return (StatusCode::OK, "No billing period");
    };

    let tx = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
        Ok(tx) => tx,
        Err(e) => return db_error("Failed to start transaction", e),
    };

    if let Some(event_id) = &data.event_id {
        match queries::try_record_webhook_event(&tx, provider, event_id) {
            Ok(true) => {}
            Ok(false) => return (StatusCode::OK, "Already processed"),
            Err(e) => return db_error("Failed to record webhook event", e),
        }
    }

    let user_id = match queries::extend_subscription_period(&tx, subscription_id, period_end) {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            // The checkout event for this subscription will set the period itself.
            tracing::warn!(
                "Invoice {} for unknown subscription {}",
                data.invoice_id,
                subscription_id
            );
            return (StatusCode::OK, "Unknown subscription");
        }
        Err(e) => return db_error("Failed to extend subscription", e),
    };

    // The first invoice is already on the ledger as the checkout transaction.
    if data.is_renewal {
        let plan_tier = match queries::get_profile(&tx, &user_id) {
            Ok(profile) => profile.and_then(|p| p.subscription_tier.plan()),
            Err(e) => return db_error("Failed to load profile", e),
        };
        match queries::get_transaction_by_reference(&tx, &data.invoice_id) {
            Ok(Some(_)) => {}
            Ok(None) => {
                let input = CreateTransaction {
                    user_id: user_id.clone(),
                    app_id: None,
                    plan_tier,
                    mode: CheckoutMode::Subscription,
                    amount_cents: data.amount_cents,
                    currency: data.currency.clone(),
                    processor_reference: data.invoice_id.clone(),
                    status: TransactionStatus::Completed,
                };
                if let Err(e) =
                    queries::create_transaction(&tx, &EntityType::Transaction.gen_id(), &input)
                {
                    return db_error("Failed to record renewal", e);
                }
            }
            Err(e) => return db_error("Failed to load transaction", e),
        }
    }

    if let Err(e) = tx.commit() {
        return db_error("Failed to commit renewal", e);
    }

    tracing::info!(
        "Subscription {} for user {} paid through {}",
        subscription_id,
        user_id,
        period_end
    );
    (StatusCode::OK, "OK")
}

/// Best-effort user notification, written after the grant has committed.
fn notify(conn: &Connection, input: CreateNotification) {
    if let Err(e) = queries::create_notification(conn, &input) {
        tracing::warn!(
            "Failed to create {} notification for user {}: {}",
            input.kind.as_ref(),
            input.user_id,
            e
        );
    }
}

pub async fn handle_webhook<P: WebhookProvider>(
    provider: &P,
    state: &AppState,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let signature = match provider.extract_signature(&headers) {
        Ok(s) => s,
        Err(e) => return e,
    };

    // Nothing is parsed or written before the signature checks out.
    match provider.verify_signature(state, &body, &signature) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::BAD_REQUEST, "Invalid signature"),
        Err(e) => return e,
    }

    let event = match provider.parse_event(&body) {
        Ok(e) => e,
        Err(e) => return e,
    };

    let mut conn = match state.db.get() {
        Ok(conn) => conn,
        Err(e) => return db_error("DB connection error", e),
    };

    match event {
        WebhookEvent::CheckoutCompleted(data) => {
            match process_checkout(&mut conn, provider.provider_name(), &data) {
                Ok(GrantOutcome::Granted {
                    user_id,
                    transaction_id,
                    target,
                    newly_granted,
                }) => {
                    tracing::info!(
                        "Checkout {} granted {:?} to user {} (transaction {}, new: {})",
                        data.session_id,
                        target,
                        user_id,
                        transaction_id,
                        newly_granted
                    );
                    notify(&conn, grant_notification(&user_id, &target));
                    (StatusCode::OK, "OK")
                }
                Ok(GrantOutcome::AlreadyProcessed) => {
                    tracing::debug!("Checkout {} already processed", data.session_id);
                    (StatusCode::OK, "Already processed")
                }
                Err(e) => e,
            }
        }
        WebhookEvent::CheckoutAwaitingPayment { session_id } => {
            tracing::info!("Checkout {} completed, payment still processing", session_id);
            (StatusCode::OK, "Awaiting payment")
        }
        WebhookEvent::PaymentFailed(data) => {
            process_payment_failure(&mut conn, provider.provider_name(), &data)
        }
        WebhookEvent::SubscriptionChanged(data) => {
            match process_subscription_change(&mut conn, provider.provider_name(), &data) {
                Ok(Some(user_id)) => {
                    notify(
                        &conn,
                        CreateNotification {
                            user_id,
                            kind: NotificationKind::SubscriptionUpdated,
                            title: "Subscription updated".to_string(),
                            message: if data.ended {
                                "Your subscription has ended.".to_string()
                            } else {
                                "Your subscription has been updated.".to_string()
                            },
                        },
                    );
                    (StatusCode::OK, "OK")
                }
                Ok(None) => (StatusCode::OK, "No change"),
                Err(e) => e,
            }
        }
        WebhookEvent::InvoicePaid(data) => {
            process_renewal(&mut conn, provider.provider_name(), &data)
        }
        WebhookEvent::Ignored => (StatusCode::OK, "Event ignored"),
    }
}

fn grant_notification(user_id: &str, target: &GrantTarget) -> CreateNotification {
    match target {
        GrantTarget::App { app_id } => CreateNotification {
            user_id: user_id.to_string(),
            kind: NotificationKind::PurchaseCompleted,
            title: "Purchase complete".to_string(),
            message: format!("You now own app {}.", app_id),
        },
        GrantTarget::Plan { tier } => CreateNotification {
            user_id: user_id.to_string(),
            kind: NotificationKind::SubscriptionUpdated,
            title: "Subscription active".to_string(),
            message: format!("Your {} plan is active.", tier.as_ref()),
        },
    }
}
