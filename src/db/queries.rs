use chrono::Utc;
use rusqlite::{Connection, params};

use crate::error::{AppError, Result};
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{
    APP_COLS, APP_PURCHASE_COLS, NOTIFICATION_COLS, PLAN_COLS, PROFILE_COLS, TRANSACTION_COLS,
    query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Profiles ============

/// Create the profile row on first sight of a user. Fills in a missing email
/// but never touches subscription state.
pub fn ensure_profile(conn: &Connection, user_id: &str, email: Option<&str>) -> Result<()> {
    let now = now();
    conn.execute(
        "INSERT INTO profiles (id, email, subscription_tier, created_at, updated_at)
         VALUES (?1, ?2, 'free', ?3, ?3)
         ON CONFLICT(id) DO UPDATE SET email = COALESCE(profiles.email, excluded.email)",
        params![user_id, email, now],
    )?;
    Ok(())
}

pub fn get_profile(conn: &Connection, id: &str) -> Result<Option<Profile>> {
    query_one(
        conn,
        &format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLS),
        &[&id],
    )
}

pub fn get_profile_by_subscription(
    conn: &Connection,
    subscription_id: &str,
) -> Result<Option<Profile>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM profiles WHERE stripe_subscription_id = ?1",
            PROFILE_COLS
        ),
        &[&subscription_id],
    )
}

/// Overwrite a profile's subscription state (creating the profile if needed).
///
/// Processor IDs are only replaced when the update carries them.
pub fn set_subscription(conn: &Connection, update: &SubscriptionUpdate) -> Result<()> {
    let now = now();
    conn.execute(
        "INSERT INTO profiles (id, subscription_tier, current_period_end, stripe_customer_id,
                               stripe_subscription_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(id) DO UPDATE SET
             subscription_tier = excluded.subscription_tier,
             current_period_end = COALESCE(excluded.current_period_end, profiles.current_period_end),
             stripe_customer_id = COALESCE(excluded.stripe_customer_id, profiles.stripe_customer_id),
             stripe_subscription_id = COALESCE(excluded.stripe_subscription_id, profiles.stripe_subscription_id),
             updated_at = excluded.updated_at",
        params![
            &update.user_id,
            update.tier.as_ref(),
            update.current_period_end,
            &update.stripe_customer_id,
            &update.stripe_subscription_id,
            now,
        ],
    )?;
    Ok(())
}

/// Advance the paid-through watermark for the profile owning a subscription.
/// Never moves it backwards. Returns the owning user ID if the subscription is known.
pub fn extend_subscription_period(
    conn: &Connection,
    subscription_id: &str,
    period_end: i64,
) -> Result<Option<String>> {
    let Some(profile) = get_profile_by_subscription(conn, subscription_id)? else {
        return Ok(None);
    };
    conn.execute(
        "UPDATE profiles
         SET current_period_end = MAX(COALESCE(current_period_end, 0), ?1), updated_at = ?2
         WHERE id = ?3",
        params![period_end, now(), &profile.id],
    )?;
    Ok(Some(profile.id))
}

// ============ Apps ============

pub fn create_app(conn: &Connection, developer_id: &str, input: &CreateApp) -> Result<App> {
    input.validate().map_err(AppError::BadRequest)?;

    let id = EntityType::App.gen_id();
    let now = now();
    let currency = input.currency.to_lowercase();
    conn.execute(
        "INSERT INTO apps (id, developer_id, name, pricing_type, price_cents, currency,
                           stripe_price_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            &id,
            developer_id,
            &input.name,
            input.pricing_type.as_ref(),
            input.price_cents,
            &currency,
            &input.stripe_price_id,
            now,
        ],
    )?;

    Ok(App {
        id,
        developer_id: developer_id.to_string(),
        name: input.name.clone(),
        pricing_type: input.pricing_type,
        price_cents: input.price_cents,
        currency,
        stripe_price_id: input.stripe_price_id.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_app_by_id(conn: &Connection, id: &str) -> Result<Option<App>> {
    query_one(
        conn,
        &format!("SELECT {} FROM apps WHERE id = ?1", APP_COLS),
        &[&id],
    )
}

pub fn get_app_by_price_id(conn: &Connection, price_id: &str) -> Result<Option<App>> {
    query_one(
        conn,
        &format!("SELECT {} FROM apps WHERE stripe_price_id = ?1", APP_COLS),
        &[&price_id],
    )
}

// ============ Subscription Plans ============

/// Insert or replace a plan definition (plans are owned by configuration).
pub fn upsert_plan(conn: &Connection, plan: &SubscriptionPlan) -> Result<()> {
    conn.execute(
        "INSERT INTO subscription_plans (tier, stripe_price_id, price_cents, currency)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(tier) DO UPDATE SET
             stripe_price_id = excluded.stripe_price_id,
             price_cents = excluded.price_cents,
             currency = excluded.currency",
        params![
            plan.tier.as_ref(),
            &plan.stripe_price_id,
            plan.price_cents,
            &plan.currency,
        ],
    )?;
    Ok(())
}

pub fn get_plan(conn: &Connection, tier: PlanTier) -> Result<Option<SubscriptionPlan>> {
    query_one(
        conn,
        &format!("SELECT {} FROM subscription_plans WHERE tier = ?1", PLAN_COLS),
        &[&tier.as_ref()],
    )
}

pub fn list_plans(conn: &Connection) -> Result<Vec<SubscriptionPlan>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM subscription_plans ORDER BY price_cents",
            PLAN_COLS
        ),
        &[],
    )
}

/// Resolve a processor price reference to the product it sells.
pub fn find_product_by_price_ref(conn: &Connection, price_ref: &str) -> Result<Option<Product>> {
    if let Some(app) = get_app_by_price_id(conn, price_ref)? {
        return Ok(Some(Product::App(app)));
    }
    let plan: Option<SubscriptionPlan> = query_one(
        conn,
        &format!(
            "SELECT {} FROM subscription_plans WHERE stripe_price_id = ?1",
            PLAN_COLS
        ),
        &[&price_ref],
    )?;
    Ok(plan.map(Product::Plan))
}

// ============ Transactions ============

/// Insert a ledger row with a caller-chosen ID (the ID travels in processor
/// metadata before the row exists).
pub fn create_transaction(
    conn: &Connection,
    id: &str,
    input: &CreateTransaction,
) -> Result<Transaction> {
    let now = now();
    conn.execute(
        "INSERT INTO transactions (id, user_id, app_id, plan_tier, mode, amount_cents, currency,
                                   processor_reference, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            id,
            &input.user_id,
            &input.app_id,
            input.plan_tier.as_ref().map(|t| t.as_ref()),
            input.mode.as_ref(),
            input.amount_cents,
            &input.currency,
            &input.processor_reference,
            input.status.as_ref(),
            now,
        ],
    )?;

    Ok(Transaction {
        id: id.to_string(),
        user_id: input.user_id.clone(),
        app_id: input.app_id.clone(),
        plan_tier: input.plan_tier,
        mode: input.mode,
        amount_cents: input.amount_cents,
        currency: input.currency.clone(),
        processor_reference: input.processor_reference.clone(),
        status: input.status,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_transaction(conn: &Connection, id: &str) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLS),
        &[&id],
    )
}

pub fn get_transaction_by_reference(
    conn: &Connection,
    processor_reference: &str,
) -> Result<Option<Transaction>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM transactions WHERE processor_reference = ?1",
            TRANSACTION_COLS
        ),
        &[&processor_reference],
    )
}

/// Atomically move a transaction to `completed`. Returns false if no
/// non-completed row matched (already completed, or unknown reference).
pub fn try_complete_transaction(conn: &Connection, processor_reference: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE transactions SET status = 'completed', updated_at = ?1
         WHERE processor_reference = ?2 AND status != 'completed'",
        params![now(), processor_reference],
    )?;
    Ok(affected > 0)
}

/// Mark a pending transaction `failed`. Completed rows are never downgraded.
pub fn mark_transaction_failed(conn: &Connection, processor_reference: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE transactions SET status = 'failed', updated_at = ?1
         WHERE processor_reference = ?2 AND status = 'pending'",
        params![now(), processor_reference],
    )?;
    Ok(affected > 0)
}

/// A user's ledger, newest first.
pub fn list_transactions_for_user(
    conn: &Connection,
    user_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM transactions WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            TRANSACTION_COLS
        ),
        &[&user_id, &limit, &offset],
    )
}

pub fn count_transactions_for_user(conn: &Connection, user_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

// ============ App Purchases ============

/// Record an app purchase. Returns false if the user already owns the app.
pub fn grant_app_purchase(conn: &Connection, input: &CreateAppPurchase) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO app_purchases
             (id, user_id, app_id, transaction_id, processor_reference, granted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            EntityType::Purchase.gen_id(),
            &input.user_id,
            &input.app_id,
            &input.transaction_id,
            &input.processor_reference,
            now(),
        ],
    )?;
    Ok(affected > 0)
}

pub fn user_owns_app(conn: &Connection, user_id: &str, app_id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM app_purchases WHERE user_id = ?1 AND app_id = ?2)",
        params![user_id, app_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn list_app_purchases(conn: &Connection, user_id: &str) -> Result<Vec<AppPurchase>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM app_purchases WHERE user_id = ?1 ORDER BY granted_at, id",
            APP_PURCHASE_COLS
        ),
        &[&user_id],
    )
}

// ============ Webhook Event Deduplication ============

/// Atomically record a webhook event, returning true if this is a new event.
/// Returns false if the (provider, event_id) pair was already processed.
pub fn try_record_webhook_event(conn: &Connection, provider: &str, event_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (provider, event_id, processed_at) VALUES (?1, ?2, ?3)",
        params![provider, event_id, now()],
    )?;
    Ok(affected > 0)
}

/// Purge replay records older than the processor's retry window.
pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM webhook_events WHERE processed_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ============ Notifications ============

pub fn create_notification(conn: &Connection, input: &CreateNotification) -> Result<Notification> {
    let id = EntityType::Notification.gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO notifications (id, user_id, kind, title, message, read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![
            &id,
            &input.user_id,
            input.kind.as_ref(),
            &input.title,
            &input.message,
            now,
        ],
    )?;

    Ok(Notification {
        id,
        user_id: input.user_id.clone(),
        kind: input.kind,
        title: input.title.clone(),
        message: input.message.clone(),
        read: false,
        created_at: now,
    })
}

pub fn list_notifications(conn: &Connection, user_id: &str) -> Result<Vec<Notification>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM notifications WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            NOTIFICATION_COLS
        ),
        &[&user_id],
    )
}
