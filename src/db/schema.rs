use rusqlite::Connection;

/// Initialize the database schema. Idempotent.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Profiles (storefront users, id = auth provider user id)
        -- subscription_tier is overwritten on every subscription event;
        -- current_period_end is the paid-through watermark
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            email TEXT,
            subscription_tier TEXT NOT NULL DEFAULT 'free'
                CHECK (subscription_tier IN ('free', 'pro', 'enterprise')),
            current_period_end INTEGER,
            stripe_customer_id TEXT,
            stripe_subscription_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_profiles_subscription ON profiles(stripe_subscription_id);

        -- Apps (purchasable side of marketplace listings)
        CREATE TABLE IF NOT EXISTS apps (
            id TEXT PRIMARY KEY,
            developer_id TEXT NOT NULL,
            name TEXT NOT NULL,
            pricing_type TEXT NOT NULL
                CHECK (pricing_type IN ('free', 'one_time', 'subscription', 'freemium')),
            price_cents INTEGER NOT NULL DEFAULT 0 CHECK (price_cents >= 0),
            currency TEXT NOT NULL DEFAULT 'usd',
            stripe_price_id TEXT UNIQUE,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_apps_developer ON apps(developer_id);

        -- Subscription plans (synced from config at startup)
        CREATE TABLE IF NOT EXISTS subscription_plans (
            tier TEXT PRIMARY KEY CHECK (tier IN ('pro', 'enterprise')),
            stripe_price_id TEXT NOT NULL UNIQUE,
            price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
            currency TEXT NOT NULL DEFAULT 'usd'
        );

        -- Transactions (append-only purchase ledger, never deleted)
        -- processor_reference is the checkout session id (cs_xxx) or the
        -- invoice id (in_xxx) for renewals; uniqueness makes grants idempotent
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            app_id TEXT REFERENCES apps(id),
            plan_tier TEXT CHECK (plan_tier IS NULL OR plan_tier IN ('pro', 'enterprise')),
            mode TEXT NOT NULL CHECK (mode IN ('payment', 'subscription')),
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            processor_reference TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL CHECK (status IN ('pending', 'completed', 'failed')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id, created_at DESC);

        -- App purchases (the durable entitlement, one per user/app pair)
        CREATE TABLE IF NOT EXISTS app_purchases (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            app_id TEXT NOT NULL REFERENCES apps(id),
            transaction_id TEXT NOT NULL REFERENCES transactions(id),
            processor_reference TEXT NOT NULL,
            granted_at INTEGER NOT NULL,
            UNIQUE(user_id, app_id)
        );
        CREATE INDEX IF NOT EXISTS idx_app_purchases_user ON app_purchases(user_id);

        -- Webhook replay prevention: (provider, event_id) recorded in the
        -- same database transaction as the grant
        CREATE TABLE IF NOT EXISTS webhook_events (
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            processed_at INTEGER NOT NULL,
            PRIMARY KEY (provider, event_id)
        );

        -- Notifications (best-effort, written after a grant commits)
        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            read INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at DESC);
        "#,
    )
}
