//! Test utilities and fixtures for Vibe Store integration tests

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use hmac::{Hmac, Mac};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde_json::{Value, json};
use sha2::Sha256;
use tempfile::TempDir;
use tower::ServiceExt;

pub use vibe_store::db::{AppState, create_pool, init_db, queries};
pub use vibe_store::handlers;
pub use vibe_store::jwt::SessionKey;
pub use vibe_store::models::*;
pub use vibe_store::payments::{PaymentProcessor, SandboxProcessor};

pub const TEST_BASE_URL: &str = "http://store.test";
pub const TEST_JWT_SECRET: &str = "test-jwt-secret-that-is-long-enough-for-hs256";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const ONE_DAY: i64 = 86400;

pub const PRO_PRICE: &str = "price_test_pro";
pub const ENTERPRISE_PRICE: &str = "price_test_enterprise";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// A file-backed app state. Every pooled connection sees the same database,
/// which in-memory SQLite can't offer.
pub struct TestApp {
    pub state: AppState,
    _dir: TempDir,
}

impl TestApp {
    /// Payments enabled through the sandbox processor.
    pub fn new() -> Self {
        Self::build(Some(PaymentProcessor::Sandbox(SandboxProcessor::new(
            TEST_BASE_URL,
            TEST_WEBHOOK_SECRET,
        ))))
    }

    pub fn without_payments() -> Self {
        Self::build(None)
    }

    fn build(payments: Option<PaymentProcessor>) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("vibe_store_test.db");
        let pool = create_pool(path.to_str().expect("temp path is UTF-8"))
            .expect("Failed to create pool");
        {
            let conn = pool.get().unwrap();
            init_db(&conn).unwrap();
            seed_plans(&conn);
        }

        TestApp {
            state: AppState {
                db: pool,
                base_url: TEST_BASE_URL.to_string(),
                sessions: SessionKey::new(TEST_JWT_SECRET),
                payments,
            },
            _dir: dir,
        }
    }

    /// Full API without the checkout rate limiter (oneshot requests carry no peer address).
    pub fn router(&self) -> Router {
        handlers::router(&self.state, 0).with_state(self.state.clone())
    }

    pub fn conn(&self) -> PooledConnection<SqliteConnectionManager> {
        self.state.db.get().expect("Failed to get connection")
    }

    pub fn token(&self, user_id: &str) -> String {
        self.state
            .sessions
            .sign(user_id, Some(&format!("{}@example.com", user_id)), 3600)
            .expect("Failed to sign token")
    }
}

pub fn seed_plans(conn: &Connection) {
    for (tier, price, cents) in [
        (PlanTier::Pro, PRO_PRICE, 999),
        (PlanTier::Enterprise, ENTERPRISE_PRICE, 4999),
    ] {
        queries::upsert_plan(
            conn,
            &SubscriptionPlan {
                tier,
                stripe_price_id: price.to_string(),
                price_cents: cents,
                currency: "usd".to_string(),
            },
        )
        .expect("Failed to seed plan");
    }
}

/// Create a paid one-time app with the given price reference
pub fn create_test_app(conn: &Connection, name: &str, price_ref: &str) -> App {
    create_test_app_with_pricing(conn, name, PricingType::OneTime, 1499, Some(price_ref))
}

pub fn create_test_app_with_pricing(
    conn: &Connection,
    name: &str,
    pricing_type: PricingType,
    price_cents: i64,
    price_ref: Option<&str>,
) -> App {
    queries::create_app(
        conn,
        "dev-test",
        &CreateApp {
            name: name.to_string(),
            pricing_type,
            price_cents,
            currency: "usd".to_string(),
            stripe_price_id: price_ref.map(str::to_string),
        },
    )
    .expect("Failed to create test app")
}

/// Insert a pending transaction as the checkout initiator would.
pub fn create_pending_app_transaction(
    conn: &Connection,
    user_id: &str,
    app_id: &str,
    session_id: &str,
) -> Transaction {
    queries::ensure_profile(conn, user_id, None).unwrap();
    queries::create_transaction(
        conn,
        &vibe_store::id::EntityType::Transaction.gen_id(),
        &CreateTransaction {
            user_id: user_id.to_string(),
            app_id: Some(app_id.to_string()),
            plan_tier: None,
            mode: CheckoutMode::Payment,
            amount_cents: 1499,
            currency: "usd".to_string(),
            processor_reference: session_id.to_string(),
            status: TransactionStatus::Pending,
        },
    )
    .expect("Failed to create pending transaction")
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============ Webhook payloads ============

pub fn stripe_signature(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

pub fn event(event_id: &str, event_type: &str, object: Value) -> Value {
    json!({
        "id": event_id,
        "object": "event",
        "type": event_type,
        "data": { "object": object }
    })
}

/// A paid checkout session for an app.
pub fn app_checkout_session(session_id: &str, user_id: &str, app_id: &str) -> Value {
    json!({
        "id": session_id,
        "object": "checkout.session",
        "mode": "payment",
        "payment_status": "paid",
        "client_reference_id": user_id,
        "customer": "cus_test",
        "customer_details": { "email": "buyer@example.com" },
        "amount_total": 1499,
        "currency": "usd",
        "metadata": { "user_id": user_id, "app_id": app_id }
    })
}

/// A paid checkout session for a subscription plan.
pub fn plan_checkout_session(
    session_id: &str,
    user_id: &str,
    plan: &str,
    subscription_id: &str,
) -> Value {
    json!({
        "id": session_id,
        "object": "checkout.session",
        "mode": "subscription",
        "payment_status": "paid",
        "client_reference_id": user_id,
        "customer": "cus_test",
        "subscription": subscription_id,
        "amount_total": 999,
        "currency": "usd",
        "metadata": { "user_id": user_id, "plan": plan }
    })
}

pub fn webhook_request_with(payload: &Value, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(serde_json::to_vec(payload).unwrap()))
        .unwrap()
}

/// Correctly signed delivery.
pub fn webhook_request(payload: &Value) -> Request<Body> {
    let body = serde_json::to_vec(payload).unwrap();
    let signature = stripe_signature(&body, TEST_WEBHOOK_SECRET, now());
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(body))
        .unwrap()
}

// ============ Requests ============

pub fn get_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, token: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Send a request and return status plus JSON body (`Value::Null` if empty).
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
