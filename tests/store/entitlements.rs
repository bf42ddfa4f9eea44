//! GET /entitlements and GET /entitlements/{app_id}

#[path = "../common/mod.rs"]
mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::*;
use serde_json::{Value, json};
use vibe_store::handlers::webhooks::common::{CheckoutData, GrantTarget, process_checkout};

fn grant(app: &TestApp, user_id: &str, session_id: &str, target: GrantTarget) {
    let mut conn = app.conn();
    process_checkout(
        &mut conn,
        "stripe",
        &CheckoutData {
            event_id: Some(format!("evt_{}", session_id)),
            session_id: session_id.to_string(),
            user_id: Some(user_id.to_string()),
            target: Some(target),
            subscription_id: Some(format!("sub_{}", session_id)),
            ..Default::default()
        },
    )
    .expect("grant");
}

#[tokio::test]
async fn test_new_user_has_no_entitlements() {
    let app = TestApp::new();
    let token = app.token("user-new");

    let (status, body) = send(app.router(), get_request("/entitlements", &token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "user_id": "user-new",
            "product_ids": [],
            "subscription_tier": "free",
            "current_period_end": null
        })
    );
}

#[tokio::test]
async fn test_entitlements_list_owned_apps_and_subscription() {
    let app = TestApp::new();
    let (first, second, _unowned) = {
        let conn = app.conn();
        (
            create_test_app(&conn, "Agent Studio", "price_a"),
            create_test_app(&conn, "Voice Notes AI", "price_b"),
            create_test_app(&conn, "Research Copilot", "price_c"),
        )
    };
    grant(&app, "user-1", "cs_1", GrantTarget::App { app_id: first.id.clone() });
    grant(&app, "user-1", "cs_2", GrantTarget::App { app_id: second.id.clone() });
    grant(&app, "user-1", "cs_3", GrantTarget::Plan { tier: PlanTier::Pro });

    let (status, body) = send(app.router(), get_request("/entitlements", &app.token("user-1"))).await;
    assert_eq!(status, StatusCode::OK);

    let mut ids: Vec<&str> = body["product_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    ids.sort();
    let mut expected = vec![first.id.as_str(), second.id.as_str()];
    expected.sort();
    assert_eq!(ids, expected);
    assert_eq!(body["subscription_tier"], "pro");
    assert!(body["current_period_end"].as_i64().unwrap() > now());
}

#[tokio::test]
async fn test_entitlements_are_per_user() {
    let app = TestApp::new();
    let listing = create_test_app(&app.conn(), "Agent Studio", "price_a");
    grant(&app, "user-a", "cs_a", GrantTarget::App { app_id: listing.id.clone() });

    let (_, body) = send(app.router(), get_request("/entitlements", &app.token("user-b"))).await;
    assert_eq!(body["product_ids"], json!([]));
}

#[tokio::test]
async fn test_entitlements_require_auth() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/entitlements")
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(app.router(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_entitlements_available_without_payments() {
    let app = TestApp::without_payments();
    let (status, _) = send(app.router(), get_request("/entitlements", &app.token("u"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_app_ownership_check() {
    let app = TestApp::new();
    let (owned, not_owned) = {
        let conn = app.conn();
        (
            create_test_app(&conn, "Agent Studio", "price_a"),
            create_test_app(&conn, "Voice Notes AI", "price_b"),
        )
    };
    grant(&app, "user-1", "cs_1", GrantTarget::App { app_id: owned.id.clone() });
    let token = app.token("user-1");

    let (status, body) = send(
        app.router(),
        get_request(&format!("/entitlements/{}", owned.id), &token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "app_id": owned.id, "owned": true }));

    let (_, body) = send(
        app.router(),
        get_request(&format!("/entitlements/{}", not_owned.id), &token),
    )
    .await;
    assert_eq!(body["owned"], Value::Bool(false));
}

#[tokio::test]
async fn test_app_ownership_rejects_bad_and_unknown_ids() {
    let app = TestApp::new();
    let token = app.token("user-1");

    let (status, _) = send(app.router(), get_request("/entitlements/not-an-id", &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Well-formed id of the wrong entity type
    let txn_id = vibe_store::id::EntityType::Transaction.gen_id();
    let (status, _) = send(
        app.router(),
        get_request(&format!("/entitlements/{}", txn_id), &token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let ghost = vibe_store::id::EntityType::App.gen_id();
    let (status, body) = send(
        app.router(),
        get_request(&format!("/entitlements/{}", ghost), &token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["details"], "App not found");
}
