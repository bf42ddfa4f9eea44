//! Sandbox checkout page: the dev redirect target completes or cancels
//! through the signed webhook path.

#[path = "../common/mod.rs"]
mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::*;
use serde_json::json;
use tower::ServiceExt;

async fn open_checkout(app: &TestApp, user_id: &str, price_ref: &str, mode: &str) -> (String, String) {
    let (status, body) = send(
        app.router(),
        post_json(
            "/checkout",
            &app.token(user_id),
            &json!({ "priceRef": price_ref, "mode": mode }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    (
        body["sessionId"].as_str().unwrap().to_string(),
        body["url"].as_str().unwrap().to_string(),
    )
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_session_url_serves_checkout_page() {
    let app = TestApp::new();
    create_test_app(&app.conn(), "Agent Studio", "price_agent");
    let (session_id, url) = open_checkout(&app, "user-1", "price_agent", "payment").await;

    let path = url.strip_prefix(TEST_BASE_URL).unwrap();
    let response = app
        .router()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(html.to_vec()).unwrap();
    assert!(html.contains("14.99 USD"));
    assert!(html.contains(&format!("/checkout/sandbox/complete?session_id={}", session_id)));
    assert!(html.contains(&format!("/checkout/sandbox/cancel?session_id={}", session_id)));
}

#[tokio::test]
async fn test_pay_grants_and_redirects_to_success() {
    let app = TestApp::new();
    let listing = create_test_app(&app.conn(), "Agent Studio", "price_agent");
    let (session_id, _) = open_checkout(&app, "user-1", "price_agent", "payment").await;

    let response = app
        .router()
        .oneshot(post_empty(&format!(
            "/checkout/sandbox/complete?session_id={}",
            session_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        format!("{}/checkout/success?session_id={}", TEST_BASE_URL, session_id).as_str()
    );

    assert!(queries::user_owns_app(&app.conn(), "user-1", &listing.id).unwrap());
    let txn = queries::get_transaction_by_reference(&app.conn(), &session_id)
        .unwrap()
        .unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);

    // Paying twice does not double-grant
    let response = app
        .router()
        .oneshot(post_empty(&format!(
            "/checkout/sandbox/complete?session_id={}",
            session_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        queries::list_app_purchases(&app.conn(), "user-1").unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_pay_for_plan_activates_subscription() {
    let app = TestApp::new();
    let (session_id, _) = open_checkout(&app, "user-2", PRO_PRICE, "subscription").await;

    let response = app
        .router()
        .oneshot(post_empty(&format!(
            "/checkout/sandbox/complete?session_id={}",
            session_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let profile = queries::get_profile(&app.conn(), "user-2").unwrap().unwrap();
    assert_eq!(profile.active_plan(now()), Some(PlanTier::Pro));
    assert!(
        profile
            .stripe_subscription_id
            .unwrap()
            .starts_with("sub_sandbox_")
    );
}

#[tokio::test]
async fn test_cancel_fails_transaction_and_redirects() {
    let app = TestApp::new();
    let listing = create_test_app(&app.conn(), "Agent Studio", "price_agent");
    let (session_id, _) = open_checkout(&app, "user-3", "price_agent", "payment").await;

    let response = app
        .router()
        .oneshot(post_empty(&format!(
            "/checkout/sandbox/cancel?session_id={}",
            session_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        format!("{}/checkout/cancel", TEST_BASE_URL).as_str()
    );

    let txn = queries::get_transaction_by_reference(&app.conn(), &session_id)
        .unwrap()
        .unwrap();
    assert_eq!(txn.status, TransactionStatus::Failed);
    assert!(!queries::user_owns_app(&app.conn(), "user-3", &listing.id).unwrap());
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = TestApp::new();

    let (status, body) = send(
        app.router(),
        Request::builder()
            .uri("/checkout/sandbox?session_id=cs_sandbox_missing")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["details"], "Checkout session not found");

    let (status, _) = send(
        app.router(),
        post_empty("/checkout/sandbox/complete?session_id=cs_sandbox_missing"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_page_not_mounted_without_sandbox() {
    let app = TestApp::without_payments();

    let (status, _) = send(
        app.router(),
        Request::builder()
            .uri("/checkout/sandbox?session_id=cs_sandbox_any")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
