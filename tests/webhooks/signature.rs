//! Signature verification happens before anything is parsed or written.

#[path = "../common/mod.rs"]
mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use common::*;
use serde_json::json;

fn paid_app_event(app: &TestApp) -> (App, serde_json::Value) {
    let conn = app.conn();
    let listing = create_test_app(&conn, "Agent Studio", "price_agent");
    let payload = event(
        "evt_sig_1",
        "checkout.session.completed",
        app_checkout_session("cs_sig_1", "user-1", &listing.id),
    );
    (listing, payload)
}

#[tokio::test]
async fn test_valid_signature_is_accepted() {
    let app = TestApp::new();
    let (_, payload) = paid_app_event(&app);

    let (status, body) = send(app.router(), webhook_request(&payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
}

#[tokio::test]
async fn test_wrong_secret_is_rejected_without_side_effects() {
    let app = TestApp::new();
    let (listing, payload) = paid_app_event(&app);
    let body = serde_json::to_vec(&payload).unwrap();
    let signature = stripe_signature(&body, "whsec_attacker", now());

    let (status, _) = send(app.router(), webhook_request_with(&payload, &signature)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let conn = app.conn();
    assert!(!queries::user_owns_app(&conn, "user-1", &listing.id).unwrap());
    assert!(
        queries::get_transaction_by_reference(&conn, "cs_sig_1")
            .unwrap()
            .is_none(),
        "forged event must not write a transaction"
    );
}

#[tokio::test]
async fn test_tampered_payload_is_rejected() {
    let app = TestApp::new();
    let (_, payload) = paid_app_event(&app);
    let body = serde_json::to_vec(&payload).unwrap();
    let signature = stripe_signature(&body, TEST_WEBHOOK_SECRET, now());

    let mut tampered = payload.clone();
    tampered["data"]["object"]["metadata"]["user_id"] = json!("user-attacker");

    let (status, _) = send(app.router(), webhook_request_with(&tampered, &signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stale_timestamp_is_rejected() {
    let app = TestApp::new();
    let (_, payload) = paid_app_event(&app);
    let body = serde_json::to_vec(&payload).unwrap();
    // 10 minutes old, beyond the 5 minute tolerance
    let signature = stripe_signature(&body, TEST_WEBHOOK_SECRET, now() - 600);

    let (status, _) = send(app.router(), webhook_request_with(&payload, &signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_and_malformed_signature_headers() {
    let app = TestApp::new();
    let (_, payload) = paid_app_event(&app);

    let no_header = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .unwrap();
    let (status, body) = send(app.router(), no_header).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing stripe-signature header");

    for header in ["v1=abc", "t=123", "t=notanumber,v1=abc", "garbage"] {
        let (status, _) = send(app.router(), webhook_request_with(&payload, header)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "header {:?}", header);
    }
}

#[tokio::test]
async fn test_out_of_range_timestamp_is_rejected() {
    let app = TestApp::new();
    let (listing, payload) = paid_app_event(&app);
    let header = format!("t={},v1={}", i64::MIN, "0".repeat(64));

    let (status, body) = send(app.router(), webhook_request_with(&payload, &header)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid signature");
    assert!(!queries::user_owns_app(&app.conn(), "user-1", &listing.id).unwrap());
}

#[tokio::test]
async fn test_signed_garbage_is_bad_request() {
    let app = TestApp::new();
    let body = b"{not json".to_vec();
    let signature = stripe_signature(&body, TEST_WEBHOOK_SECRET, now());
    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("stripe-signature", signature)
        .body(Body::from(body))
        .unwrap();

    let (status, body) = send(app.router(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid JSON");
}

#[tokio::test]
async fn test_unrelated_event_types_are_acknowledged() {
    let app = TestApp::new();
    let payload = event(
        "evt_other",
        "customer.created",
        json!({ "id": "cus_123", "object": "customer" }),
    );

    let (status, body) = send(app.router(), webhook_request(&payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));
}

#[tokio::test]
async fn test_webhook_route_absent_without_payments() {
    let app = TestApp::without_payments();
    let payload = event("evt_1", "customer.created", json!({ "id": "cus_1" }));

    let (status, _) = send(app.router(), webhook_request(&payload)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
