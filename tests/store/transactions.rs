//! GET /transactions and GET /notifications

#[path = "../common/mod.rs"]
mod common;

use axum::http::StatusCode;
use common::*;

#[tokio::test]
async fn test_transactions_paginate_newest_first() {
    let app = TestApp::new();
    {
        let conn = app.conn();
        let listing = create_test_app(&conn, "Agent Studio", "price_agent");
        for i in 0..5 {
            let txn = create_pending_app_transaction(&conn, "user-1", &listing.id, &format!("cs_{}", i));
            // Distinct, increasing creation times
            conn.execute(
                "UPDATE transactions SET created_at = ?1 WHERE id = ?2",
                rusqlite::params![1_700_000_000 + i, txn.id],
            )
            .unwrap();
        }
        create_pending_app_transaction(&conn, "user-2", &listing.id, "cs_other");
    }
    let token = app.token("user-1");

    let (status, page) = send(app.router(), get_request("/transactions?limit=2", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 5);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["offset"], 0);
    let refs: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["processor_reference"].as_str().unwrap())
        .collect();
    assert_eq!(refs, vec!["cs_4", "cs_3"]);

    let (_, last) = send(
        app.router(),
        get_request("/transactions?limit=2&offset=4", &token),
    )
    .await;
    assert_eq!(last["items"].as_array().unwrap().len(), 1);
    assert_eq!(last["items"][0]["processor_reference"], "cs_0");
    assert_eq!(last["items"][0]["status"], "pending");
}

#[tokio::test]
async fn test_transactions_reject_bad_query() {
    let app = TestApp::new();
    let (status, body) = send(
        app.router(),
        get_request("/transactions?limit=lots", &app.token("user-1")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_notifications_follow_grants() {
    let app = TestApp::new();
    let listing = create_test_app(&app.conn(), "Agent Studio", "price_agent");

    send(
        app.router(),
        webhook_request(&event(
            "evt_n1",
            "checkout.session.completed",
            app_checkout_session("cs_n1", "user-1", &listing.id),
        )),
    )
    .await;

    let (status, body) = send(app.router(), get_request("/notifications", &app.token("user-1"))).await;
    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["kind"], "purchase_completed");
    assert_eq!(items[0]["read"], false);

    let (_, other) = send(app.router(), get_request("/notifications", &app.token("user-2"))).await;
    assert!(other.as_array().unwrap().is_empty());
}
