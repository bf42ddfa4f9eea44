//! Checkout completion, async payment outcomes and what gets granted.

#[path = "../common/mod.rs"]
mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

#[tokio::test]
async fn test_paid_checkout_completes_pending_transaction_and_grants() {
    let app = TestApp::new();
    let (listing, pending) = {
        let conn = app.conn();
        let listing = create_test_app(&conn, "Agent Studio", "price_agent");
        let pending = create_pending_app_transaction(&conn, "user-1", &listing.id, "cs_paid_1");
        (listing, pending)
    };

    let payload = event(
        "evt_paid_1",
        "checkout.session.completed",
        app_checkout_session("cs_paid_1", "user-1", &listing.id),
    );
    let (status, _) = send(app.router(), webhook_request(&payload)).await;
    assert_eq!(status, StatusCode::OK);

    let conn = app.conn();
    let txn = queries::get_transaction(&conn, &pending.id).unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);
    assert!(queries::user_owns_app(&conn, "user-1", &listing.id).unwrap());

    let purchases = queries::list_app_purchases(&conn, "user-1").unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].transaction_id, pending.id);
    assert_eq!(purchases[0].processor_reference, "cs_paid_1");

    let profile = queries::get_profile(&conn, "user-1").unwrap().unwrap();
    assert_eq!(profile.email.as_deref(), Some("buyer@example.com"));

    let notifications = queries::list_notifications(&conn, "user-1").unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::PurchaseCompleted);
}

#[tokio::test]
async fn test_webhook_before_pending_row_grants_from_metadata() {
    let app = TestApp::new();
    let listing = create_test_app(&app.conn(), "Agent Studio", "price_agent");
    let txn_id = vibe_store::id::EntityType::Transaction.gen_id();

    let mut session = app_checkout_session("cs_early", "user-2", &listing.id);
    session["metadata"]["transaction_id"] = json!(txn_id);
    let payload = event("evt_early", "checkout.session.completed", session);

    let (status, _) = send(app.router(), webhook_request(&payload)).await;
    assert_eq!(status, StatusCode::OK);

    let conn = app.conn();
    let txn = queries::get_transaction_by_reference(&conn, "cs_early")
        .unwrap()
        .expect("completed transaction inserted by the webhook");
    assert_eq!(txn.id, txn_id, "transaction keeps the id assigned at checkout");
    assert_eq!(txn.status, TransactionStatus::Completed);
    assert_eq!(txn.amount_cents, 1499);
    assert_eq!(txn.app_id.as_deref(), Some(listing.id.as_str()));
    assert!(queries::user_owns_app(&conn, "user-2", &listing.id).unwrap());
}

#[tokio::test]
async fn test_pending_row_supplies_missing_metadata() {
    let app = TestApp::new();
    let listing = {
        let conn = app.conn();
        let listing = create_test_app(&conn, "Agent Studio", "price_agent");
        create_pending_app_transaction(&conn, "user-3", &listing.id, "cs_nometa");
        listing
    };

    let payload = event(
        "evt_nometa",
        "checkout.session.completed",
        json!({
            "id": "cs_nometa",
            "payment_status": "paid",
            "metadata": null
        }),
    );
    let (status, _) = send(app.router(), webhook_request(&payload)).await;
    assert_eq!(status, StatusCode::OK);

    assert!(queries::user_owns_app(&app.conn(), "user-3", &listing.id).unwrap());
}

#[tokio::test]
async fn test_no_metadata_and_no_pending_row_is_acknowledged_without_grant() {
    let app = TestApp::new();
    let payload = event(
        "evt_orphan",
        "checkout.session.completed",
        json!({ "id": "cs_orphan", "payment_status": "paid" }),
    );

    let (status, _) = send(app.router(), webhook_request(&payload)).await;
    // 200 so the processor stops retrying an event that can never succeed
    assert_eq!(status, StatusCode::OK);

    let conn = app.conn();
    assert!(
        queries::get_transaction_by_reference(&conn, "cs_orphan")
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_unknown_app_is_not_granted() {
    let app = TestApp::new();
    let ghost = vibe_store::id::EntityType::App.gen_id();
    let payload = event(
        "evt_ghost",
        "checkout.session.completed",
        app_checkout_session("cs_ghost", "user-4", &ghost),
    );

    let (status, _) = send(app.router(), webhook_request(&payload)).await;
    assert_eq!(status, StatusCode::OK);

    let conn = app.conn();
    assert!(queries::list_app_purchases(&conn, "user-4").unwrap().is_empty());
    assert!(
        queries::get_transaction_by_reference(&conn, "cs_ghost")
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_delayed_payment_grants_only_on_success() {
    let app = TestApp::new();
    let (listing, pending) = {
        let conn = app.conn();
        let listing = create_test_app(&conn, "Agent Studio", "price_agent");
        let pending = create_pending_app_transaction(&conn, "user-5", &listing.id, "cs_async");
        (listing, pending)
    };

    let mut unpaid = app_checkout_session("cs_async", "user-5", &listing.id);
    unpaid["payment_status"] = json!("unpaid");
    let (status, _) = send(
        app.router(),
        webhook_request(&event("evt_async_1", "checkout.session.completed", unpaid)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    {
        let conn = app.conn();
        assert!(!queries::user_owns_app(&conn, "user-5", &listing.id).unwrap());
        let txn = queries::get_transaction(&conn, &pending.id).unwrap().unwrap();
        assert_eq!(txn.status, TransactionStatus::Pending);
    }

    let (status, _) = send(
        app.router(),
        webhook_request(&event(
            "evt_async_2",
            "checkout.session.async_payment_succeeded",
            app_checkout_session("cs_async", "user-5", &listing.id),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let conn = app.conn();
    assert!(queries::user_owns_app(&conn, "user-5", &listing.id).unwrap());
    let txn = queries::get_transaction(&conn, &pending.id).unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn test_failed_and_expired_sessions_mark_transaction_failed() {
    let app = TestApp::new();
    let (listing, failed, expired) = {
        let conn = app.conn();
        let listing = create_test_app(&conn, "Agent Studio", "price_agent");
        let failed = create_pending_app_transaction(&conn, "user-6", &listing.id, "cs_fail");
        let expired = create_pending_app_transaction(&conn, "user-6", &listing.id, "cs_expire");
        (listing, failed, expired)
    };

    for (event_id, event_type, session_id) in [
        ("evt_fail", "checkout.session.async_payment_failed", "cs_fail"),
        ("evt_expire", "checkout.session.expired", "cs_expire"),
    ] {
        let payload = event(
            event_id,
            event_type,
            json!({ "id": session_id, "payment_status": "unpaid" }),
        );
        let (status, _) = send(app.router(), webhook_request(&payload)).await;
        assert_eq!(status, StatusCode::OK, "{}", event_type);
    }

    let conn = app.conn();
    for id in [&failed.id, &expired.id] {
        let txn = queries::get_transaction(&conn, id).unwrap().unwrap();
        assert_eq!(txn.status, TransactionStatus::Failed);
    }
    assert!(!queries::user_owns_app(&conn, "user-6", &listing.id).unwrap());
}

#[tokio::test]
async fn test_late_success_after_failure_still_grants() {
    let app = TestApp::new();
    let (listing, pending) = {
        let conn = app.conn();
        let listing = create_test_app(&conn, "Agent Studio", "price_agent");
        let pending = create_pending_app_transaction(&conn, "user-7", &listing.id, "cs_late");
        (listing, pending)
    };

    send(
        app.router(),
        webhook_request(&event(
            "evt_late_1",
            "checkout.session.expired",
            json!({ "id": "cs_late" }),
        )),
    )
    .await;
    let (status, _) = send(
        app.router(),
        webhook_request(&event(
            "evt_late_2",
            "checkout.session.completed",
            app_checkout_session("cs_late", "user-7", &listing.id),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let conn = app.conn();
    let txn = queries::get_transaction(&conn, &pending.id).unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);
    assert!(queries::user_owns_app(&conn, "user-7", &listing.id).unwrap());
}

#[tokio::test]
async fn test_failure_never_downgrades_completed_transaction() {
    let app = TestApp::new();
    let (listing, pending) = {
        let conn = app.conn();
        let listing = create_test_app(&conn, "Agent Studio", "price_agent");
        let pending = create_pending_app_transaction(&conn, "user-8", &listing.id, "cs_done");
        (listing, pending)
    };

    send(
        app.router(),
        webhook_request(&event(
            "evt_done_1",
            "checkout.session.completed",
            app_checkout_session("cs_done", "user-8", &listing.id),
        )),
    )
    .await;
    send(
        app.router(),
        webhook_request(&event(
            "evt_done_2",
            "checkout.session.expired",
            json!({ "id": "cs_done" }),
        )),
    )
    .await;

    let conn = app.conn();
    let txn = queries::get_transaction(&conn, &pending.id).unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);
    assert!(queries::user_owns_app(&conn, "user-8", &listing.id).unwrap());
}

#[tokio::test]
async fn test_notification_failure_does_not_roll_back_grant() {
    let app = TestApp::new();
    let listing = {
        let conn = app.conn();
        conn.execute_batch("DROP TABLE notifications").unwrap();
        create_test_app(&conn, "Agent Studio", "price_agent")
    };

    let (status, _) = send(
        app.router(),
        webhook_request(&event(
            "evt_notify",
            "checkout.session.completed",
            app_checkout_session("cs_notify", "user-9", &listing.id),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(queries::user_owns_app(&app.conn(), "user-9", &listing.id).unwrap());
}

#[tokio::test]
async fn test_plan_checkout_sets_tier_and_watermark() {
    let app = TestApp::new();
    let period_end = now() + 30 * ONE_DAY;

    let mut session = plan_checkout_session("cs_plan", "user-10", "pro", "sub_123");
    session["metadata"]["transaction_id"] = json!("not-a-valid-id");
    let (status, _) = send(
        app.router(),
        webhook_request(&event("evt_plan", "checkout.session.completed", session)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let conn = app.conn();
    let profile = queries::get_profile(&conn, "user-10").unwrap().unwrap();
    assert_eq!(profile.subscription_tier, SubscriptionTier::Pro);
    assert_eq!(profile.stripe_subscription_id.as_deref(), Some("sub_123"));
    assert_eq!(profile.stripe_customer_id.as_deref(), Some("cus_test"));
    // Provisional period until the invoice reports the real one
    let watermark = profile.current_period_end.unwrap();
    assert!((watermark - period_end).abs() < 60);

    let txn = queries::get_transaction_by_reference(&conn, "cs_plan")
        .unwrap()
        .unwrap();
    assert_eq!(txn.plan_tier, Some(PlanTier::Pro));
    assert_eq!(txn.mode, CheckoutMode::Subscription);
    assert!(
        vibe_store::id::is_valid_prefixed_id(&txn.id),
        "invalid metadata id is replaced"
    );
}
