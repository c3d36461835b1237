//! Order status machine tests over the HTTP surface: single and bulk
//! transitions, access control, and notification side-effects.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use common::{response_json, RecordingNotifier, TestApp};
use serde_json::json;
use storefront_api::services::order_status::OrderStatus;
use uuid::Uuid;

async fn wait_for_deliveries(notifier: &RecordingNotifier, expected: usize) {
    for _ in 0..100 {
        if notifier.deliveries().len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} notifications, saw {:?}",
        expected,
        notifier.deliveries()
    );
}

#[tokio::test]
async fn transitions_require_the_staff_role() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let order = app.seed_order(customer.id, OrderStatus::Pending).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/status", order.id),
            Some((customer.id, "customer")),
            Some(json!({ "status": "processing" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let bulk = app
        .request(
            Method::POST,
            "/api/v1/orders/status/bulk",
            Some((customer.id, "customer")),
            Some(json!({ "order_ids": [order.id], "status": "processing" })),
        )
        .await;
    assert_eq!(bulk.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn valid_transition_advances_and_notifies() {
    let notifier = Arc::new(RecordingNotifier::default());
    let app = TestApp::with_notifier(notifier.clone()).await;
    let customer = app.seed_customer().await;
    let order = app.seed_order(customer.id, OrderStatus::Pending).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/status", order.id),
            Some((Uuid::new_v4(), "staff")),
            Some(json!({ "status": "processing" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "processing");

    let stored = app.order_by_id(order.id).await.unwrap();
    assert_eq!(stored.status, "processing");
    assert_eq!(stored.version, 2);

    wait_for_deliveries(&notifier, 1).await;
    let deliveries = notifier.deliveries();
    assert_eq!(deliveries[0].0, order.id);
    assert_eq!(deliveries[0].1, customer.email);
    assert_eq!(deliveries[0].2, "processing");
}

#[tokio::test]
async fn skipping_states_is_a_conflict() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let order = app.seed_order(customer.id, OrderStatus::Pending).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/status", order.id),
            Some((Uuid::new_v4(), "staff")),
            Some(json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let stored = app.order_by_id(order.id).await.unwrap();
    assert_eq!(stored.status, "pending");
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn repeating_the_current_status_is_a_noop() {
    let notifier = Arc::new(RecordingNotifier::default());
    let app = TestApp::with_notifier(notifier.clone()).await;
    let customer = app.seed_customer().await;
    let order = app.seed_order(customer.id, OrderStatus::Processing).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/status", order.id),
            Some((Uuid::new_v4(), "staff")),
            Some(json!({ "status": "processing" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = app.order_by_id(order.id).await.unwrap();
    assert_eq!(stored.version, 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(notifier.deliveries().is_empty());
}

#[tokio::test]
async fn cancelling_a_delivered_order_is_a_conflict() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let order = app.seed_order(customer.id, OrderStatus::Delivered).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/status", order.id),
            Some((Uuid::new_v4(), "staff")),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancelling_an_open_order_succeeds() {
    let app = TestApp::new().await;
    let customer = app.seed_customer().await;
    let order = app.seed_order(customer.id, OrderStatus::InProduction).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/status", order.id),
            Some((Uuid::new_v4(), "staff")),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.order_by_id(order.id).await.unwrap().status, "cancelled");
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/status", Uuid::new_v4()),
            Some((Uuid::new_v4(), "staff")),
            Some(json!({ "status": "processing" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_transition_counts_and_notifies_independently() {
    let notifier = Arc::new(RecordingNotifier::default());
    let app = TestApp::with_notifier(notifier.clone()).await;

    let alice = app.seed_customer().await;
    let bob = app.seed_customer().await;
    let carol = app.seed_customer().await;
    notifier.fail_for(&bob.email);

    let order_a = app.seed_order(alice.id, OrderStatus::Pending).await;
    let order_b = app.seed_order(bob.id, OrderStatus::Pending).await;
    let order_c = app.seed_order(carol.id, OrderStatus::Pending).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/status/bulk",
            Some((Uuid::new_v4(), "staff")),
            Some(json!({
                "order_ids": [order_a.id, order_b.id, order_c.id, Uuid::new_v4()],
                "status": "processing"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["updated_count"], 3);

    for id in [order_a.id, order_b.id, order_c.id] {
        let stored = app.order_by_id(id).await.unwrap();
        assert_eq!(stored.status, "processing");
        assert_eq!(stored.version, 2);
    }

    // Bob's mailbox fails; Alice and Carol still get notified.
    wait_for_deliveries(&notifier, 2).await;
    let recipients: Vec<String> = notifier.deliveries().iter().map(|d| d.1.clone()).collect();
    assert!(recipients.contains(&alice.email));
    assert!(recipients.contains(&carol.email));
    assert!(!recipients.contains(&bob.email));
}

#[tokio::test]
async fn bulk_transition_with_no_ids_updates_nothing() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/status/bulk",
            Some((Uuid::new_v4(), "staff")),
            Some(json!({ "order_ids": [], "status": "processing" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["updated_count"], 0);
}
