mod common;

use std::sync::Arc;

use brousla_adapters::{await_checkout, CheckoutAdapter, CheckoutEvent};
use brousla_client::messages::Plan;
use brousla_client::AccountApi;
use brousla_core::operation::OperationStatus;
use brousla_core::policy::PolicyKind;
use common::{json_body, registry};
use mockito::Matcher;
use serde_json::json;
use tokio::sync::mpsc;

const TOKEN: &str = "jwt-user";

fn adapter(server: &mockito::Server) -> Arc<CheckoutAdapter> {
    Arc::new(CheckoutAdapter::new(AccountApi::new(server.url()), TOKEN))
}

async fn mock_session(server: &mut mockito::Server, session_id: &str, plan: &str) -> mockito::Mock {
    server
        .mock("POST", "/api/subscription/create-checkout")
        .match_header("authorization", format!("Bearer {TOKEN}").as_str())
        .match_body(Matcher::Json(json!({"plan": plan})))
        .with_body(json_body(json!({
            "checkout_url": format!("https://checkout.stripe.com/c/pay/{session_id}"),
            "session_id": session_id
        })))
        .expect(1)
        .create_async()
        .await
}

async fn mock_status(
    server: &mut mockito::Server,
    body: serde_json::Value,
    hits: Option<usize>,
) -> mockito::Mock {
    let mock = server
        .mock("GET", "/api/subscription/status")
        .match_header("authorization", format!("Bearer {TOKEN}").as_str())
        .with_body(json_body(body));
    match hits {
        Some(n) => mock.expect(n).create_async().await,
        None => mock.create_async().await,
    }
}

#[tokio::test]
async fn success_waits_for_the_purchased_plan() {
    let mut server = mockito::Server::new_async().await;
    let create = mock_session(&mut server, "cs_1", "pro").await;
    mock_status(
        &mut server,
        json!({"subscription_plan": "basic", "subscription_status": "active", "can_execute": true}),
        Some(2),
    )
    .await;
    mock_status(
        &mut server,
        json!({"subscription_plan": "pro", "subscription_status": "active", "can_execute": true}),
        None,
    )
    .await;

    let registry = registry();
    let adapter = adapter(&server);
    let session = adapter.create_session(Plan::Pro).await.unwrap();
    let (tx, mut rx) = mpsc::channel(1);
    tx.send(CheckoutEvent::Success).await.unwrap();

    let handle = await_checkout(&registry, adapter.clone(), &session, &mut rx)
        .await
        .unwrap()
        .expect("success starts tracking");
    assert_eq!(handle.snapshot().policy, registry.policies().get(PolicyKind::CheckoutSuccess));
    assert_eq!(handle.snapshot().natural_key.as_deref(), Some("checkout:cs_1"));

    let op = handle.wait().await;
    assert_eq!(op.status(), OperationStatus::Completed);
    assert_eq!(op.attempts(), 3);
    assert_eq!(op.result().unwrap()["subscription_plan"], "pro");
    assert!(!adapter.has_session("cs_1"));
    create.assert_async().await;
}

#[tokio::test]
async fn cancelled_checkout_starts_nothing() {
    let mut server = mockito::Server::new_async().await;
    mock_session(&mut server, "cs_2", "basic").await;
    let status = mock_status(&mut server, json!({}), Some(0)).await;

    let registry = registry();
    let adapter = adapter(&server);
    let session = adapter.create_session(Plan::Basic).await.unwrap();
    let (tx, mut rx) = mpsc::channel(1);
    tx.send(CheckoutEvent::Cancelled).await.unwrap();

    assert!(adapter.has_session("cs_2"));
    let handle = await_checkout(&registry, adapter.clone(), &session, &mut rx).await.unwrap();

    assert!(handle.is_none());
    assert!(!adapter.has_session("cs_2"));
    assert!(registry.is_empty().await);
    status.assert_async().await;
}

#[tokio::test]
async fn closed_window_times_out_after_its_attempts() {
    let mut server = mockito::Server::new_async().await;
    mock_session(&mut server, "cs_3", "plus").await;
    let status = mock_status(
        &mut server,
        json!({"subscription_plan": null, "subscription_status": "inactive"}),
        None,
    )
    .await;

    let registry = registry();
    let adapter = adapter(&server);
    let session = adapter.create_session(Plan::Plus).await.unwrap();
    let (tx, mut rx) = mpsc::channel::<CheckoutEvent>(1);
    drop(tx);

    let handle = await_checkout(&registry, adapter.clone(), &session, &mut rx)
        .await
        .unwrap()
        .expect("a closed window still refreshes");
    assert_eq!(handle.snapshot().policy, registry.policies().get(PolicyKind::CheckoutClosed));

    let op = handle.wait().await;
    assert_eq!(op.status(), OperationStatus::TimedOut);
    // Five budgeted checks plus the final reconciliation check.
    assert_eq!(op.attempts(), 6);
    assert!(!adapter.has_session("cs_3"));
    assert!(status.matched_async().await);
}
