//! Realtime subscription tests against the in-process fake BaaS.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, message, FakeBaas};
use parking_lot::Mutex;
use roost_client::{BaasClient, ClientConfig, RealtimeMessage, SubscribeOptions};
use roost_engine::ChangeEvent;

fn client(base_url: &str) -> BaasClient {
    BaasClient::new(
        ClientConfig::new(base_url)
            .with_reconnect_delay(Duration::from_millis(20), Duration::from_millis(100)),
    )
    .unwrap()
}

async fn next(subscription: &mut roost_client::Subscription) -> RealtimeMessage {
    tokio::time::timeout(Duration::from_secs(5), subscription.next())
        .await
        .expect("timed out waiting for a message")
        .expect("subscription closed")
}

#[tokio::test]
async fn subscription_receives_changes_in_order() {
    let (baas, base_url) = FakeBaas::spawn().await;
    let client = client(&base_url);

    let mut subscription = client
        .realtime()
        .subscribe("messages", "*", SubscribeOptions::new())
        .await
        .unwrap();
    assert_eq!(subscription.topic(), "messages/*");

    baas.create("messages", message("a", "hi"));
    baas.update("messages", message("a", "hi!"));
    baas.delete("messages", "a");

    match next(&mut subscription).await {
        RealtimeMessage::Change(ChangeEvent::Created(record)) => {
            assert_eq!(record.id, "a");
            assert_eq!(record.str_field("body"), Some("hi"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        next(&mut subscription).await,
        RealtimeMessage::Change(ChangeEvent::Updated(_))
    ));
    assert_eq!(
        next(&mut subscription).await,
        RealtimeMessage::Change(ChangeEvent::deleted("a"))
    );
}

#[tokio::test]
async fn subscriptions_share_one_connection() {
    let (baas, base_url) = FakeBaas::spawn().await;
    let client = client(&base_url);
    let realtime = client.realtime();

    let mut messages = realtime
        .subscribe("messages", "*", SubscribeOptions::new())
        .await
        .unwrap();
    let mut properties = realtime
        .subscribe("properties", "*", SubscribeOptions::new())
        .await
        .unwrap();

    assert_eq!(baas.connections(), 1);
    assert_eq!(baas.topics(), ["messages/*", "properties/*"]);
    assert_eq!(realtime.subscription_count(), 2);

    baas.create("properties", serde_json::json!({"id": "p1", "title": "Loft"}));
    match next(&mut properties).await {
        RealtimeMessage::Change(event) => assert_eq!(event.record_id(), "p1"),
        other => panic!("unexpected {:?}", other),
    }
    assert!(messages.try_next().is_none());

    messages.unsubscribe();
    messages.unsubscribe();
    assert!(!messages.is_active());
    assert!(messages.next().await.is_none());
    eventually(|| baas.topics() == ["properties/*"]).await;
}

#[tokio::test]
async fn handler_not_called_after_unsubscribe() {
    let (baas, base_url) = FakeBaas::spawn().await;
    let client = client(&base_url);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let mut handle = client
        .realtime()
        .subscribe_with("messages", "*", SubscribeOptions::new(), move |msg| {
            if let RealtimeMessage::Change(event) = msg {
                sink.lock().push(event.record_id().to_string());
            }
        })
        .await
        .unwrap();
    assert!(handle.is_active());

    baas.create("messages", message("x", "first"));
    eventually(|| seen.lock().len() == 1).await;

    handle.unsubscribe();
    assert!(!handle.is_active());

    baas.create("messages", message("y", "second"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*seen.lock(), vec!["x".to_string()]);
    eventually(|| client.realtime().subscription_count() == 0).await;
}

#[tokio::test]
async fn reconnect_sends_resync() {
    let (baas, base_url) = FakeBaas::spawn().await;
    let client = client(&base_url);

    let mut subscription = client
        .realtime()
        .subscribe("messages", "*", SubscribeOptions::new())
        .await
        .unwrap();

    baas.kick();
    assert_eq!(next(&mut subscription).await, RealtimeMessage::Resync);
    assert_eq!(baas.connections(), 2);
    assert_eq!(baas.topics(), ["messages/*"]);

    baas.create("messages", message("a", "back"));
    match next(&mut subscription).await {
        RealtimeMessage::Change(event) => assert_eq!(event.record_id(), "a"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn options_are_part_of_the_topic() {
    let (baas, base_url) = FakeBaas::spawn().await;
    let client = client(&base_url);

    let options = SubscribeOptions::new()
        .filter(r#"status = "unread""#)
        .expand("sender");
    let mut subscription = client
        .realtime()
        .subscribe("messages", "*", options)
        .await
        .unwrap();

    assert_eq!(baas.topics(), [subscription.topic()]);
    assert!(subscription.topic().starts_with("messages/*?options="));

    baas.create("messages", message("a", "hi"));
    assert!(matches!(
        next(&mut subscription).await,
        RealtimeMessage::Change(ChangeEvent::Created(_))
    ));
}
