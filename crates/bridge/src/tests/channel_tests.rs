use super::*;
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn delivers_messages_in_publish_order() {
    let bus = LocalEventBus::new();
    let mut subscription = bus.subscribe("operation_sideload").await.expect("subscribe");

    for n in 0..5 {
        bus.publish("operation_sideload", json!(n))
            .await
            .expect("publish");
    }

    for n in 0..5 {
        assert_eq!(subscription.next().await, Some(json!(n)));
    }
}

#[tokio::test]
async fn publish_reaches_every_current_subscriber() {
    let bus = LocalEventBus::new();
    let mut first = bus.subscribe("build-output").await.expect("first");
    let mut second = bus.subscribe("build-output").await.expect("second");

    let delivered = bus
        .publish("build-output", json!("Logging in..."))
        .await
        .expect("publish");

    assert_eq!(delivered, 2);
    assert_eq!(first.recv().await, Some(json!("Logging in...")));
    assert_eq!(second.recv().await, Some(json!("Logging in...")));
}

#[tokio::test]
async fn unsubscribe_detaches_listener() {
    let bus = LocalEventBus::new();
    let subscription = bus.subscribe("2fa-required").await.expect("subscribe");
    assert_eq!(bus.subscriber_count("2fa-required"), 1);

    subscription.unsubscribe();

    assert_eq!(bus.subscriber_count("2fa-required"), 0);
    let delivered = bus
        .publish("2fa-required", Value::Null)
        .await
        .expect("publish");
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn dropping_subscription_releases_listener() {
    let bus = LocalEventBus::new();
    {
        let _subscription = bus.subscribe("operation_install_sidestore").await.expect("subscribe");
        assert_eq!(bus.subscriber_count("operation_install_sidestore"), 1);
    }
    assert_eq!(bus.subscriber_count("operation_install_sidestore"), 0);
}

#[tokio::test]
async fn releasing_one_listener_keeps_the_others() {
    let bus = LocalEventBus::new();
    let first = bus.subscribe("build-output").await.expect("first");
    let mut second = bus.subscribe("build-output").await.expect("second");

    first.unsubscribe();
    bus.publish("build-output", json!("still here"))
        .await
        .expect("publish");

    assert_eq!(bus.subscriber_count("build-output"), 1);
    assert_eq!(second.recv().await, Some(json!("still here")));
}

#[tokio::test]
async fn channels_do_not_interfere() {
    let bus = LocalEventBus::new();
    let mut sideload = bus.subscribe("operation_sideload").await.expect("sideload");
    let mut install = bus
        .subscribe("operation_install_sidestore")
        .await
        .expect("install");

    bus.publish("operation_install_sidestore", json!("install-only"))
        .await
        .expect("publish");

    assert_eq!(install.recv().await, Some(json!("install-only")));
    let nothing = tokio::time::timeout(Duration::from_millis(20), sideload.recv()).await;
    assert!(nothing.is_err(), "sideload channel must stay silent");
}

#[tokio::test]
async fn rejects_invalid_channel_names() {
    let bus = LocalEventBus::new();

    let err = bus
        .subscribe("operation_side load")
        .await
        .expect_err("space is not allowed");
    assert!(matches!(err, ChannelError::InvalidName(name) if name == "operation_side load"));

    let err = bus.publish("", Value::Null).await.expect_err("empty name");
    assert!(matches!(err, ChannelError::InvalidName(_)));
}

#[tokio::test]
async fn closed_bus_ends_streams_and_refuses_traffic() {
    let bus = LocalEventBus::new();
    let mut subscription = bus.subscribe("2fa-recieved").await.expect("subscribe");

    bus.close();

    assert!(bus.is_closed());
    assert_eq!(subscription.recv().await, None);
    assert!(matches!(
        bus.subscribe("2fa-recieved").await,
        Err(ChannelError::Closed)
    ));
    assert!(matches!(
        bus.publish("2fa-recieved", json!("123456")).await,
        Err(ChannelError::Closed)
    ));
}

#[tokio::test]
async fn publish_serialized_encodes_payload() {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Update<'a> {
        update_type: &'a str,
        step_id: &'a str,
    }

    let bus = LocalEventBus::new();
    let mut subscription = bus.subscribe("operation_sideload").await.expect("subscribe");

    publish_serialized(
        &bus,
        "operation_sideload",
        &Update {
            update_type: "started",
            step_id: "install",
        },
    )
    .await
    .expect("publish");

    assert_eq!(
        subscription.recv().await,
        Some(json!({"updateType": "started", "stepId": "install"}))
    );
}

#[test]
fn channel_name_validation_accepts_backend_names() {
    for name in ["2fa-required", "2fa-recieved", "build-output", "operation_sideload", "a/b:c"] {
        validate_channel_name(name).expect(name);
    }
}
