use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn connected_transport() -> (Transport, Arc<MemoryOutbound>) {
    let outbound = Arc::new(MemoryOutbound::new());
    let transport = Transport::new(outbound.clone());
    transport.set_state(ConnectionState::Connected);
    (transport, outbound)
}

fn counting_handler(counter: &Arc<AtomicUsize>) -> MessageHandler {
    let counter = Arc::clone(counter);
    Arc::new(move |_msg: &IncomingMessage| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_initial_state_is_disconnected() {
    let transport = Transport::new(Arc::new(MemoryOutbound::new()));
    assert_eq!(transport.state(), ConnectionState::Disconnected { error: None });
    assert!(!transport.is_connected());
}

#[test]
fn test_publish_dropped_while_disconnected() {
    let outbound = Arc::new(MemoryOutbound::new());
    let transport = Transport::new(outbound.clone());

    transport.publish("desktop/volume", "55", true);
    assert!(outbound.records().is_empty());

    transport.set_state(ConnectionState::Connected);
    transport.publish("desktop/volume", "55", true);
    assert_eq!(
        outbound.published(),
        vec![("desktop/volume".to_string(), "55".to_string(), true)]
    );
}

#[test]
fn test_state_watchers_only_see_changes() {
    let transport = Transport::new(Arc::new(MemoryOutbound::new()));
    let mut rx = transport.watch_state();

    transport.set_state(ConnectionState::Disconnected { error: None });
    assert!(!rx.has_changed().unwrap());

    transport.set_state(ConnectionState::Connecting);
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), ConnectionState::Connecting);

    transport.set_state(ConnectionState::Connecting);
    assert!(!rx.has_changed().unwrap());
}

#[test]
fn test_subscribe_sends_broker_subscription_only_when_connected() {
    let outbound = Arc::new(MemoryOutbound::new());
    let transport = Transport::new(outbound.clone());
    let counter = Arc::new(AtomicUsize::new(0));

    let _offline = transport.subscribe("desktop/a/set", counting_handler(&counter));
    assert!(outbound.records().is_empty());

    transport.set_state(ConnectionState::Connected);
    let _online = transport.subscribe("desktop/b/set", counting_handler(&counter));
    assert_eq!(
        outbound.records(),
        vec![OutboundRecord::Subscribe("desktop/b/set".to_string())]
    );
}

#[test]
fn test_dispatch_routes_by_filter() {
    let (transport, _outbound) = connected_transport();
    let exact = Arc::new(AtomicUsize::new(0));
    let wildcard = Arc::new(AtomicUsize::new(0));
    let other = Arc::new(AtomicUsize::new(0));

    let _s1 = transport.subscribe("desktop/volume/set", counting_handler(&exact));
    let _s2 = transport.subscribe("desktop/+/set", counting_handler(&wildcard));
    let _s3 = transport.subscribe("laptop/#", counting_handler(&other));

    let delivered = transport.dispatch(&IncomingMessage::new("desktop/volume/set", "55"));

    assert_eq!(delivered, 2);
    assert_eq!(exact.load(Ordering::SeqCst), 1);
    assert_eq!(wildcard.load(Ordering::SeqCst), 1);
    assert_eq!(other.load(Ordering::SeqCst), 0);
}

#[test]
fn test_overlapping_subscriptions_are_independent() {
    let (transport, outbound) = connected_transport();
    let counter = Arc::new(AtomicUsize::new(0));

    let first = transport.subscribe("desktop/x/set", counting_handler(&counter));
    let second = transport.subscribe("desktop/x/set", counting_handler(&counter));
    assert_eq!(transport.route_count(), 2);

    transport.dispatch(&IncomingMessage::new("desktop/x/set", "1"));
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    // Filter still in use: no broker unsubscribe yet
    drop(first);
    assert!(!outbound
        .records()
        .contains(&OutboundRecord::Unsubscribe("desktop/x/set".to_string())));

    transport.dispatch(&IncomingMessage::new("desktop/x/set", "1"));
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    drop(second);
    assert_eq!(transport.route_count(), 0);
    assert!(outbound
        .records()
        .contains(&OutboundRecord::Unsubscribe("desktop/x/set".to_string())));
}

#[test]
fn test_dropped_route_no_longer_receives() {
    let (transport, _outbound) = connected_transport();
    let counter = Arc::new(AtomicUsize::new(0));

    let subscription = transport.subscribe("desktop/button/set", counting_handler(&counter));
    assert_eq!(subscription.filter(), "desktop/button/set");
    drop(subscription);

    assert_eq!(
        transport.dispatch(&IncomingMessage::new("desktop/button/set", "PRESS")),
        0
    );
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn test_request_reconnect_only_when_disconnected() {
    let transport = Transport::new(Arc::new(MemoryOutbound::new()));
    assert!(transport.request_reconnect());

    transport.set_state(ConnectionState::Connected);
    assert!(!transport.request_reconnect());

    transport.set_state(ConnectionState::Disconnected {
        error: Some("connection reset".to_string()),
    });
    assert!(transport.request_reconnect());
}

#[tokio::test]
async fn test_reconnect_request_wakes_waiter() {
    let transport = Transport::new(Arc::new(MemoryOutbound::new()));
    transport.request_reconnect();

    tokio::time::timeout(
        std::time::Duration::from_secs(1),
        transport.reconnect_requested(),
    )
    .await
    .expect("reconnect permit should be stored");
}

#[test]
fn test_payload_str_is_lossy() {
    let message = IncomingMessage::new("t", vec![b'o', b'k', 0xff]);
    assert_eq!(message.payload_str(), "ok\u{fffd}");
}

#[test]
fn test_state_display() {
    assert_eq!(ConnectionState::Connected.to_string(), "connected");
    assert_eq!(
        ConnectionState::Disconnected {
            error: Some("refused".to_string())
        }
        .to_string(),
        "disconnected (refused)"
    );
}

#[test]
fn test_connection_count_tracks_each_connect() {
    let transport = Transport::new(Arc::new(MemoryOutbound::new()));
    assert_eq!(transport.connection_count(), 0);

    transport.set_state(ConnectionState::Connected);
    transport.set_state(ConnectionState::Connected);
    assert_eq!(transport.connection_count(), 1);

    transport.set_state(ConnectionState::Disconnected { error: None });
    transport.set_state(ConnectionState::Connecting);
    transport.set_state(ConnectionState::Connected);
    assert_eq!(transport.connection_count(), 2);
}
