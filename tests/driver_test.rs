// Integration tests for the MQTT driver against a loopback broker
//
// The broker speaks just enough MQTT 3.1.1 for rumqttc: it acknowledges
// connects and subscriptions, answers pings and records every packet.

use hass_bridge::bridge::Bridge;
use hass_bridge::config::MqttConfig;
use hass_bridge::entity::variants::Switch;
use hass_bridge::host::HostIdentity;
use hass_bridge::mqtt::{ConnectionState, MqttDriver, Transport};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

// ── Loopback broker ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
enum Packet {
    Connect,
    Publish {
        topic: String,
        payload: String,
        retain: bool,
    },
    Subscribe(Vec<String>),
    Unsubscribe,
    Disconnect,
}

struct Broker {
    port: u16,
    packets: mpsc::UnboundedReceiver<Packet>,
    kick: Arc<Notify>,
}

impl Broker {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, packets) = mpsc::unbounded_channel();
        let kick = Arc::new(Notify::new());

        let kicked = Arc::clone(&kick);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                serve(stream, &tx, &kicked).await;
            }
        });

        Self {
            port,
            packets,
            kick,
        }
    }

    /// Drop the current client connection
    fn kick(&self) {
        self.kick.notify_one();
    }

    async fn next_packet(&mut self) -> Packet {
        timeout(WAIT, self.packets.recv())
            .await
            .expect("timed out waiting for a packet")
            .expect("broker stopped")
    }

    /// Packets received up to and including the first match
    async fn packets_until(&mut self, done: impl Fn(&Packet) -> bool) -> Vec<Packet> {
        let mut seen = Vec::new();
        loop {
            let packet = self.next_packet().await;
            let finished = done(&packet);
            seen.push(packet);
            if finished {
                return seen;
            }
        }
    }
}

async fn serve(mut stream: TcpStream, packets: &mpsc::UnboundedSender<Packet>, kick: &Notify) {
    loop {
        let packet = tokio::select! {
            _ = kick.notified() => return,
            packet = read_packet(&mut stream) => packet,
        };
        let Some((header, body)) = packet else {
            return;
        };

        let (reply, recorded) = match header >> 4 {
            1 => (vec![0x20, 0x02, 0x00, 0x00], Some(Packet::Connect)),
            3 => {
                let (topic, mut at) = read_str(&body, 0);
                if (header >> 1) & 0x03 > 0 {
                    at += 2;
                }
                let publish = Packet::Publish {
                    topic,
                    payload: String::from_utf8_lossy(&body[at..]).into_owned(),
                    retain: header & 0x01 == 0x01,
                };
                (Vec::new(), Some(publish))
            }
            8 => {
                let mut filters = Vec::new();
                let mut at = 2;
                while at < body.len() {
                    let (filter, next) = read_str(&body, at);
                    filters.push(filter);
                    at = next + 1;
                }
                let mut reply = vec![0x90, 2 + filters.len() as u8, body[0], body[1]];
                reply.extend(std::iter::repeat(0x00).take(filters.len()));
                (reply, Some(Packet::Subscribe(filters)))
            }
            10 => (vec![0xB0, 0x02, body[0], body[1]], Some(Packet::Unsubscribe)),
            12 => (vec![0xD0, 0x00], None),
            14 => {
                let _ = packets.send(Packet::Disconnect);
                return;
            }
            _ => (Vec::new(), None),
        };

        if !reply.is_empty() && stream.write_all(&reply).await.is_err() {
            return;
        }
        if let Some(packet) = recorded {
            let _ = packets.send(packet);
        }
    }
}

async fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let header = stream.read_u8().await.ok()?;

    let mut length = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await.ok()?;
        length |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let mut body = vec![0; length];
    stream.read_exact(&mut body).await.ok()?;
    Some((header, body))
}

/// Length-prefixed string at `at`, and the offset just past it
fn read_str(body: &[u8], at: usize) -> (String, usize) {
    let len = u16::from_be_bytes([body[at], body[at + 1]]) as usize;
    let start = at + 2;
    let text = String::from_utf8_lossy(&body[start..start + len]).into_owned();
    (text, start + len)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn config(port: u16, auto_reconnect: bool) -> MqttConfig {
    MqttConfig {
        host: "127.0.0.1".to_string(),
        port,
        client_id: Some("hass_bridge_test".to_string()),
        auto_reconnect,
        reconnect_delay_seconds: 0,
        ..MqttConfig::default()
    }
}

fn host() -> HostIdentity {
    HostIdentity::new("desktop", "homeassistant")
}

async fn wait_until(transport: &Transport, wanted: impl Fn(&ConnectionState) -> bool) {
    let mut state_rx = transport.watch_state();
    timeout(WAIT, state_rx.wait_for(|state| wanted(state)))
        .await
        .expect("timed out waiting for connection state")
        .expect("connection state channel closed");
}

fn lost(state: &ConnectionState) -> bool {
    matches!(state, ConnectionState::Disconnected { error: Some(_) })
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_initialises_more_entities_than_the_client_channel_holds() {
    let mut broker = Broker::start().await;
    let (transport, driver) = MqttDriver::connect(&config(broker.port, true), &host());

    let bridge = Arc::new(Bridge::new(host(), transport.clone()));
    let switches: Vec<Arc<Switch>> = (0..40)
        .map(|i| Switch::new(bridge.context(), format!("switch_{}", i), format!("Switch {}", i)))
        .collect();

    let runner = Arc::clone(&bridge);
    let lifecycle = tokio::spawn(async move { runner.run().await });
    let shutdown = driver.shutdown_handle();
    let driver = tokio::spawn(driver.run());

    let mut configs = BTreeSet::new();
    let mut filters = BTreeSet::new();
    while configs.len() < 41 || filters.len() < 40 {
        match broker.next_packet().await {
            Packet::Publish { topic, .. } if topic.ends_with("/config") => {
                configs.insert(topic);
            }
            Packet::Subscribe(subscribed) => filters.extend(subscribed),
            _ => {}
        }
    }

    assert!(configs.contains("homeassistant/binary_sensor/desktop/connected/config"));
    assert!(configs.contains("homeassistant/switch/desktop/switch_39/config"));
    assert!(filters.contains("desktop/switch_0/set"));

    shutdown.shutdown();
    driver.await.unwrap().unwrap();
    lifecycle.abort();
    assert_eq!(switches.len(), 40);
}

#[tokio::test]
async fn test_shutdown_publishes_retained_offline() {
    let mut broker = Broker::start().await;
    let (transport, driver) = MqttDriver::connect(&config(broker.port, true), &host());
    let shutdown = driver.shutdown_handle();
    let driver = tokio::spawn(driver.run());

    wait_until(&transport, ConnectionState::is_connected).await;
    assert_eq!(broker.next_packet().await, Packet::Connect);

    shutdown.shutdown();
    let packets = broker
        .packets_until(|packet| *packet == Packet::Disconnect)
        .await;
    assert_eq!(
        packets,
        vec![
            Packet::Publish {
                topic: "desktop/connected".to_string(),
                payload: "off".to_string(),
                retain: true,
            },
            Packet::Disconnect,
        ]
    );

    driver.await.unwrap().unwrap();
    assert_eq!(transport.state(), ConnectionState::Disconnected { error: None });
}

#[tokio::test]
async fn test_manual_reconnect_waits_for_request() {
    let mut broker = Broker::start().await;
    let (transport, driver) = MqttDriver::connect(&config(broker.port, false), &host());
    let shutdown = driver.shutdown_handle();
    let driver = tokio::spawn(driver.run());

    wait_until(&transport, ConnectionState::is_connected).await;
    assert_eq!(broker.next_packet().await, Packet::Connect);

    broker.kick();
    wait_until(&transport, lost).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(lost(&transport.state()));
    assert!(broker.packets.try_recv().is_err());
    assert_eq!(transport.connection_count(), 1);

    assert!(transport.request_reconnect());
    wait_until(&transport, ConnectionState::is_connected).await;
    assert_eq!(broker.next_packet().await, Packet::Connect);
    assert_eq!(transport.connection_count(), 2);

    shutdown.shutdown();
    driver.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_auto_reconnect_after_lost_connection() {
    let mut broker = Broker::start().await;
    let (transport, driver) = MqttDriver::connect(&config(broker.port, true), &host());
    let shutdown = driver.shutdown_handle();
    let driver = tokio::spawn(driver.run());

    wait_until(&transport, ConnectionState::is_connected).await;
    assert_eq!(broker.next_packet().await, Packet::Connect);

    broker.kick();
    assert_eq!(broker.next_packet().await, Packet::Connect);

    timeout(WAIT, async {
        while transport.connection_count() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for reconnect");
    assert!(transport.is_connected());

    shutdown.shutdown();
    driver.await.unwrap().unwrap();
}
