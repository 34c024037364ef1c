use super::transport::{ConnectionState, IncomingMessage, Outbound, Transport};
use crate::config::MqttConfig;
use crate::host::{HostIdentity, PAYLOAD_NOT_AVAILABLE};
use anyhow::{anyhow, Result};
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

/// Capacity of the rumqttc channel between the forwarding task and the event loop
const REQUEST_CAPACITY: usize = 64;

/// Upper bound for flushing the offline message on shutdown
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Broker keep-alive floor accepted by rumqttc
const MIN_KEEP_ALIVE_SECONDS: u64 = 5;

/// Request handed from the transport to the forwarding task
#[derive(Debug)]
enum Request {
    Publish {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    Subscribe(String),
    Unsubscribe(String),
    Disconnect,
}

/// Unbounded queue in front of the rumqttc request channel.
///
/// Entity init runs synchronously and can enqueue far more requests than the
/// event loop's channel holds, so requests wait here instead of being dropped.
struct RequestQueue {
    requests: mpsc::UnboundedSender<Request>,
}

impl RequestQueue {
    fn push(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| anyhow!("MQTT driver is not running"))
    }
}

impl Outbound for RequestQueue {
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        self.push(Request::Publish {
            topic: topic.to_string(),
            payload,
            retain,
        })
    }

    fn subscribe(&self, filter: &str) -> Result<()> {
        self.push(Request::Subscribe(filter.to_string()))
    }

    fn unsubscribe(&self, filter: &str) -> Result<()> {
        self.push(Request::Unsubscribe(filter.to_string()))
    }

    fn disconnect(&self) -> Result<()> {
        self.push(Request::Disconnect)
    }
}

/// Feed queued requests to the client, waiting whenever its channel is full
async fn forward_requests(client: AsyncClient, mut requests: mpsc::UnboundedReceiver<Request>) {
    while let Some(request) = requests.recv().await {
        let result = match request {
            Request::Publish {
                topic,
                payload,
                retain,
            } => client.publish(topic, QoS::AtMostOnce, retain, payload).await,
            Request::Subscribe(filter) => client.subscribe(filter, QoS::AtMostOnce).await,
            Request::Unsubscribe(filter) => client.unsubscribe(filter).await,
            Request::Disconnect => client.disconnect().await,
        };

        if let Err(e) = result {
            warn!(error = %e, "MQTT client rejected request");
        }
    }
}

/// Stops a running `MqttDriver`
#[derive(Clone)]
pub struct ShutdownHandle(Arc<Notify>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.notify_one();
    }
}

/// Owns the rumqttc event loop and drives the shared `Transport`'s state
pub struct MqttDriver {
    eventloop: EventLoop,
    /// Taken by `run` to start the forwarding task
    queue: Option<(AsyncClient, mpsc::UnboundedReceiver<Request>)>,
    transport: Transport,
    availability_topic: String,
    auto_reconnect: bool,
    reconnect_delay: Duration,
    shutdown: Arc<Notify>,
}

impl MqttDriver {
    /// Create the broker client and its driver.
    ///
    /// No network activity happens until `run` is polled.
    pub fn connect(config: &MqttConfig, host: &HostIdentity) -> (Transport, Self) {
        let client_id = match &config.client_id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => generate_client_id(host),
        };

        info!(
            host = %config.host,
            port = config.port,
            client_id = %client_id,
            auto_reconnect = config.auto_reconnect,
            "Configuring MQTT connection"
        );

        let options = build_options(config, host, &client_id);
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (requests, queued) = mpsc::unbounded_channel();
        let transport = Transport::new(Arc::new(RequestQueue { requests }));

        let driver = Self {
            eventloop,
            queue: Some((client, queued)),
            transport: transport.clone(),
            availability_topic: host.availability_topic(),
            auto_reconnect: config.auto_reconnect,
            reconnect_delay: Duration::from_secs(config.reconnect_delay_seconds),
            shutdown: Arc::new(Notify::new()),
        };

        (transport, driver)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Poll the connection until shutdown is requested
    pub async fn run(mut self) -> Result<()> {
        info!("Starting MQTT driver");
        self.transport.set_state(ConnectionState::Connecting);

        let forwarder = self
            .queue
            .take()
            .map(|(client, queued)| tokio::spawn(forward_requests(client, queued)));
        let shutdown = Arc::clone(&self.shutdown);

        loop {
            let event = tokio::select! {
                _ = shutdown.notified() => None,
                event = self.eventloop.poll() => Some(event),
            };

            let event = match event {
                Some(event) => event,
                None => {
                    self.shutdown_gracefully().await;
                    break;
                }
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.transport.set_state(ConnectionState::Connected);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = IncomingMessage::new(publish.topic, publish.payload.to_vec());
                    self.transport.dispatch(&message);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    self.transport.set_state(ConnectionState::Disconnected {
                        error: Some("broker closed the connection".to_string()),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    self.transport.set_state(ConnectionState::Disconnected {
                        error: Some(e.to_string()),
                    });

                    if !self.wait_for_reconnect().await {
                        self.transport
                            .set_state(ConnectionState::Disconnected { error: None });
                        break;
                    }

                    self.transport.set_state(ConnectionState::Connecting);
                }
            }
        }

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }

        info!("MQTT driver stopped");
        Ok(())
    }

    /// Returns false when shutdown was requested while waiting
    async fn wait_for_reconnect(&mut self) -> bool {
        if self.auto_reconnect {
            debug!(
                delay_seconds = self.reconnect_delay.as_secs(),
                "Reconnecting after delay"
            );
            tokio::select! {
                _ = self.shutdown.notified() => false,
                _ = tokio::time::sleep(self.reconnect_delay) => true,
            }
        } else {
            info!("Automatic reconnect disabled, waiting for a reconnect request");
            tokio::select! {
                _ = self.shutdown.notified() => false,
                _ = self.transport.reconnect_requested() => true,
            }
        }
    }

    /// Announce the host offline, then close the connection
    async fn shutdown_gracefully(&mut self) {
        info!("Shutting down MQTT connection");

        if self.transport.is_connected() {
            self.transport
                .publish(&self.availability_topic, PAYLOAD_NOT_AVAILABLE, true);
            self.transport.disconnect();

            let eventloop = &mut self.eventloop;
            let drain = async move {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            };

            if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, drain).await.is_err() {
                warn!("Timed out flushing MQTT disconnect");
            }
        }

        self.transport
            .set_state(ConnectionState::Disconnected { error: None });
    }
}

fn generate_client_id(host: &HostIdentity) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("hass_bridge_{}_{}", host.hostname(), &suffix[..8])
}

fn build_options(config: &MqttConfig, host: &HostIdentity, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, config.host.as_str(), config.port);
    options.set_keep_alive(Duration::from_secs(
        config.keep_alive_seconds.max(MIN_KEEP_ALIVE_SECONDS),
    ));
    options.set_clean_session(true);

    if let Some(username) = &config.username {
        options.set_credentials(username.as_str(), config.password.clone().unwrap_or_default());
    }

    // Retained so it replaces the retained "on" of the availability entity
    options.set_last_will(LastWill::new(
        host.availability_topic(),
        PAYLOAD_NOT_AVAILABLE,
        QoS::AtMostOnce,
        true,
    ));

    options
}
