use anyhow::Result;
use dashmap::DashMap;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// Connection state of the single broker connection
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected {
        /// Cause of the failed or lost connection, if any
        error: Option<String>,
    },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected { error: None } => write!(f, "disconnected"),
            ConnectionState::Disconnected { error: Some(e) } => {
                write!(f, "disconnected ({})", e)
            }
        }
    }
}

/// Message received on a subscribed topic
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl IncomingMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Callback invoked for every message matching a subscription's filter
pub type MessageHandler = Arc<dyn Fn(&IncomingMessage) + Send + Sync>;

/// Outgoing side of the broker client.
///
/// Calls must not block: they enqueue a request and return.
pub trait Outbound: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()>;
    fn subscribe(&self, filter: &str) -> Result<()>;
    fn unsubscribe(&self, filter: &str) -> Result<()>;
    fn disconnect(&self) -> Result<()>;
}

struct Route {
    filter: String,
    handler: MessageHandler,
}

struct TransportInner {
    outbound: Arc<dyn Outbound>,
    state_tx: watch::Sender<ConnectionState>,
    routes: DashMap<u64, Route>,
    next_route_id: AtomicU64,
    /// Number of transitions into `Connected`
    connections: AtomicU64,
    reconnect: Notify,
}

/// Shared handle to the process-wide broker connection.
///
/// Publishing and subscribing are fire-and-forget. While the connection is
/// not `Connected`, publishes are dropped and no broker subscription is sent.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

impl Transport {
    pub fn new(outbound: Arc<dyn Outbound>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected { error: None });

        Self {
            inner: Arc::new(TransportInner {
                outbound,
                state_tx,
                routes: DashMap::new(),
                next_route_id: AtomicU64::new(1),
                connections: AtomicU64::new(0),
                reconnect: Notify::new(),
            }),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state_tx.borrow().is_connected()
    }

    /// How many times the connection has been established.
    ///
    /// Lets watchers notice a reconnect even when intermediate states were
    /// coalesced by the watch channel.
    pub fn connection_count(&self) -> u64 {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Observe connection state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Record a connection state transition.
    ///
    /// Watchers are only notified when the state actually changes.
    pub fn set_state(&self, state: ConnectionState) {
        let changed = self.inner.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                if state.is_connected() {
                    self.inner.connections.fetch_add(1, Ordering::SeqCst);
                }
                *current = state.clone();
                true
            }
        });

        if changed {
            match &state {
                ConnectionState::Disconnected { error: Some(e) } => {
                    warn!(error = %e, "MQTT connection state: disconnected")
                }
                other => info!(state = %other, "MQTT connection state changed"),
            }
        }
    }

    /// Ask the driver to reconnect after a lost connection.
    ///
    /// Returns false when the connection is not currently down.
    pub fn request_reconnect(&self) -> bool {
        if !matches!(self.state(), ConnectionState::Disconnected { .. }) {
            debug!("Reconnect requested while not disconnected, ignoring");
            return false;
        }

        info!("Manual reconnect requested");
        self.inner.reconnect.notify_one();
        true
    }

    pub(crate) async fn reconnect_requested(&self) {
        self.inner.reconnect.notified().await;
    }

    /// Publish at QoS 0; dropped when not connected
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>, retain: bool) {
        if !self.is_connected() {
            debug!(topic = %topic, "Not connected, dropping publish");
            return;
        }

        if let Err(e) = self.inner.outbound.publish(topic, payload.into(), retain) {
            warn!(topic = %topic, error = %e, "Failed to publish");
        }
    }

    /// Register a handler for a topic filter.
    ///
    /// Every call creates an independent route, even for a filter that is
    /// already subscribed. The route lives until the returned `Subscription`
    /// is dropped.
    pub fn subscribe(&self, filter: &str, handler: MessageHandler) -> Subscription {
        let id = self.inner.next_route_id.fetch_add(1, Ordering::Relaxed);
        self.inner.routes.insert(
            id,
            Route {
                filter: filter.to_string(),
                handler,
            },
        );

        if self.is_connected() {
            if let Err(e) = self.inner.outbound.subscribe(filter) {
                warn!(filter = %filter, error = %e, "Failed to subscribe");
            }
        } else {
            debug!(filter = %filter, "Not connected, route registered without broker subscription");
        }

        Subscription {
            id,
            filter: filter.to_string(),
            transport: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an incoming message to every matching route.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, message: &IncomingMessage) -> usize {
        // Handlers run outside the map guards so they may subscribe or drop routes
        let handlers: Vec<MessageHandler> = self
            .inner
            .routes
            .iter()
            .filter(|route| rumqttc::mqttbytes::matches(&message.topic, &route.filter))
            .map(|route| Arc::clone(&route.handler))
            .collect();

        if handlers.is_empty() {
            debug!(topic = %message.topic, "No route for incoming message");
        }

        for handler in &handlers {
            handler(message);
        }

        handlers.len()
    }

    /// Number of live routes
    pub fn route_count(&self) -> usize {
        self.inner.routes.len()
    }

    pub(crate) fn disconnect(&self) {
        if let Err(e) = self.inner.outbound.disconnect() {
            warn!(error = %e, "Failed to send disconnect");
        }
    }
}

impl TransportInner {
    fn remove_route(&self, id: u64, filter: &str) {
        self.routes.remove(&id);

        let still_used = self.routes.iter().any(|route| route.filter == filter);
        if still_used || !self.state_tx.borrow().is_connected() {
            return;
        }

        if let Err(e) = self.outbound.unsubscribe(filter) {
            warn!(filter = %filter, error = %e, "Failed to unsubscribe");
        }
    }
}

/// Handle to a registered route; dropping it removes the route.
pub struct Subscription {
    id: u64,
    filter: String,
    transport: Weak<TransportInner>,
}

impl Subscription {
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.transport.upgrade() {
            inner.remove_route(self.id, &self.filter);
        }
    }
}
