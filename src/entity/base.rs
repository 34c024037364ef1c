use super::attributes::{attributes_to_json, Attributes};
use super::discovery::{
    build_registration, DiscoveryConfig, DiscoveryKey, HaType, Registration, RegistrationInput,
};
use super::EntityContext;
use crate::host::{HostIdentity, AVAILABILITY_ID, PAYLOAD_AVAILABLE};
use crate::mqtt::{MessageHandler, Subscription, Transport};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

struct CoreState {
    id: String,
    name: String,
    ha_type: Option<HaType>,
    icon: Option<String>,
    discovery: DiscoveryConfig,
    attributes: Attributes,
}

/// Shared part of every entity: identity, topic namespace, discovery
/// registration, the attribute side channel and command subscriptions.
pub struct EntityCore {
    host: Arc<HostIdentity>,
    transport: Transport,
    state: Mutex<CoreState>,
    /// Command subscriptions keyed by topic suffix
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl EntityCore {
    pub fn new(
        context: &EntityContext,
        ha_type: Option<HaType>,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            host: Arc::clone(&context.host),
            transport: context.transport.clone(),
            state: Mutex::new(CoreState {
                id: id.into(),
                name: name.into(),
                ha_type,
                icon: None,
                discovery: DiscoveryConfig::new(),
                attributes: Attributes::new(),
            }),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> String {
        self.state.lock().unwrap().id.clone()
    }

    pub fn name(&self) -> String {
        self.state.lock().unwrap().name.clone()
    }

    pub fn ha_type(&self) -> Option<HaType> {
        self.state.lock().unwrap().ha_type
    }

    pub fn icon(&self) -> Option<String> {
        self.state.lock().unwrap().icon.clone()
    }

    pub fn set_id(&self, id: impl Into<String>) {
        self.state.lock().unwrap().id = id.into();
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.state.lock().unwrap().name = name.into();
    }

    pub fn set_ha_type(&self, ha_type: HaType) {
        self.state.lock().unwrap().ha_type = Some(ha_type);
    }

    pub fn set_ha_icon(&self, icon: impl Into<String>) {
        self.state.lock().unwrap().icon = Some(icon.into());
    }

    /// Insert or overwrite one discovery entry; applied at the next registration
    pub fn set_discovery_config(&self, key: impl Into<DiscoveryKey>, value: impl Into<Value>) {
        self.state.lock().unwrap().discovery.set(key, value);
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        self.state.lock().unwrap().discovery.clone()
    }

    pub fn host(&self) -> &HostIdentity {
        &self.host
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// `{hostname}/{id}`
    pub fn base_topic(&self) -> String {
        self.host.base_topic(&self.state.lock().unwrap().id)
    }

    /// `{hostname}/{id}/{suffix}`
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.base_topic(), suffix)
    }

    /// Discovery message for the current configuration, if a category is set
    pub fn registration(&self) -> Option<Registration> {
        let state = self.state.lock().unwrap();
        build_registration(
            &self.host,
            RegistrationInput {
                id: &state.id,
                name: &state.name,
                ha_type: state.ha_type,
                icon: state.icon.as_deref(),
                discovery: &state.discovery,
            },
        )
    }

    /// Publish the retained discovery message, then mark the host available.
    ///
    /// No-op when no discovery category is set.
    pub fn send_registration(&self) {
        let registration = match self.registration() {
            Some(registration) => registration,
            None => {
                debug!(entity_id = %self.id(), "No discovery category set, skipping registration");
                return;
            }
        };

        self.transport
            .publish(&registration.topic, registration.to_json(), true);

        if self.id() != AVAILABILITY_ID {
            self.transport
                .publish(&self.host.availability_topic(), PAYLOAD_AVAILABLE, false);
        }
    }

    /// Replace all attributes and publish them
    pub fn set_attributes(&self, attributes: Attributes) {
        self.state.lock().unwrap().attributes = attributes;
        self.publish_attributes();
    }

    pub fn attributes(&self) -> Attributes {
        self.state.lock().unwrap().attributes.clone()
    }

    /// Publish the stored attributes; dropped when not connected
    pub fn publish_attributes(&self) {
        if !self.is_connected() {
            return;
        }

        let payload = attributes_to_json(&self.state.lock().unwrap().attributes).to_string();
        self.transport
            .publish(&self.topic("attributes"), payload, true);
    }

    /// Publish a state payload on the base topic
    pub fn publish_state(&self, payload: impl Into<Vec<u8>>, retain: bool) {
        self.transport.publish(&self.base_topic(), payload, retain);
    }

    /// Subscribe `handler` to `{base}/{suffix}`.
    ///
    /// Replaces any earlier subscription for the same suffix, so calling this
    /// on every connect never stacks handlers.
    pub fn subscribe_command(&self, suffix: &str, handler: MessageHandler) {
        let subscription = self.transport.subscribe(&self.topic(suffix), handler);
        let previous = self
            .subscriptions
            .lock()
            .unwrap()
            .insert(suffix.to_string(), subscription);
        // Dropped after the new route exists, so the broker subscription is kept
        drop(previous);
    }
}
