//! Entity framework: discoverable units of state and control.
//!
//! Every entity owns an [`EntityCore`] holding its identity, topic namespace,
//! discovery configuration and attributes. Concrete variants implement
//! [`Entity::init`], which runs on every transition of the transport into
//! `Connected` and must (re)declare discovery, (re)subscribe to command
//! topics and republish state.
//!
//! Entities are created through an [`EntityContext`] and shared as `Arc`s.
//! The [`EntityRegistry`] only keeps weak references, so an entity lives as
//! long as whoever constructed it.

mod attributes;
mod base;
mod command;
mod discovery;
mod registry;
pub mod variants;


pub use self::attributes::{attributes_to_json, AttributeValue, Attributes};
pub use self::base::EntityCore;
pub use self::command::{
    decode_bool, decode_decimal, decode_integer, decode_option, decode_text, CommandError,
};
pub use self::discovery::{DiscoveryConfig, DiscoveryKey, HaType, Registration};
pub use self::registry::EntityRegistry;

use crate::host::HostIdentity;
use crate::mqtt::Transport;
use serde_json::Value;
use std::sync::{Arc, Weak};

/// Topic suffix for `/set` style command topics
pub const SET_SUFFIX: &str = "set";

/// Behaviour shared by every entity variant
pub trait Entity: Send + Sync {
    fn core(&self) -> &EntityCore;

    /// Declare discovery, subscribe to commands and publish current state.
    ///
    /// Runs on every connect; must be safe to call repeatedly.
    fn init(&self) {}

    fn id(&self) -> String {
        self.core().id()
    }

    fn name(&self) -> String {
        self.core().name()
    }

    fn base_topic(&self) -> String {
        self.core().base_topic()
    }

    fn set_id(&self, id: &str) {
        self.core().set_id(id);
    }

    fn set_name(&self, name: &str) {
        self.core().set_name(name);
    }

    fn set_ha_type(&self, ha_type: HaType) {
        self.core().set_ha_type(ha_type);
    }

    fn set_ha_icon(&self, icon: &str) {
        self.core().set_ha_icon(icon);
    }

    fn set_discovery_config(&self, key: &str, value: Value) {
        self.core().set_discovery_config(key, value);
    }

    fn set_attributes(&self, attributes: Attributes) {
        self.core().set_attributes(attributes);
    }

    fn send_registration(&self) {
        self.core().send_registration();
    }
}

/// Everything an entity needs from the process: host identity, transport
/// and the lifecycle registry.
#[derive(Clone)]
pub struct EntityContext {
    host: Arc<HostIdentity>,
    transport: Transport,
    registry: Arc<EntityRegistry>,
}

impl EntityContext {
    pub fn new(host: HostIdentity, transport: Transport, registry: Arc<EntityRegistry>) -> Self {
        Self {
            host: Arc::new(host),
            transport,
            registry,
        }
    }

    pub fn host(&self) -> &HostIdentity {
        &self.host
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Hand a freshly built entity to the lifecycle registry
    pub fn attach<E: Entity + 'static>(&self, entity: &Arc<E>) {
        let weak: Weak<dyn Entity> = Arc::downgrade(entity) as Weak<dyn Entity>;
        self.registry.attach(weak);
    }
}
