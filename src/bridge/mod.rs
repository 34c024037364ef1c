//! Process-level wiring of the entity framework.
//!
//! A [`Bridge`] owns the entity context for one host and the host's own
//! availability entity. [`Bridge::run`] drives entity lifecycle from the
//! transport's connection state.


use crate::entity::variants::BinarySensor;
use crate::entity::{Entity, EntityContext, EntityRegistry};
use crate::host::{HostIdentity, AVAILABILITY_ID};
use crate::mqtt::Transport;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub struct Bridge {
    context: EntityContext,
    availability: Arc<BinarySensor>,
}

impl Bridge {
    pub fn new(host: HostIdentity, transport: Transport) -> Self {
        let registry = Arc::new(EntityRegistry::new());
        let context = EntityContext::new(host, transport, registry);

        // State topic of this entity is the availability topic itself
        let availability = BinarySensor::new(&context, AVAILABILITY_ID, "Connected");
        availability.set_discovery_config("device_class", json!("connectivity"));
        availability.set_state(true);

        info!(hostname = %context.host().hostname(), "Bridge created");

        Self {
            context,
            availability,
        }
    }

    /// Context for creating entities owned by integrations
    pub fn context(&self) -> &EntityContext {
        &self.context
    }

    pub fn transport(&self) -> &Transport {
        self.context.transport()
    }

    pub fn host(&self) -> &HostIdentity {
        self.context.host()
    }

    pub fn availability(&self) -> &Arc<BinarySensor> {
        &self.availability
    }

    /// Initialise every entity on each connect; runs until aborted
    pub async fn run(&self) {
        let registry = Arc::clone(self.context.registry());
        registry.run(self.context.transport().clone()).await;
    }
}
