use crate::entity::{DiscoveryKey, Entity, EntityContext, EntityCore, HaType};
use std::sync::{Arc, Mutex};

/// Read-only string state
pub struct Sensor {
    core: EntityCore,
    state: Mutex<Option<String>>,
}

impl Sensor {
    pub fn new(ctx: &EntityContext, id: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        let sensor = Arc::new(Self {
            core: EntityCore::new(ctx, Some(HaType::Sensor), id, name),
            state: Mutex::new(None),
        });
        ctx.attach(&sensor);
        sensor
    }

    pub fn state(&self) -> Option<String> {
        self.state.lock().unwrap().clone()
    }

    /// Store and publish a new value (retained)
    pub fn set_state(&self, value: impl Into<String>) {
        let value = value.into();
        *self.state.lock().unwrap() = Some(value.clone());
        self.core.publish_state(value, true);
    }
}

impl Entity for Sensor {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn init(&self) {
        self.core
            .set_discovery_config(DiscoveryKey::StateTopic, self.core.base_topic());
        super::announce(&self.core);

        if let Some(value) = self.state() {
            self.core.publish_state(value, true);
        }
    }
}
