use crate::entity::{DiscoveryKey, Entity, EntityContext, EntityCore, HaType};
use std::sync::{Arc, Mutex};

const PAYLOAD_ON: &str = "on";
const PAYLOAD_OFF: &str = "off";

/// Read-only on/off state
pub struct BinarySensor {
    core: EntityCore,
    state: Mutex<bool>,
}

impl BinarySensor {
    pub fn new(ctx: &EntityContext, id: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        let sensor = Arc::new(Self {
            core: EntityCore::new(ctx, Some(HaType::BinarySensor), id, name),
            state: Mutex::new(false),
        });
        ctx.attach(&sensor);
        sensor
    }

    pub fn state(&self) -> bool {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, on: bool) {
        *self.state.lock().unwrap() = on;
        self.publish_state();
    }

    fn publish_state(&self) {
        let payload = if self.state() { PAYLOAD_ON } else { PAYLOAD_OFF };
        self.core.publish_state(payload, true);
    }
}

impl Entity for BinarySensor {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn init(&self) {
        let core = &self.core;
        core.set_discovery_config(DiscoveryKey::StateTopic, core.base_topic());
        core.set_discovery_config(DiscoveryKey::PayloadOn, PAYLOAD_ON);
        core.set_discovery_config(DiscoveryKey::PayloadOff, PAYLOAD_OFF);
        super::announce(core);
        self.publish_state();
    }
}
