use super::{command_handler, reject_command, COMMAND_CHANNEL_CAPACITY};
use crate::entity::{
    decode_bool, DiscoveryKey, Entity, EntityContext, EntityCore, HaType, SET_SUFFIX,
};
use crate::mqtt::IncomingMessage;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tracing::debug;

const PAYLOAD_ON: &str = "true";
const PAYLOAD_OFF: &str = "false";

/// Boolean state that Home Assistant can ask to change.
///
/// A command does not change the state by itself: it is emitted on
/// [`Switch::subscribe_requests`] and the owner confirms with
/// [`Switch::set_state`].
pub struct Switch {
    core: EntityCore,
    state: Mutex<bool>,
    requests: broadcast::Sender<bool>,
    this: Weak<Switch>,
}

impl Switch {
    pub fn new(ctx: &EntityContext, id: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        let (requests, _) = broadcast::channel(COMMAND_CHANNEL_CAPACITY);
        let switch = Arc::new_cyclic(|this| Self {
            core: EntityCore::new(ctx, Some(HaType::Switch), id, name),
            state: Mutex::new(false),
            requests,
            this: this.clone(),
        });
        ctx.attach(&switch);
        switch
    }

    pub fn state(&self) -> bool {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, on: bool) {
        *self.state.lock().unwrap() = on;
        self.publish_state();
    }

    /// State change requests received on `{base}/set`
    pub fn subscribe_requests(&self) -> broadcast::Receiver<bool> {
        self.requests.subscribe()
    }

    fn publish_state(&self) {
        let payload = if self.state() { PAYLOAD_ON } else { PAYLOAD_OFF };
        self.core.publish_state(payload, true);
    }

    fn handle_command(&self, message: &IncomingMessage) {
        match decode_bool(&message.payload, PAYLOAD_ON, PAYLOAD_OFF) {
            Ok(on) => {
                debug!(entity_id = %self.core.id(), on, "Switch state change requested");
                let _ = self.requests.send(on);
            }
            Err(e) => reject_command(&self.core, message, &e),
        }
    }
}

impl Entity for Switch {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn init(&self) {
        let core = &self.core;
        core.set_discovery_config(DiscoveryKey::StateTopic, core.base_topic());
        core.set_discovery_config(DiscoveryKey::CommandTopic, core.topic(SET_SUFFIX));
        core.set_discovery_config(DiscoveryKey::PayloadOn, PAYLOAD_ON);
        core.set_discovery_config(DiscoveryKey::PayloadOff, PAYLOAD_OFF);
        super::announce(core);
        self.publish_state();

        core.subscribe_command(
            SET_SUFFIX,
            command_handler(&self.this, Switch::handle_command),
        );
    }
}
