use super::{command_handler, reject_command, COMMAND_CHANNEL_CAPACITY};
use crate::entity::{
    decode_bool, DiscoveryKey, Entity, EntityContext, EntityCore, HaType, SET_SUFFIX,
};
use crate::mqtt::IncomingMessage;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tracing::debug;

const PAYLOAD_LOCK: &str = "lock";
const PAYLOAD_UNLOCK: &str = "unlock";
const STATE_LOCKED: &str = "locked";
const STATE_UNLOCKED: &str = "unlocked";

/// Locked/unlocked state; commands are requests, like [`super::Switch`]
pub struct Lock {
    core: EntityCore,
    locked: Mutex<bool>,
    requests: broadcast::Sender<bool>,
    this: Weak<Lock>,
}

impl Lock {
    pub fn new(ctx: &EntityContext, id: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        let (requests, _) = broadcast::channel(COMMAND_CHANNEL_CAPACITY);
        let lock = Arc::new_cyclic(|this| Self {
            core: EntityCore::new(ctx, Some(HaType::Lock), id, name),
            locked: Mutex::new(false),
            requests,
            this: this.clone(),
        });
        ctx.attach(&lock);
        lock
    }

    pub fn is_locked(&self) -> bool {
        *self.locked.lock().unwrap()
    }

    pub fn set_state(&self, locked: bool) {
        *self.locked.lock().unwrap() = locked;
        self.publish_state();
    }

    /// Requests received on `{base}/set`; `true` asks to lock
    pub fn subscribe_requests(&self) -> broadcast::Receiver<bool> {
        self.requests.subscribe()
    }

    fn publish_state(&self) {
        let payload = if self.is_locked() {
            STATE_LOCKED
        } else {
            STATE_UNLOCKED
        };
        self.core.publish_state(payload, true);
    }

    fn handle_command(&self, message: &IncomingMessage) {
        match decode_bool(&message.payload, PAYLOAD_LOCK, PAYLOAD_UNLOCK) {
            Ok(lock) => {
                debug!(entity_id = %self.core.id(), lock, "Lock state change requested");
                let _ = self.requests.send(lock);
            }
            Err(e) => reject_command(&self.core, message, &e),
        }
    }
}

impl Entity for Lock {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn init(&self) {
        let core = &self.core;
        core.set_discovery_config(DiscoveryKey::StateTopic, core.base_topic());
        core.set_discovery_config(DiscoveryKey::CommandTopic, core.topic(SET_SUFFIX));
        core.set_discovery_config(DiscoveryKey::PayloadLock, PAYLOAD_LOCK);
        core.set_discovery_config(DiscoveryKey::PayloadUnlock, PAYLOAD_UNLOCK);
        core.set_discovery_config(DiscoveryKey::StateLocked, STATE_LOCKED);
        core.set_discovery_config(DiscoveryKey::StateUnlocked, STATE_UNLOCKED);
        super::announce(core);
        self.publish_state();

        core.subscribe_command(SET_SUFFIX, command_handler(&self.this, Lock::handle_command));
    }
}
