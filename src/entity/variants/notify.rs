use super::{command_handler, reject_command, COMMAND_CHANNEL_CAPACITY};
use crate::entity::{decode_text, DiscoveryKey, Entity, EntityContext, EntityCore, HaType};
use crate::mqtt::IncomingMessage;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::debug;

const NOTIFICATIONS_SUFFIX: &str = "notifications";

/// Receives notification messages from Home Assistant on `{base}/notifications`
pub struct Notify {
    core: EntityCore,
    notifications: broadcast::Sender<String>,
    this: Weak<Notify>,
}

impl Notify {
    pub fn new(ctx: &EntityContext, id: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        let (notifications, _) = broadcast::channel(COMMAND_CHANNEL_CAPACITY);
        let notify = Arc::new_cyclic(|this| Self {
            core: EntityCore::new(ctx, Some(HaType::Notify), id, name),
            notifications,
            this: this.clone(),
        });
        ctx.attach(&notify);
        notify
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<String> {
        self.notifications.subscribe()
    }

    fn handle_command(&self, message: &IncomingMessage) {
        match decode_text(&message.payload) {
            Ok(text) => {
                debug!(entity_id = %self.core.id(), "Notification received");
                let _ = self.notifications.send(text);
            }
            Err(e) => reject_command(&self.core, message, &e),
        }
    }
}

impl Entity for Notify {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn init(&self) {
        let core = &self.core;
        core.set_discovery_config(DiscoveryKey::StateTopic, core.base_topic());
        core.set_discovery_config(
            DiscoveryKey::CommandTopic,
            core.topic(NOTIFICATIONS_SUFFIX),
        );
        super::announce(core);

        core.subscribe_command(
            NOTIFICATIONS_SUFFIX,
            command_handler(&self.this, Notify::handle_command),
        );
    }
}
