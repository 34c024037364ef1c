use super::{command_handler, COMMAND_CHANNEL_CAPACITY};
use crate::entity::{DiscoveryKey, Entity, EntityContext, EntityCore, HaType, SET_SUFFIX};
use crate::mqtt::IncomingMessage;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::debug;

/// Stateless trigger; any payload on `{base}/set` is a press
pub struct Button {
    core: EntityCore,
    presses: broadcast::Sender<()>,
    this: Weak<Button>,
}

impl Button {
    pub fn new(ctx: &EntityContext, id: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        let (presses, _) = broadcast::channel(COMMAND_CHANNEL_CAPACITY);
        let button = Arc::new_cyclic(|this| Self {
            core: EntityCore::new(ctx, Some(HaType::Button), id, name),
            presses,
            this: this.clone(),
        });
        ctx.attach(&button);
        button
    }

    pub fn subscribe_presses(&self) -> broadcast::Receiver<()> {
        self.presses.subscribe()
    }

    fn handle_command(&self, _message: &IncomingMessage) {
        debug!(entity_id = %self.core.id(), "Button pressed");
        let _ = self.presses.send(());
    }
}

impl Entity for Button {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn init(&self) {
        let core = &self.core;
        core.set_discovery_config(DiscoveryKey::CommandTopic, core.topic(SET_SUFFIX));
        super::announce(core);

        core.subscribe_command(
            SET_SUFFIX,
            command_handler(&self.this, Button::handle_command),
        );
    }
}
