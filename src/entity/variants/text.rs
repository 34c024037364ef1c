use super::{command_handler, reject_command, COMMAND_CHANNEL_CAPACITY};
use crate::entity::{
    decode_text, CommandError, DiscoveryKey, Entity, EntityContext, EntityCore, HaType,
    SET_SUFFIX,
};
use crate::mqtt::IncomingMessage;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_MAX_LENGTH: usize = 255;

struct TextState {
    value: String,
    max_length: usize,
}

/// Free-form text input.
///
/// Unlike the request-style variants, an accepted command updates the state
/// directly and is then announced on [`Text::subscribe_changes`].
pub struct Text {
    core: EntityCore,
    state: Mutex<TextState>,
    changes: broadcast::Sender<String>,
    this: Weak<Text>,
}

impl Text {
    pub fn new(ctx: &EntityContext, id: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        let (changes, _) = broadcast::channel(COMMAND_CHANNEL_CAPACITY);
        let text = Arc::new_cyclic(|this| Self {
            core: EntityCore::new(ctx, Some(HaType::Text), id, name),
            state: Mutex::new(TextState {
                value: String::new(),
                max_length: DEFAULT_MAX_LENGTH,
            }),
            changes,
            this: this.clone(),
        });
        ctx.attach(&text);
        text
    }

    /// Maximum accepted length in characters
    pub fn set_max_length(&self, max_length: usize) {
        self.state.lock().unwrap().max_length = max_length;
    }

    pub fn value(&self) -> String {
        self.state.lock().unwrap().value.clone()
    }

    pub fn set_value(&self, value: impl Into<String>) {
        self.state.lock().unwrap().value = value.into();
        self.publish_state();
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }

    fn publish_state(&self) {
        self.core.publish_state(self.value(), true);
    }

    fn decode(&self, payload: &[u8]) -> Result<String, CommandError> {
        let text = decode_text(payload)?;
        let max = self.state.lock().unwrap().max_length;
        let length = text.chars().count();
        if length > max {
            return Err(CommandError::TooLong { length, max });
        }
        Ok(text)
    }

    fn handle_command(&self, message: &IncomingMessage) {
        match self.decode(&message.payload) {
            Ok(text) => {
                debug!(entity_id = %self.core.id(), "Text changed");
                self.set_value(text.clone());
                let _ = self.changes.send(text);
            }
            Err(e) => reject_command(&self.core, message, &e),
        }
    }
}

impl Entity for Text {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn init(&self) {
        let core = &self.core;
        core.set_discovery_config(DiscoveryKey::StateTopic, core.base_topic());
        core.set_discovery_config(DiscoveryKey::CommandTopic, core.topic(SET_SUFFIX));
        core.set_discovery_config(DiscoveryKey::Min, 0);
        core.set_discovery_config(
            DiscoveryKey::Max,
            self.state.lock().unwrap().max_length,
        );
        core.set_discovery_config(DiscoveryKey::Mode, "text");
        super::announce(core);
        self.publish_state();

        core.subscribe_command(SET_SUFFIX, command_handler(&self.this, Text::handle_command));
    }
}
