use super::{command_handler, reject_command, COMMAND_CHANNEL_CAPACITY};
use crate::entity::{
    decode_text, Attributes, DiscoveryKey, Entity, EntityContext, EntityCore, HaType,
};
use crate::mqtt::IncomingMessage;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::debug;

const COMMAND_SUFFIX: &str = "command";

/// Snapshot camera publishing base64 images on its base topic.
///
/// `{base}/command` is not part of Home Assistant's camera schema; it lets
/// automations ask the owning integration for a fresh image.
pub struct Camera {
    core: EntityCore,
    commands: broadcast::Sender<String>,
    this: Weak<Camera>,
}

impl Camera {
    pub fn new(ctx: &EntityContext, id: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        let (commands, _) = broadcast::channel(COMMAND_CHANNEL_CAPACITY);
        let camera = Arc::new_cyclic(|this| Self {
            core: EntityCore::new(ctx, Some(HaType::Camera), id, name),
            commands,
            this: this.clone(),
        });
        ctx.attach(&camera);
        camera
    }

    /// Publish an already base64-encoded image (retained), then its metadata
    /// as attributes. Dropped when not connected.
    pub fn publish_image(&self, image_base64: &str) {
        if !self.core.is_connected() {
            return;
        }

        self.core.publish_state(image_base64, true);

        let mut attributes = Attributes::new();
        attributes.insert("timestamp".to_string(), Utc::now().into());
        attributes.insert("size_bytes".to_string(), image_base64.len().into());
        self.core.set_attributes(attributes);
    }

    /// Encode raw image bytes and publish them
    pub fn publish_image_bytes(&self, image: &[u8]) {
        self.publish_image(&STANDARD.encode(image));
    }

    pub fn subscribe_commands(&self) -> broadcast::Receiver<String> {
        self.commands.subscribe()
    }

    fn handle_command(&self, message: &IncomingMessage) {
        match decode_text(&message.payload) {
            Ok(command) => {
                debug!(entity_id = %self.core.id(), command = %command, "Camera command received");
                let _ = self.commands.send(command);
            }
            Err(e) => reject_command(&self.core, message, &e),
        }
    }
}

impl Entity for Camera {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn init(&self) {
        let core = &self.core;
        core.set_discovery_config(DiscoveryKey::Topic, core.base_topic());
        core.set_discovery_config(DiscoveryKey::ImageEncoding, "b64");
        core.set_discovery_config(DiscoveryKey::CommandTopic, core.topic(COMMAND_SUFFIX));
        super::announce(core);

        core.subscribe_command(
            COMMAND_SUFFIX,
            command_handler(&self.this, Camera::handle_command),
        );
    }
}
