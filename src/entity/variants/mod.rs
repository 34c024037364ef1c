//! Concrete entity variants.
//!
//! Each variant contributes its discovery entries, encodes its state for the
//! base topic and decodes command payloads. Commands are surfaced as
//! `tokio::sync::broadcast` channels; the owning integration decides what to
//! do and reports the outcome back through the variant's setter.

mod binary_sensor;
mod button;
mod camera;
mod event;
mod lock;
mod media_player;
mod notify;
mod number;
mod select;
mod sensor;
mod switch;
mod text;

pub use self::binary_sensor::BinarySensor;
pub use self::button::Button;
pub use self::camera::Camera;
pub use self::event::Event;
pub use self::lock::Lock;
pub use self::media_player::{MediaCommand, MediaPlayer, MediaState};
pub use self::notify::Notify;
pub use self::number::Number;
pub use self::select::Select;
pub use self::sensor::Sensor;
pub use self::switch::Switch;
pub use self::text::Text;

use super::{CommandError, EntityCore};
use crate::mqtt::{IncomingMessage, MessageHandler};
use std::sync::{Arc, Weak};
use tracing::warn;

/// Capacity of every command channel
const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Wrap a command callback around a weak reference to its entity, which owns
/// the subscription
fn command_handler<E, F>(entity: &Weak<E>, handle: F) -> MessageHandler
where
    E: Send + Sync + 'static,
    F: Fn(&E, &IncomingMessage) + Send + Sync + 'static,
{
    let entity = entity.clone();
    Arc::new(move |message| {
        if let Some(entity) = entity.upgrade() {
            handle(&entity, message);
        }
    })
}

fn reject_command(core: &EntityCore, message: &IncomingMessage, error: &CommandError) {
    warn!(
        entity_id = %core.id(),
        topic = %message.topic,
        error = %error,
        "Ignoring command"
    );
}

/// Registration plus any attributes set before the connection came up
fn announce(core: &EntityCore) {
    core.send_registration();
    if !core.attributes().is_empty() {
        core.publish_attributes();
    }
}
