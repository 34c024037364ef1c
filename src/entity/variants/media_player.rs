use super::{command_handler, reject_command, COMMAND_CHANNEL_CAPACITY};
use crate::entity::{
    decode_decimal, decode_text, DiscoveryKey, Entity, EntityContext, EntityCore, HaType,
};
use crate::mqtt::IncomingMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Playback snapshot published as a JSON object on the base topic
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaState {
    /// playing, paused, stopped, idle or off
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,
    /// 0.0 to 1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_art: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub available_players: Vec<String>,
    /// Player-specific fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A command received on one of the media player's command topics
#[derive(Clone, Debug, PartialEq)]
pub enum MediaCommand {
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Previous,
    /// Requested volume in `[0.0, 1.0]`
    SetVolume(f64),
    /// Raw `play_media` payload
    PlayMedia(String),
}

/// Command topic suffixes, also used as the `command_<kind>_topic` keys
const COMMAND_KINDS: [&str; 8] = [
    "play",
    "pause",
    "playpause",
    "stop",
    "next",
    "previous",
    "volume",
    "play_media",
];

impl MediaCommand {
    fn decode(kind: &str, payload: &[u8]) -> Result<Self, crate::entity::CommandError> {
        Ok(match kind {
            "play" => MediaCommand::Play,
            "pause" => MediaCommand::Pause,
            "playpause" => MediaCommand::PlayPause,
            "stop" => MediaCommand::Stop,
            "next" => MediaCommand::Next,
            "previous" => MediaCommand::Previous,
            "volume" => MediaCommand::SetVolume(decode_decimal(payload, 0.0, 1.0)?),
            _ => MediaCommand::PlayMedia(decode_text(payload)?),
        })
    }
}

/// Media player with a structured state and one command topic per action
pub struct MediaPlayer {
    core: EntityCore,
    state: Mutex<MediaState>,
    commands: broadcast::Sender<MediaCommand>,
    this: Weak<MediaPlayer>,
}

impl MediaPlayer {
    pub fn new(ctx: &EntityContext, id: impl Into<String>, name: impl Into<String>) -> Arc<Self> {
        let (commands, _) = broadcast::channel(COMMAND_CHANNEL_CAPACITY);
        let player = Arc::new_cyclic(|this| Self {
            core: EntityCore::new(ctx, Some(HaType::MediaPlayer), id, name),
            state: Mutex::new(MediaState {
                state: "idle".to_string(),
                ..MediaState::default()
            }),
            commands,
            this: this.clone(),
        });
        ctx.attach(&player);
        player
    }

    pub fn state(&self) -> MediaState {
        self.state.lock().unwrap().clone()
    }

    /// Replace the playback state and publish it.
    ///
    /// The list of available players is kept from the previous state when
    /// the new one leaves it empty.
    pub fn set_state(&self, mut state: MediaState) {
        {
            let mut current = self.state.lock().unwrap();
            if state.available_players.is_empty() {
                state.available_players = std::mem::take(&mut current.available_players);
            }
            *current = state;
        }
        self.publish_state();
    }

    pub fn set_available_players(&self, players: Vec<String>) {
        self.state.lock().unwrap().available_players = players;
        self.publish_state();
    }

    pub fn subscribe_commands(&self) -> broadcast::Receiver<MediaCommand> {
        self.commands.subscribe()
    }

    fn publish_state(&self) {
        let payload = match serde_json::to_string(&*self.state.lock().unwrap()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(entity_id = %self.core.id(), error = %e, "Failed to encode media state");
                return;
            }
        };
        self.core.publish_state(payload, true);
    }

    fn handle_command(&self, kind: &str, message: &IncomingMessage) {
        match MediaCommand::decode(kind, &message.payload) {
            Ok(command) => {
                debug!(entity_id = %self.core.id(), command = ?command, "Media command received");
                let _ = self.commands.send(command);
            }
            Err(e) => reject_command(&self.core, message, &e),
        }
    }
}

impl Entity for MediaPlayer {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn init(&self) {
        let core = &self.core;
        core.set_discovery_config(DiscoveryKey::StateTopic, core.base_topic());
        for kind in COMMAND_KINDS {
            core.set_discovery_config(format!("command_{}_topic", kind), core.topic(kind));
        }
        super::announce(core);

        for kind in COMMAND_KINDS {
            core.subscribe_command(
                kind,
                command_handler(&self.this, move |player: &MediaPlayer, message| {
                    player.handle_command(kind, message)
                }),
            );
        }
        self.publish_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_media_state_serialises_flat() {
        let mut extra = Map::new();
        extra.insert("shuffle".to_string(), json!(true));

        let state = MediaState {
            state: "playing".to_string(),
            title: Some("Song".to_string()),
            volume: Some(0.5),
            available_players: vec!["spotify".to_string()],
            extra,
            ..MediaState::default()
        };

        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({
                "state": "playing",
                "title": "Song",
                "volume": 0.5,
                "available_players": ["spotify"],
                "shuffle": true
            })
        );
    }

    #[test]
    fn test_decode_media_commands() {
        assert_eq!(MediaCommand::decode("play", b""), Ok(MediaCommand::Play));
        assert_eq!(
            MediaCommand::decode("playpause", b"anything"),
            Ok(MediaCommand::PlayPause)
        );
        assert_eq!(
            MediaCommand::decode("volume", b"1.7"),
            Ok(MediaCommand::SetVolume(1.0))
        );
        assert!(MediaCommand::decode("volume", b"loud").is_err());
        assert_eq!(
            MediaCommand::decode("play_media", b"spotify:track:1"),
            Ok(MediaCommand::PlayMedia("spotify:track:1".to_string()))
        );
    }
}
