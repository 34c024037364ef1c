use crate::host::{HostIdentity, AVAILABILITY_ID, PAYLOAD_AVAILABLE, PAYLOAD_NOT_AVAILABLE};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Discovery category of an entity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HaType {
    Sensor,
    BinarySensor,
    Switch,
    Button,
    Number,
    Select,
    Lock,
    Event,
    Camera,
    Notify,
    MediaPlayer,
    Text,
}

impl HaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HaType::Sensor => "sensor",
            HaType::BinarySensor => "binary_sensor",
            HaType::Switch => "switch",
            HaType::Button => "button",
            HaType::Number => "number",
            HaType::Select => "select",
            HaType::Lock => "lock",
            HaType::Event => "event",
            HaType::Camera => "camera",
            HaType::Notify => "notify",
            HaType::MediaPlayer => "media_player",
            HaType::Text => "text",
        }
    }
}

impl fmt::Display for HaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of a discovery payload entry.
///
/// Recognised keys have their own variant; anything else goes through
/// `Custom` for vendor extensions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiscoveryKey {
    StateTopic,
    CommandTopic,
    Topic,
    PayloadOn,
    PayloadOff,
    PayloadPress,
    PayloadLock,
    PayloadUnlock,
    StateLocked,
    StateUnlocked,
    Min,
    Max,
    Step,
    Mode,
    UnitOfMeasurement,
    Options,
    EventTypes,
    DeviceClass,
    ImageEncoding,
    Icon,
    Device,
    Custom(String),
}

impl DiscoveryKey {
    pub fn as_str(&self) -> &str {
        match self {
            DiscoveryKey::StateTopic => "state_topic",
            DiscoveryKey::CommandTopic => "command_topic",
            DiscoveryKey::Topic => "topic",
            DiscoveryKey::PayloadOn => "payload_on",
            DiscoveryKey::PayloadOff => "payload_off",
            DiscoveryKey::PayloadPress => "payload_press",
            DiscoveryKey::PayloadLock => "payload_lock",
            DiscoveryKey::PayloadUnlock => "payload_unlock",
            DiscoveryKey::StateLocked => "state_locked",
            DiscoveryKey::StateUnlocked => "state_unlocked",
            DiscoveryKey::Min => "min",
            DiscoveryKey::Max => "max",
            DiscoveryKey::Step => "step",
            DiscoveryKey::Mode => "mode",
            DiscoveryKey::UnitOfMeasurement => "unit_of_measurement",
            DiscoveryKey::Options => "options",
            DiscoveryKey::EventTypes => "event_types",
            DiscoveryKey::DeviceClass => "device_class",
            DiscoveryKey::ImageEncoding => "image_encoding",
            DiscoveryKey::Icon => "icon",
            DiscoveryKey::Device => "device",
            DiscoveryKey::Custom(key) => key,
        }
    }
}

impl From<&str> for DiscoveryKey {
    fn from(key: &str) -> Self {
        match key {
            "state_topic" => DiscoveryKey::StateTopic,
            "command_topic" => DiscoveryKey::CommandTopic,
            "topic" => DiscoveryKey::Topic,
            "payload_on" => DiscoveryKey::PayloadOn,
            "payload_off" => DiscoveryKey::PayloadOff,
            "payload_press" => DiscoveryKey::PayloadPress,
            "payload_lock" => DiscoveryKey::PayloadLock,
            "payload_unlock" => DiscoveryKey::PayloadUnlock,
            "state_locked" => DiscoveryKey::StateLocked,
            "state_unlocked" => DiscoveryKey::StateUnlocked,
            "min" => DiscoveryKey::Min,
            "max" => DiscoveryKey::Max,
            "step" => DiscoveryKey::Step,
            "mode" => DiscoveryKey::Mode,
            "unit_of_measurement" => DiscoveryKey::UnitOfMeasurement,
            "options" => DiscoveryKey::Options,
            "event_types" => DiscoveryKey::EventTypes,
            "device_class" => DiscoveryKey::DeviceClass,
            "image_encoding" => DiscoveryKey::ImageEncoding,
            "icon" => DiscoveryKey::Icon,
            "device" => DiscoveryKey::Device,
            other => DiscoveryKey::Custom(other.to_string()),
        }
    }
}

impl From<String> for DiscoveryKey {
    fn from(key: String) -> Self {
        DiscoveryKey::from(key.as_str())
    }
}

/// Per-entity discovery entries, merged with the computed fields at registration
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiscoveryConfig {
    entries: BTreeMap<String, Value>,
}

impl DiscoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite one entry
    pub fn set(&mut self, key: impl Into<DiscoveryKey>, value: impl Into<Value>) {
        self.entries
            .insert(key.into().as_str().to_string(), value.into());
    }

    pub fn get(&self, key: impl Into<DiscoveryKey>) -> Option<&Value> {
        self.entries.get(key.into().as_str())
    }

    pub fn contains(&self, key: impl Into<DiscoveryKey>) -> bool {
        self.entries.contains_key(key.into().as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A discovery message ready to publish
#[derive(Clone, Debug, PartialEq)]
pub struct Registration {
    pub topic: String,
    pub payload: Value,
}

impl Registration {
    /// Compact JSON; keys are sorted so equal configs encode identically
    pub fn to_json(&self) -> String {
        self.payload.to_string()
    }
}

/// Identity fields needed to build a discovery message
pub(crate) struct RegistrationInput<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub ha_type: Option<HaType>,
    pub icon: Option<&'a str>,
    pub discovery: &'a DiscoveryConfig,
}

/// Build the discovery message, or `None` when no discovery category is set.
///
/// Computed fields always win over entries of the same name, except `device`
/// which is only filled in when absent.
pub(crate) fn build_registration(
    host: &HostIdentity,
    input: RegistrationInput<'_>,
) -> Option<Registration> {
    let ha_type = input.ha_type?;

    let mut config: Map<String, Value> = input
        .discovery
        .entries
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    config.insert("name".to_string(), json!(input.name));

    if input.id != AVAILABILITY_ID {
        config.insert(
            "availability_topic".to_string(),
            json!(host.availability_topic()),
        );
        config.insert("payload_available".to_string(), json!(PAYLOAD_AVAILABLE));
        config.insert(
            "payload_not_available".to_string(),
            json!(PAYLOAD_NOT_AVAILABLE),
        );
        if let Some(icon) = input.icon.filter(|icon| !icon.is_empty()) {
            config.insert("icon".to_string(), json!(icon));
        }
    }

    config.insert(
        "json_attributes_topic".to_string(),
        json!(format!("{}/attributes", host.base_topic(input.id))),
    );

    if !config.contains_key("device") {
        config.insert(
            "device".to_string(),
            json!({ "identifiers": host.device_identifier() }),
        );
    }

    config.insert("unique_id".to_string(), json!(host.unique_id(input.id)));

    Some(Registration {
        topic: host.discovery_topic(ha_type, input.id),
        payload: Value::Object(config),
    })
}
