mod env;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub host: HostConfig,
    /// Script buttons keyed by section name
    #[serde(default)]
    pub scripts: BTreeMap<String, ScriptConfig>,
}

/// Broker connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Generated from the hostname when unset
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
    /// When false, a lost connection stays down until a reconnect is requested
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_seconds: u64,
    /// Log publishes instead of talking to a broker
    #[serde(default)]
    pub dry_run: bool,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    30
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay() -> u64 {
    5
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            client_id: None,
            keep_alive_seconds: default_keep_alive(),
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_seconds: default_reconnect_delay(),
            dry_run: false,
        }
    }
}

/// Host identity settings
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Overrides the system hostname used in every topic
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            discovery_prefix: default_discovery_prefix(),
        }
    }
}

/// A single script exposed as a button
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    /// Display name, defaults to the section name
    #[serde(default)]
    pub name: Option<String>,
    /// Command line; `{arg}` is replaced with the shared argument text
    #[serde(default)]
    pub exec: String,
    #[serde(default = "default_script_icon")]
    pub icon: String,
}

fn default_script_icon() -> String {
    "mdi:script-text".to_string()
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config: BridgeConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    Ok(config)
}

/// Config file location: `HASS_BRIDGE_CONFIG`, else the user config directory
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("HASS_BRIDGE_CONFIG") {
        return PathBuf::from(path);
    }

    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hass-bridge")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.auto_reconnect, true);
        assert_eq!(config.mqtt.reconnect_delay_seconds, 5);
        assert_eq!(config.host.discovery_prefix, "homeassistant");
        assert!(config.host.hostname.is_none());
        assert!(config.scripts.is_empty());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [mqtt]
            host = "broker.lan"
            port = 8883
            username = "bridge"
            password = "secret"
            auto_reconnect = false

            [host]
            hostname = "workstation"
            discovery_prefix = "ha"

            [scripts.backup]
            name = "Run backup"
            exec = "/usr/local/bin/backup.sh {arg}"
            icon = "mdi:backup-restore"

            [scripts.lock_screen]
            exec = "loginctl lock-session"
        "#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.mqtt.host, "broker.lan");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.username.as_deref(), Some("bridge"));
        assert_eq!(config.mqtt.auto_reconnect, false);
        assert_eq!(config.host.hostname.as_deref(), Some("workstation"));
        assert_eq!(config.host.discovery_prefix, "ha");
        assert_eq!(config.scripts.len(), 2);
        assert_eq!(config.scripts["backup"].icon, "mdi:backup-restore");
        assert_eq!(config.scripts["lock_screen"].name, None);
        assert_eq!(config.scripts["lock_screen"].icon, "mdi:script-text");
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [mqtt]
            port = 1884
        "#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.mqtt.port, 1884);
        assert_eq!(config.mqtt.host, "localhost"); // Default
        assert_eq!(config.mqtt.keep_alive_seconds, 30); // Default
        assert_eq!(config.host.discovery_prefix, "homeassistant"); // Default
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[host]\nhostname = \"laptop\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.host.hostname.as_deref(), Some("laptop"));
    }

    #[test]
    fn test_load_config_rejects_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[mqtt\nport = ").unwrap();

        assert!(load_config(file.path()).is_err());
    }
}
