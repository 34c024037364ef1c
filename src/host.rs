use crate::config::HostConfig;
use crate::entity::HaType;
use tracing::warn;

/// Reserved entity id of the host's own availability entity.
pub const AVAILABILITY_ID: &str = "connected";

/// Payload published on the availability topic while the bridge is reachable.
pub const PAYLOAD_AVAILABLE: &str = "on";

/// Payload published on the availability topic when the bridge goes away.
pub const PAYLOAD_NOT_AVAILABLE: &str = "off";

const UNIQUE_ID_PREFIX: &str = "linux_ha_control_";
const DEVICE_ID_PREFIX: &str = "linux_ha_bridge_";

/// Identity of the host this bridge runs on.
///
/// Resolved once at startup and injected into the transport and every entity.
/// All topic names are derived from it:
///
/// - base topic: `{hostname}/{id}`
/// - availability topic: `{hostname}/connected`
/// - discovery topic: `{prefix}/{ha_type}/{hostname}/{id}/config`
#[derive(Clone, Debug, PartialEq)]
pub struct HostIdentity {
    hostname: String,
    discovery_prefix: String,
}

impl HostIdentity {
    /// Create an identity from an explicit hostname (lowercased) and discovery prefix
    pub fn new(hostname: impl Into<String>, discovery_prefix: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into().to_lowercase(),
            discovery_prefix: discovery_prefix.into(),
        }
    }

    /// Resolve identity from config, falling back to the system hostname
    pub fn resolve(config: &HostConfig) -> Self {
        let hostname = match &config.hostname {
            Some(name) if !name.is_empty() => name.clone(),
            _ => match hostname::get() {
                Ok(name) => name.to_string_lossy().to_string(),
                Err(e) => {
                    warn!(error = %e, "Failed to read system hostname, using 'localhost'");
                    "localhost".to_string()
                }
            },
        };

        Self::new(hostname, config.discovery_prefix.clone())
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn discovery_prefix(&self) -> &str {
        &self.discovery_prefix
    }

    /// Root of an entity's topic namespace
    pub fn base_topic(&self, id: &str) -> String {
        format!("{}/{}", self.hostname, id)
    }

    pub fn availability_topic(&self) -> String {
        self.base_topic(AVAILABILITY_ID)
    }

    pub fn discovery_topic(&self, ha_type: HaType, id: &str) -> String {
        format!(
            "{}/{}/{}/{}/config",
            self.discovery_prefix,
            ha_type.as_str(),
            self.hostname,
            id
        )
    }

    pub fn unique_id(&self, id: &str) -> String {
        format!("{}{}_{}", UNIQUE_ID_PREFIX, self.hostname, id)
    }

    pub fn device_identifier(&self) -> String {
        format!("{}{}", DEVICE_ID_PREFIX, self.hostname)
    }
}

/// Turn an arbitrary external name into an entity id slug.
///
/// Lowercases and replaces every character outside `[a-z0-9_]` with `_`.
pub fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_lowercase)
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics_derive_from_hostname_and_id() {
        let host = HostIdentity::new("Desktop", "homeassistant");

        assert_eq!(host.hostname(), "desktop");
        assert_eq!(host.base_topic("volume"), "desktop/volume");
        assert_eq!(host.availability_topic(), "desktop/connected");
        assert_eq!(
            host.discovery_topic(HaType::Number, "volume"),
            "homeassistant/number/desktop/volume/config"
        );
    }

    #[test]
    fn test_identifiers() {
        let host = HostIdentity::new("desktop", "homeassistant");

        assert_eq!(host.unique_id("inhibit"), "linux_ha_control_desktop_inhibit");
        assert_eq!(host.device_identifier(), "linux_ha_bridge_desktop");
    }

    #[test]
    fn test_resolve_prefers_configured_hostname() {
        let config = HostConfig {
            hostname: Some("Workstation".to_string()),
            discovery_prefix: "ha".to_string(),
        };

        let host = HostIdentity::resolve(&config);
        assert_eq!(host.hostname(), "workstation");
        assert_eq!(host.discovery_prefix(), "ha");
    }

    #[test]
    fn test_resolve_falls_back_to_system_hostname() {
        let config = HostConfig {
            hostname: None,
            discovery_prefix: "homeassistant".to_string(),
        };

        let host = HostIdentity::resolve(&config);
        assert!(!host.hostname().is_empty());
        assert_eq!(host.hostname(), host.hostname().to_lowercase());
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("syncthing.service"), "syncthing_service");
        assert_eq!(sanitize_id("My Game: Part 2"), "my_game__part_2");
        assert_eq!(sanitize_id("already_ok_1"), "already_ok_1");
    }
}
