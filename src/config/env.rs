use super::BridgeConfig;

impl BridgeConfig {
    /// Apply environment overrides on top of file values.
    ///
    /// Unparsable values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("MQTT_HOST") {
            self.mqtt.host = v;
        }
        if let Some(v) = lookup("MQTT_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.mqtt.port = port;
            }
        }
        if let Some(v) = lookup("MQTT_USERNAME") {
            self.mqtt.username = Some(v);
        }
        if let Some(v) = lookup("MQTT_PASSWORD") {
            self.mqtt.password = Some(v);
        }
        if let Some(v) = lookup("HASS_BRIDGE_HOSTNAME") {
            self.host.hostname = Some(v);
        }
        if let Some(v) = lookup("HASS_BRIDGE_DISCOVERY_PREFIX") {
            self.host.discovery_prefix = v;
        }
        if let Some(v) = lookup("HASS_BRIDGE_DRY_RUN") {
            if let Ok(b) = v.parse::<bool>() {
                self.mqtt.dry_run = b;
            }
        }
    }
}
