//! Configuration for the MiBoxer extension.

use serde::{Deserialize, Serialize};
use z2m_common::{DeviceRecord, LoggingConfig, MqttConfig};
use z2m_extension_framework::{ExtensionConfig, ExtensionError};

/// Which devices are treated as supported remotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Device vendor (default: "MiBoxer").
    #[serde(default = "default_vendor")]
    pub vendor: String,

    /// Device model (default: "FUT089Z").
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_vendor() -> String {
    "MiBoxer".to_string()
}

fn default_model() -> String {
    "FUT089Z".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            vendor: default_vendor(),
            model: default_model(),
        }
    }
}

impl RemoteConfig {
    pub fn matches(&self, device: &DeviceRecord) -> bool {
        device.is_model(&self.vendor, &self.model)
    }
}

/// Complete extension configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiboxerConfig {
    /// Broker connection of the zigbee2mqtt instance.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Supported remote.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ExtensionConfig for MiboxerConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<(), ExtensionError> {
        if self.mqtt.host.is_empty() {
            return Err(ExtensionError::validation("mqtt.host must not be empty"));
        }
        if self.remote.vendor.is_empty() || self.remote.model.is_empty() {
            return Err(ExtensionError::validation(
                "remote.vendor and remote.model must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use z2m_common::{DeviceType, IeeeAddr};

    #[test]
    fn test_defaults() {
        let config: MiboxerConfig = json5::from_str("{}").unwrap();
        assert_eq!(config.remote, RemoteConfig::default());
        assert_eq!(config.remote.vendor, "MiBoxer");
        assert_eq!(config.remote.model, "FUT089Z");
        assert_eq!(config.mqtt.base_topic, "zigbee2mqtt");
    }

    #[test]
    fn test_matches() {
        let remote = RemoteConfig::default();
        let device = DeviceRecord::new(IeeeAddr::from(1), DeviceType::EndDevice);
        assert!(!remote.matches(&device));
        assert!(remote.matches(&device.clone().with_definition("MiBoxer", "FUT089Z")));
        assert!(!remote.matches(&device.with_definition("MiBoxer", "FUT092")));
    }

    #[test]
    fn test_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                mqtt: {{ host: "broker.lan" }},
                remote: {{ model: "FUT089Z-2" }},
                logging: {{ level: "debug" }},
            }}"#
        )
        .unwrap();

        let config = MiboxerConfig::load(file.path()).unwrap();
        assert_eq!(config.mqtt.host, "broker.lan");
        assert_eq!(config.remote.vendor, "MiBoxer");
        assert_eq!(config.remote.model, "FUT089Z-2");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ remote: {{ vendor: "" }} }}"#).unwrap();

        assert!(matches!(
            MiboxerConfig::load(file.path()),
            Err(ExtensionError::ConfigValidation(_))
        ));
    }
}
