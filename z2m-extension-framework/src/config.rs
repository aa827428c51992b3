//! Configuration traits and utilities.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{ExtensionError, Result};
use crate::{LoggingConfig, MqttConfig};

/// Trait for extension configuration types.
///
/// Implement this trait for an extension's configuration struct to get
/// loading, validation, and access to the common sections.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use z2m_extension_framework::{ExtensionConfig, LoggingConfig, MqttConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyConfig {
///     #[serde(default)]
///     pub mqtt: MqttConfig,
///     #[serde(default)]
///     pub logging: LoggingConfig,
/// }
///
/// impl ExtensionConfig for MyConfig {
///     fn mqtt(&self) -> &MqttConfig {
///         &self.mqtt
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
/// }
/// ```
pub trait ExtensionConfig: Sized + DeserializeOwned {
    /// Get the MQTT broker configuration.
    fn mqtt(&self) -> &MqttConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        if self.mqtt().host.is_empty() {
            return Err(ExtensionError::validation("mqtt.host must not be empty"));
        }
        if self.mqtt().base_topic.is_empty() {
            return Err(ExtensionError::validation(
                "mqtt.base_topic must not be empty",
            ));
        }
        Ok(())
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ExtensionError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }
}
