//! Configuration for the Prometheus exporter.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use z2m_common::{LoggingConfig, MqttConfig};
use z2m_extension_framework::{ExtensionConfig, ExtensionError};

use crate::error::ExporterError;
use crate::exposition::is_valid_label_name;

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Broker connection of the zigbee2mqtt instance.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:8081").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Default labels to add to all metrics.
    #[serde(default)]
    pub default_labels: BTreeMap<String, String>,

    /// Add a `coordinator="<type>@<revision>"` label to every series.
    #[serde(default)]
    pub coordinator_label: bool,
}

fn default_listen() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            default_labels: BTreeMap::new(),
            coordinator_label: false,
        }
    }
}

impl PrometheusConfig {
    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ExporterError> {
        self.listen
            .parse()
            .map_err(|_| ExporterError::InvalidAddress(self.listen.clone()))
    }

    /// Validated metrics path.
    pub fn metrics_path(&self) -> Result<&str, ExporterError> {
        crate::http::validate_metrics_path(&self.path)?;
        Ok(&self.path)
    }
}

impl ExtensionConfig for ExporterConfig {
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
        if self.mqtt.base_topic.is_empty() {
            return Err(ExtensionError::validation(
                "mqtt.base_topic must not be empty",
            ));
        }

        self.prometheus
            .listen_addr()
            .map_err(|e| ExtensionError::validation(e.to_string()))?;
        self.prometheus
            .metrics_path()
            .map_err(|e| ExtensionError::validation(e.to_string()))?;

        if let Some(name) = self
            .prometheus
            .default_labels
            .keys()
            .find(|name| !is_valid_label_name(name))
        {
            return Err(ExtensionError::validation(format!(
                "Invalid default label name: {}",
                name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use z2m_common::LogFormat;

    fn load(content: &str) -> Result<ExporterConfig, ExtensionError> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        ExporterConfig::load(file.path())
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = load("{}").unwrap();

        assert_eq!(config.prometheus.listen, "0.0.0.0:8081");
        assert_eq!(config.prometheus.path, "/metrics");
        assert!(config.prometheus.default_labels.is_empty());
        assert!(!config.prometheus.coordinator_label);
        assert_eq!(config.mqtt.base_topic, "zigbee2mqtt");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            mqtt: {
                host: "broker.local",
                port: 1884,
                base_topic: "z2m",
            },
            prometheus: {
                listen: "127.0.0.1:9091",
                path: "/prometheus/metrics",
                coordinator_label: true,
                default_labels: {
                    site: "home",
                    network: "upstairs",
                },
            },
            logging: {
                level: "debug",
                format: "json",
            },
        }"#;

        let config = load(json).unwrap();

        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 1884);
        assert_eq!(config.mqtt.base_topic, "z2m");
        assert_eq!(config.prometheus.listen, "127.0.0.1:9091");
        assert_eq!(config.prometheus.path, "/prometheus/metrics");
        assert!(config.prometheus.coordinator_label);
        assert_eq!(
            config.prometheus.default_labels.keys().collect::<Vec<_>>(),
            vec!["network", "site"]
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validate_invalid_listen() {
        let json = r#"{
            prometheus: { listen: "not-an-address" }
        }"#;

        let err = load(json).unwrap_err();
        assert!(err.to_string().contains("Invalid listen address"));
    }

    #[test]
    fn test_validate_invalid_path() {
        let json = r#"{
            prometheus: { path: "no-leading-slash" }
        }"#;

        let err = load(json).unwrap_err();
        assert!(err.to_string().contains("must start with /"));
    }

    #[test]
    fn test_validate_invalid_label() {
        let json = r#"{
            prometheus: { default_labels: { "bad-label": "x" } }
        }"#;

        let err = load(json).unwrap_err();
        assert!(err.to_string().contains("bad-label"));
    }

    #[test]
    fn test_listen_addr() {
        let config = PrometheusConfig {
            listen: "127.0.0.1:0".to_string(),
            ..Default::default()
        };
        assert_eq!(config.listen_addr().unwrap().ip().to_string(), "127.0.0.1");

        let config = PrometheusConfig {
            listen: "localhost".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.listen_addr(),
            Err(ExporterError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_validate_capture_path() {
        for path in ["/metrics/:id", "/*rest", "/{name}"] {
            let json = format!("{{ prometheus: {{ path: \"{}\" }} }}", path);
            let err = load(&json).unwrap_err();
            assert!(err.to_string().contains("Invalid metrics path"), "path {path}");
        }
    }

    #[test]
    fn test_missing_config_file() {
        let missing = ExporterConfig::load("/nonexistent/exporter.json5");
        assert!(matches!(
            missing,
            Err(ExtensionError::ConfigNotFound { .. })
        ));
    }
}
