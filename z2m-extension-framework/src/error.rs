//! Error types for the extension framework.

use thiserror::Error;

/// Result type alias using [`ExtensionError`].
pub type Result<T> = std::result::Result<T, ExtensionError>;

/// Errors that can occur while hosting extensions.
#[derive(Error, Debug)]
pub enum ExtensionError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// MQTT client error.
    #[error("MQTT error: {0}")]
    Mqtt(String),

    /// Host model error.
    #[error(transparent)]
    Host(#[from] z2m_common::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Publishing error.
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    /// An extension failed to start or stop.
    #[error("Extension '{extension}' failed: {message}")]
    Lifecycle { extension: String, message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ExtensionError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a lifecycle error for the named extension.
    pub fn lifecycle(extension: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Lifecycle {
            extension: extension.into(),
            message: msg.into(),
        }
    }

    /// Wrap an error with context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

impl From<rumqttc::ClientError> for ExtensionError {
    fn from(err: rumqttc::ClientError) -> Self {
        Self::Mqtt(err.to_string())
    }
}

impl From<serde_json::Error> for ExtensionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<json5::Error> for ExtensionError {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_context_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err = ExtensionError::with_context("starting exporter", io);

        assert_eq!(err.to_string(), "starting exporter: port taken");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_host_error_is_transparent() {
        let err: ExtensionError = z2m_common::Error::Host("broker gone".to_string()).into();
        assert_eq!(err.to_string(), "Host request failed: broker gone");
    }
}
