//! Extension host status reporting.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::publisher::Publisher;

/// Status document published on `extensions/<name>/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionStatus {
    /// Host name (e.g., "prometheus", "miboxer").
    pub extension: String,
    /// Host version.
    pub version: String,
    /// Current status ("running", "offline", "error").
    pub status: String,
    /// RFC 3339 time the status was produced.
    pub timestamp: String,
    /// Additional metadata.
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl ExtensionStatus {
    fn with_status(
        extension: impl Into<String>,
        version: impl Into<String>,
        status: &str,
    ) -> Self {
        Self {
            extension: extension.into(),
            version: version.into(),
            status: status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Create a new status with "running" state.
    pub fn running(extension: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_status(extension, version, "running")
    }

    /// Create a status with "offline" state.
    pub fn offline(extension: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_status(extension, version, "offline")
    }

    /// Create a status with "error" state.
    pub fn error(
        extension: impl Into<String>,
        version: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::with_status(extension, version, "error")
            .with_metadata(serde_json::json!({ "error": error.into() }))
    }

    /// Add metadata to the status.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Topic suffix a status for `extension` is published on.
    pub fn topic(extension: &str) -> String {
        format!("extensions/{}/status", extension)
    }

    /// Publish this status.
    pub fn publish(&self, publisher: &Publisher) -> Result<()> {
        publisher.publish_json(&Self::topic(&self.extension), self)
    }
}

/// Helper to publish host status on startup, failure and shutdown.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    publisher: Publisher,
    name: String,
    version: String,
}

impl StatusPublisher {
    /// Create a new status publisher.
    pub fn new(publisher: Publisher, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            publisher,
            name: name.into(),
            version: version.into(),
        }
    }

    /// Publish "running" status with optional metadata.
    pub fn publish_running(&self, metadata: Option<serde_json::Value>) -> Result<()> {
        let mut status = ExtensionStatus::running(&self.name, &self.version);
        if let Some(meta) = metadata {
            status = status.with_metadata(meta);
        }
        status.publish(&self.publisher)
    }

    /// Publish "offline" status.
    pub fn publish_offline(&self) -> Result<()> {
        ExtensionStatus::offline(&self.name, &self.version).publish(&self.publisher)
    }

    /// Publish "error" status.
    pub fn publish_error(&self, error: impl Into<String>) -> Result<()> {
        ExtensionStatus::error(&self.name, &self.version, error).publish(&self.publisher)
    }
}
