//! Topic-prefixing publisher over the host publish sink.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use z2m_common::PublishSink;

use crate::error::Result;

/// Publisher for sending payloads through the host.
///
/// Wraps a [`PublishSink`] and prefixes every topic with a fixed prefix.
/// Publishing is fire-and-forget.
#[derive(Clone)]
pub struct Publisher {
    sink: Arc<dyn PublishSink>,
    prefix: String,
}

impl Publisher {
    /// Create a new publisher. An empty prefix publishes topics unchanged.
    pub fn new(sink: Arc<dyn PublishSink>, prefix: impl Into<String>) -> Self {
        Self {
            sink,
            prefix: prefix.into(),
        }
    }

    /// Get the topic prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build a full topic from a suffix.
    pub fn build_topic(&self, suffix: &str) -> String {
        match (self.prefix.is_empty(), suffix.is_empty()) {
            (true, _) => suffix.to_string(),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}/{}", self.prefix, suffix),
        }
    }

    /// Publish a text payload. The topic is `suffix` appended to the prefix.
    pub fn publish(&self, suffix: &str, payload: impl Into<String>) {
        let topic = self.build_topic(suffix);
        tracing::trace!(%topic, "Publishing");
        self.sink.publish(&topic, payload.into());
    }

    /// Publish a JSON-serialized value.
    pub fn publish_json<T: Serialize>(&self, suffix: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        self.publish(suffix, payload);
        Ok(())
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
