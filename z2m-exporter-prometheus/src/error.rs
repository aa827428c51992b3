//! Error types for the metrics registry and exporter.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised when registering metrics.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Metric '{0}' is already registered")]
    DuplicateName(String),

    #[error("Invalid metric name '{0}'")]
    InvalidName(String),

    #[error("Invalid label name '{label}' for metric '{metric}'")]
    InvalidLabel { metric: String, label: String },

    #[error("Metric '{0}' is a summary and cannot carry labels")]
    UnsupportedLabels(String),
}

/// Errors raised by a sampler at scrape time. The metric is omitted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SamplingError {
    #[error("Sampler failed: {0}")]
    Failed(String),

    #[error("Metric '{metric}' expected labels {expected:?}, got {found:?}")]
    LabelMismatch {
        metric: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

impl SamplingError {
    /// Create a failure from anything displayable.
    pub fn failed(msg: impl std::fmt::Display) -> Self {
        Self::Failed(msg.to_string())
    }
}

/// Errors raised by the HTTP exporter.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Invalid listen address '{0}'")]
    InvalidAddress(String),

    #[error("Invalid metrics path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
