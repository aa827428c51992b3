//! Prometheus metrics for a zigbee2mqtt network.
//!
//! Metrics are pulled: nothing is recorded between scrapes. Each request to
//! the metrics path samples the host's network state through the registered
//! [`MetricDefinition`]s and renders the text exposition format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  NetworkState   │<────│ MetricRegistry  │<────│ MetricsExporter │
//! │   (snapshot)    │     │   (sampling)    │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! z2m-exporter-prometheus --config exporter.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod config;
pub mod error;
pub mod exposition;
pub mod extension;
pub mod http;
pub mod registry;
pub mod zigbee;

pub use config::{ExporterConfig, PrometheusConfig};
pub use error::{ExporterError, RegistryError, SamplingError};
pub use extension::PrometheusMetrics;
pub use http::{MetricsExporter, create_router, validate_metrics_path};
pub use registry::{
    LabelSource, MetricDefinition, MetricKind, MetricRegistry, RegistryStats, Sample, Sampler,
    SharedRegistry,
};
pub use zigbee::{Clock, ZigbeeMetrics};
