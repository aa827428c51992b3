//! The `prometheus-metrics` extension.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use z2m_common::{BusEvent, EventKind, HostContext, SubscriptionToken};
use z2m_extension_framework::{Extension, ExtensionError};

use crate::config::PrometheusConfig;
use crate::error::ExporterError;
use crate::http::MetricsExporter;
use crate::registry::{MetricRegistry, SharedRegistry};
use crate::zigbee::{Clock, ZigbeeMetrics};

/// Exposes zigbee network metrics over HTTP while running.
///
/// Metric families are registered on `start()` and the registry is cleared on
/// `stop()`, so the extension can be restarted.
pub struct PrometheusMetrics {
    context: HostContext,
    config: PrometheusConfig,
    registry: SharedRegistry,
    metrics: ZigbeeMetrics,
    exporter: MetricsExporter,
    subscription: Option<SubscriptionToken>,
}

impl PrometheusMetrics {
    pub const NAME: &'static str = "prometheus-metrics";

    pub fn new(context: HostContext, config: PrometheusConfig) -> Result<Self, ExporterError> {
        let listen = config.listen_addr()?;
        let path = config.metrics_path()?.to_string();
        let registry = Arc::new(MetricRegistry::new());
        let metrics = ZigbeeMetrics::new(context.network.clone());
        let exporter = MetricsExporter::new(registry.clone(), listen, path);

        Ok(Self {
            context,
            config,
            registry,
            metrics,
            exporter,
            subscription: None,
        })
    }

    /// Replace the wall clock used for last-seen ages.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.metrics = self.metrics.with_clock(clock);
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.exporter.local_addr()
    }

    fn register_metrics(&self) -> Result<(), ExtensionError> {
        self.metrics
            .register(&self.registry)
            .map_err(|e| ExtensionError::with_context("Failed to register metrics", e))?;

        self.registry
            .set_default_labels(self.config.default_labels.clone())
            .map_err(|e| ExtensionError::with_context("Invalid default labels", e))?;

        // bridge/info usually arrives after start, so resolve on every scrape.
        if self.config.coordinator_label {
            let metrics = self.metrics.clone();
            self.registry
                .set_label_source(move || vec![metrics.coordinator_label()]);
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(token) = self.subscription.take() {
            self.context.bus.unsubscribe(token);
        }
        self.registry.clear();
    }
}

#[async_trait]
impl Extension for PrometheusMetrics {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn start(&mut self) -> Result<(), ExtensionError> {
        if self.subscription.is_some() {
            return Ok(());
        }

        if let Err(e) = self.register_metrics() {
            self.registry.clear();
            return Err(e);
        }

        self.subscription = Some(self.context.bus.subscribe(EventKind::StateChange, |event| {
            if let BusEvent::StateChange(change) = event {
                debug!(ieee_addr = %change.ieee_addr, "State changed");
            }
            Ok(())
        }));

        match self.exporter.start().await {
            Ok(addr) => {
                info!(addr = %addr, metrics = self.registry.len(), "Prometheus metrics enabled");
                Ok(())
            }
            Err(e) => {
                self.release();
                Err(ExtensionError::with_context(
                    "Failed to start metrics endpoint",
                    e,
                ))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), ExtensionError> {
        self.release();
        self.exporter
            .stop()
            .await
            .map_err(|e| ExtensionError::with_context("Failed to stop metrics endpoint", e))?;

        info!("Prometheus metrics disabled");
        Ok(())
    }
}
