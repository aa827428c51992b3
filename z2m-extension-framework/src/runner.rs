//! Extension runner for lifecycle management.

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinHandle;

use z2m_common::{EventBus, HostContext, LoggingConfig, init_tracing};

use crate::ExtensionArgs;
use crate::config::ExtensionConfig;
use crate::error::{ExtensionError, Result};
use crate::extension::Extension;
use crate::mqtt_host::MqttHost;
use crate::publisher::Publisher;
use crate::status::StatusPublisher;

struct ManagedExtension {
    extension: Box<dyn Extension>,
    running: bool,
}

/// Runner that hosts a set of extensions.
///
/// Handles:
/// - Logging initialization
/// - MQTT host connection (or an injected [`HostContext`])
/// - Starting extensions in order, stopping them in reverse
/// - Task spawning and management
/// - Graceful shutdown on Ctrl+C
/// - Status publishing (optional)
///
/// # Example
///
/// ```ignore
/// use z2m_extension_framework::{ExtensionArgs, ExtensionConfig, ExtensionRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = ExtensionArgs::parse_with_default("myext.json5");
///     let config = MyConfig::load(&args.config)?;
///
///     let mut runner = ExtensionRunner::new_with_args("myext", config, Some(&args)).await?;
///     let extension = MyExtension::new(runner.context().clone());
///     runner.add(extension);
///
///     runner.run().await
/// }
/// ```
pub struct ExtensionRunner<C: ExtensionConfig> {
    /// Runner name for logging and status.
    name: String,
    /// Runner version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Collaborators handed to extensions.
    context: HostContext,
    /// MQTT host, when connected to a broker.
    mqtt: Option<MqttHost>,
    /// Publisher over the host sink.
    publisher: Publisher,
    /// Status publisher (optional).
    status_publisher: Option<StatusPublisher>,
    /// Registered extensions, in start order.
    extensions: Vec<ManagedExtension>,
    /// Spawned tasks.
    tasks: Vec<JoinHandle<()>>,
}

impl<C: ExtensionConfig> ExtensionRunner<C> {
    /// Create a new runner connected to the configured MQTT broker.
    pub async fn new(name: impl Into<String>, config: C) -> Result<Self> {
        Self::new_with_args(name, config, None).await
    }

    /// Create a new runner with CLI args for log level override.
    ///
    /// This will:
    /// 1. Initialize logging based on config (with optional CLI override)
    /// 2. Create the MQTT host and spawn its event loop
    pub async fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&ExtensionArgs>,
    ) -> Result<Self> {
        let name = name.into();

        let log_config = match args.and_then(|a| a.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                format: config.logging().format,
            },
            None => config.logging().clone(),
        };

        init_tracing(&log_config).map_err(|e| ExtensionError::config(e.to_string()))?;

        let bus = Arc::new(EventBus::new(&name));
        let (host, event_loop) = MqttHost::new(config.mqtt(), bus);

        tracing::info!(
            runner = %name,
            broker = %format!("{}:{}", config.mqtt().host, config.mqtt().port),
            base_topic = %config.mqtt().base_topic,
            "Connecting to MQTT broker"
        );

        let mut runner = Self::with_context(name, config, host.context());
        runner.mqtt = Some(host);
        runner.spawn(event_loop.run());

        Ok(runner)
    }

    /// Create a runner over an existing host context.
    ///
    /// Does not initialize logging or connect anywhere.
    pub fn with_context(name: impl Into<String>, config: C, context: HostContext) -> Self {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        tracing::info!(runner = %name, version = %version, "Starting extension host");

        let publisher = Publisher::new(context.sink.clone(), "");

        Self {
            name,
            version,
            config,
            context,
            mqtt: None,
            publisher,
            status_publisher: None,
            extensions: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Enable status publishing on `extensions/<name>/status`.
    pub fn with_status_publishing(mut self) -> Self {
        self.status_publisher = Some(StatusPublisher::new(
            self.publisher.clone(),
            &self.name,
            &self.version,
        ));
        self
    }

    /// Get the runner name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the runner version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Get the host context handed to extensions.
    pub fn context(&self) -> &HostContext {
        &self.context
    }

    /// Get a clone of the publisher.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Register an extension. Extensions start in registration order.
    pub fn add<E: Extension + 'static>(&mut self, extension: E) {
        self.extensions.push(ManagedExtension {
            extension: Box::new(extension),
            running: false,
        });
    }

    /// Names of the registered extensions.
    pub fn extension_names(&self) -> Vec<&str> {
        self.extensions.iter().map(|m| m.extension.name()).collect()
    }

    /// Names of the extensions currently running.
    pub fn running_extensions(&self) -> Vec<&str> {
        self.extensions
            .iter()
            .filter(|m| m.running)
            .map(|m| m.extension.name())
            .collect()
    }

    /// Spawn a background task.
    ///
    /// The task will be tracked and aborted on shutdown.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks.push(handle);
    }

    /// Start every registered extension that is not running.
    ///
    /// A failing start is logged and reported; the remaining extensions are
    /// still started. Returns the number of extensions started.
    pub async fn start_extensions(&mut self) -> usize {
        let mut started = 0;

        for managed in self.extensions.iter_mut().filter(|m| !m.running) {
            let name = managed.extension.name().to_string();
            match managed.extension.start().await {
                Ok(()) => {
                    managed.running = true;
                    started += 1;
                    tracing::info!(extension = %name, "Extension started");
                }
                Err(e) => {
                    tracing::error!(extension = %name, error = %e, "Extension failed to start");
                    if let Some(ref status_pub) = self.status_publisher {
                        let report = format!("{}: {}", name, e);
                        if let Err(e) = status_pub.publish_error(report) {
                            tracing::warn!(error = %e, "Failed to publish error status");
                        }
                    }
                }
            }
        }

        started
    }

    /// Stop running extensions in reverse registration order.
    ///
    /// Returns the number of extensions stopped.
    pub async fn stop_extensions(&mut self) -> usize {
        let mut stopped = 0;

        for managed in self.extensions.iter_mut().rev().filter(|m| m.running) {
            let name = managed.extension.name().to_string();
            if let Err(e) = managed.extension.stop().await {
                tracing::warn!(extension = %name, error = %e, "Extension failed to stop cleanly");
            }
            managed.running = false;
            stopped += 1;
            tracing::info!(extension = %name, "Extension stopped");
        }

        stopped
    }

    /// Run the extensions until Ctrl+C is received.
    ///
    /// This will:
    /// 1. Start all extensions
    /// 2. Publish "running" status (if enabled)
    /// 3. Wait for Ctrl+C signal
    /// 4. Stop extensions in reverse order
    /// 5. Abort all spawned tasks
    /// 6. Publish "offline" status (if enabled)
    /// 7. Disconnect from the broker
    pub async fn run(self) -> Result<()> {
        self.run_with_metadata(None).await
    }

    /// Run with custom status metadata.
    ///
    /// Without metadata, the running status lists the started extensions.
    pub async fn run_with_metadata(mut self, metadata: Option<serde_json::Value>) -> Result<()> {
        self.start_extensions().await;

        if let Some(ref status_pub) = self.status_publisher {
            let metadata = metadata.unwrap_or_else(|| {
                serde_json::json!({ "extensions": self.running_extensions() })
            });
            if let Err(e) = status_pub.publish_running(Some(metadata)) {
                tracing::warn!(error = %e, "Failed to publish running status");
            }
        }

        tracing::info!(
            runner = %self.name,
            extensions = self.running_extensions().len(),
            tasks = self.tasks.len(),
            "Extension host running. Press Ctrl+C to stop."
        );

        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }

        tracing::info!(runner = %self.name, "Received shutdown signal");

        self.stop_extensions().await;

        if let Some(ref status_pub) = self.status_publisher {
            if let Err(e) = status_pub.publish_offline() {
                tracing::warn!(error = %e, "Failed to publish offline status");
            }
        }

        if let Some(ref mqtt) = self.mqtt {
            if let Err(e) = mqtt.disconnect().await {
                tracing::warn!(error = %e, "Error disconnecting from MQTT broker");
            }
            // Let the event loop flush the offline status and disconnect.
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        for task in &self.tasks {
            task.abort();
        }

        tracing::info!(runner = %self.name, "Goodbye!");

        Ok(())
    }
}

/// Convenience function to run an extension host with minimal boilerplate.
///
/// # Example
///
/// ```ignore
/// use z2m_extension_framework::{run_extension_host, ExtensionConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     run_extension_host::<MyConfig, _>("myext", "myext.json5", |runner| {
///         let extension = MyExtension::new(runner.context().clone());
///         runner.add(extension);
///         Ok(())
///     }).await
/// }
/// ```
pub async fn run_extension_host<C, F>(
    name: &str,
    default_config: &'static str,
    setup: F,
) -> anyhow::Result<()>
where
    C: ExtensionConfig,
    F: FnOnce(&mut ExtensionRunner<C>) -> Result<()>,
{
    let args = ExtensionArgs::parse_with_default(default_config);
    let config = C::load(&args.config).map_err(|e| anyhow::anyhow!("{}", e))?;

    let mut runner = ExtensionRunner::new_with_args(name, config, Some(&args))
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?
        .with_status_publishing();

    setup(&mut runner).map_err(|e| anyhow::anyhow!("{}", e))?;

    runner.run().await.map_err(|e| anyhow::anyhow!("{}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use z2m_common::{InMemoryNetwork, MqttConfig, RecordingSink};

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        mqtt: MqttConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    impl ExtensionConfig for TestConfig {
        fn mqtt(&self) -> &MqttConfig {
            &self.mqtt
        }

        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }
    }

    struct Probe {
        name: String,
        fail_start: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Extension for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&mut self) -> Result<()> {
            if self.fail_start {
                return Err(ExtensionError::lifecycle(&self.name, "refused"));
            }
            self.log.lock().push(format!("start {}", self.name));
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.log.lock().push(format!("stop {}", self.name));
            Ok(())
        }
    }

    fn runner() -> (ExtensionRunner<TestConfig>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let context = HostContext::new(
            Arc::new(EventBus::new("test")),
            Arc::new(InMemoryNetwork::new()),
            sink.clone(),
        );
        let config = TestConfig {
            mqtt: MqttConfig::default(),
            logging: LoggingConfig::default(),
        };
        let runner = ExtensionRunner::with_context("test", config, context).with_status_publishing();
        (runner, sink)
    }

    fn probe(name: &str, fail_start: bool, log: &Arc<Mutex<Vec<String>>>) -> Probe {
        Probe {
            name: name.to_string(),
            fail_start,
            log: log.clone(),
        }
    }

    #[tokio::test]
    async fn test_start_in_order_stop_in_reverse() {
        let (mut runner, _) = runner();
        let log = Arc::new(Mutex::new(Vec::new()));
        runner.add(probe("a", false, &log));
        runner.add(probe("b", false, &log));

        assert_eq!(runner.start_extensions().await, 2);
        assert_eq!(runner.stop_extensions().await, 2);

        assert_eq!(*log.lock(), vec!["start a", "start b", "stop b", "stop a"]);
    }

    #[tokio::test]
    async fn test_failed_start_does_not_block_others() {
        let (mut runner, sink) = runner();
        let log = Arc::new(Mutex::new(Vec::new()));
        runner.add(probe("exporter", true, &log));
        runner.add(probe("remote", false, &log));

        assert_eq!(runner.start_extensions().await, 1);
        assert_eq!(runner.running_extensions(), vec!["remote"]);
        assert_eq!(runner.extension_names(), vec!["exporter", "remote"]);

        let status = sink.payloads_for("extensions/test/status");
        assert_eq!(status.len(), 1);
        assert!(status[0].contains("\"error\""));

        // Only the running extension is stopped.
        assert_eq!(runner.stop_extensions().await, 1);
        assert_eq!(*log.lock(), vec!["start remote", "stop remote"]);
    }

    #[tokio::test]
    async fn test_start_twice_is_noop_for_running() {
        let (mut runner, _) = runner();
        let log = Arc::new(Mutex::new(Vec::new()));
        runner.add(probe("a", false, &log));

        assert_eq!(runner.start_extensions().await, 1);
        assert_eq!(runner.start_extensions().await, 0);
        assert_eq!(runner.stop_extensions().await, 1);
        assert_eq!(runner.stop_extensions().await, 0);
    }
}
