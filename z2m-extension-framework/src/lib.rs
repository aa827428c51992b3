//! zigbee2mqtt Extension Framework
//!
//! Common abstractions for building extensions that attach to a
//! zigbee2mqtt host.
//!
//! # Overview
//!
//! This framework provides:
//! - [`Extension`] trait for the start/stop lifecycle
//! - [`ExtensionConfig`] trait for configuration loading and validation
//! - [`ExtensionRunner`] for managing extension lifecycle (startup, shutdown, signal handling)
//! - [`MqttHost`] for mirroring a zigbee2mqtt instance over MQTT
//! - [`Publisher`] for publishing through the host with topic prefixes
//! - [`ExtensionArgs`] for common CLI argument parsing
//! - [`ExtensionStatus`] for standardized status reporting
//!
//! # Example
//!
//! ```ignore
//! use z2m_extension_framework::{ExtensionArgs, ExtensionConfig, ExtensionRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = ExtensionArgs::parse_with_default("myext.json5");
//!     let config = MyConfig::load(&args.config)?;
//!
//!     let mut runner = ExtensionRunner::new_with_args("myext", config, Some(&args)).await?;
//!     runner.add(MyExtension::new(runner.context().clone()));
//!
//!     // Run until Ctrl+C
//!     runner.run().await
//! }
//! ```

mod args;
mod config;
mod error;
mod extension;
mod mqtt_host;
mod publisher;
mod runner;
mod status;

pub use args::ExtensionArgs;
pub use config::ExtensionConfig;
pub use error::{ExtensionError, Result};
pub use extension::Extension;
pub use mqtt_host::{MessageHandler, MqttEventLoop, MqttHost, MqttNetwork, MqttSink};
pub use publisher::Publisher;
pub use runner::{ExtensionRunner, run_extension_host};
pub use status::{ExtensionStatus, StatusPublisher};

// Re-export commonly used types from z2m-common
pub use z2m_common::{
    BusEvent, EventBus, EventKind, HostContext, LogFormat, LoggingConfig, MqttConfig,
    NetworkState, PublishSink, SubscriptionToken,
};
