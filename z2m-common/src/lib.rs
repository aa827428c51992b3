//! Shared host model for zigbee2mqtt extensions.
//!
//! - [`device`] - IEEE addresses, device records, coordinator version
//! - [`events`] - Events carried on the host bus
//! - [`bus`] - In-process event bus with token-based subscriptions
//! - [`host`] - Collaborator traits (`NetworkState`, `PublishSink`) and `HostContext`
//! - [`memory`] - In-memory network store and recording sink
//! - [`topics`] - zigbee2mqtt topic builders and parsers
//! - [`config`] - MQTT and logging configuration sections
//! - [`error`] - Error types

pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod host;
pub mod memory;
pub mod topics;

// Re-export commonly used types at the crate root
pub use bus::{EventBus, SubscriptionToken};
pub use config::{LogFormat, LoggingConfig, MqttConfig};
pub use device::{
    CoordinatorVersion, DeviceDefinition, DeviceRecord, DeviceType, IeeeAddr,
    current_timestamp_millis,
};
pub use error::{Error, Result};
pub use events::{BusEvent, DeviceJoined, DeviceMessage, EventKind, StateChange};
pub use host::{HostContext, NetworkState, PublishSink};
pub use memory::{InMemoryNetwork, PublishedMessage, RecordingSink};
pub use topics::{DEFAULT_BASE_TOPIC, ParsedTopic, TopicBuilder, parse_topic};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Example
///
/// ```ignore
/// use z2m_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "debug".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))
}
