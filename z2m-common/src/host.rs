//! Collaborators supplied by the host to every extension.

use std::fmt;
use std::sync::Arc;

use crate::bus::EventBus;
use crate::device::{CoordinatorVersion, DeviceRecord};
use crate::error::Result;

/// Read access to live network state, plus the permit-join switch.
pub trait NetworkState: Send + Sync {
    /// All known devices, including the coordinator, in a stable order.
    fn devices(&self) -> Vec<DeviceRecord>;

    /// Whether the bridge is connected to the downstream MQTT broker.
    fn broker_connected(&self) -> bool;

    /// Whether the network currently permits joining.
    fn permit_join(&self) -> bool;

    /// Request a change of the permit-join mode.
    fn set_permit_join(&self, enabled: bool) -> Result<()>;

    /// Coordinator firmware, when known.
    fn coordinator(&self) -> Option<CoordinatorVersion>;
}

/// Fire-and-forget publishing to the downstream broker.
///
/// Topics are relative to the host's base topic.
pub trait PublishSink: Send + Sync {
    fn publish(&self, topic: &str, payload: String);
}

/// Everything an extension receives from its host.
#[derive(Clone)]
pub struct HostContext {
    pub bus: Arc<EventBus>,
    pub network: Arc<dyn NetworkState>,
    pub sink: Arc<dyn PublishSink>,
}

impl HostContext {
    pub fn new(
        bus: Arc<EventBus>,
        network: Arc<dyn NetworkState>,
        sink: Arc<dyn PublishSink>,
    ) -> Self {
        Self { bus, network, sink }
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}
