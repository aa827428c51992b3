//! In-memory implementations of the host collaborators.
//!
//! [`InMemoryNetwork`] is the state store behind the MQTT host adapter and
//! the fixture used in tests. [`RecordingSink`] captures publishes.

use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock};

use crate::device::{CoordinatorVersion, DeviceRecord, IeeeAddr};
use crate::error::Result;
use crate::host::{NetworkState, PublishSink};

#[derive(Debug, Default)]
struct NetworkInner {
    devices: BTreeMap<IeeeAddr, DeviceRecord>,
    broker_connected: bool,
    permit_join: bool,
    coordinator: Option<CoordinatorVersion>,
}

/// Thread-safe network state keyed by IEEE address.
///
/// Devices are enumerated in address order.
#[derive(Debug, Default)]
pub struct InMemoryNetwork {
    inner: RwLock<NetworkInner>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a device.
    pub fn upsert_device(&self, device: DeviceRecord) {
        self.inner.write().devices.insert(device.ieee_addr, device);
    }

    /// Replace the whole device list, keeping dynamic readings of devices
    /// that remain (last seen, link quality, battery).
    pub fn replace_devices(&self, devices: Vec<DeviceRecord>) {
        let mut inner = self.inner.write();
        let mut next = BTreeMap::new();

        for mut device in devices {
            if let Some(previous) = inner.devices.get(&device.ieee_addr) {
                device.last_seen = device.last_seen.or(previous.last_seen);
                device.link_quality = device.link_quality.or(previous.link_quality);
                device.battery = device.battery.or(previous.battery);
            }
            next.insert(device.ieee_addr, device);
        }

        inner.devices = next;
    }

    /// Apply a mutation to a known device. Returns `false` if it is unknown.
    pub fn update_device<F>(&self, ieee_addr: &IeeeAddr, update: F) -> bool
    where
        F: FnOnce(&mut DeviceRecord),
    {
        match self.inner.write().devices.get_mut(ieee_addr) {
            Some(device) => {
                update(device);
                true
            }
            None => false,
        }
    }

    pub fn remove_device(&self, ieee_addr: &IeeeAddr) -> Option<DeviceRecord> {
        self.inner.write().devices.remove(ieee_addr)
    }

    pub fn device(&self, ieee_addr: &IeeeAddr) -> Option<DeviceRecord> {
        self.inner.read().devices.get(ieee_addr).cloned()
    }

    pub fn find_by_friendly_name(&self, name: &str) -> Option<DeviceRecord> {
        self.inner
            .read()
            .devices
            .values()
            .find(|d| d.friendly_name == name)
            .cloned()
    }

    pub fn device_count(&self) -> usize {
        self.inner.read().devices.len()
    }

    pub fn set_broker_connected(&self, connected: bool) {
        self.inner.write().broker_connected = connected;
    }

    pub fn set_permit_join_flag(&self, enabled: bool) {
        self.inner.write().permit_join = enabled;
    }

    pub fn set_coordinator(&self, coordinator: CoordinatorVersion) {
        self.inner.write().coordinator = Some(coordinator);
    }
}

impl NetworkState for InMemoryNetwork {
    fn devices(&self) -> Vec<DeviceRecord> {
        self.inner.read().devices.values().cloned().collect()
    }

    fn broker_connected(&self) -> bool {
        self.inner.read().broker_connected
    }

    fn permit_join(&self) -> bool {
        self.inner.read().permit_join
    }

    fn set_permit_join(&self, enabled: bool) -> Result<()> {
        self.set_permit_join_flag(enabled);
        Ok(())
    }

    fn coordinator(&self) -> Option<CoordinatorVersion> {
        self.inner.read().coordinator.clone()
    }
}

/// A publish captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
}

/// A [`PublishSink`] that keeps every message it is given.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<PublishedMessage>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().clone()
    }

    /// Messages published to one topic, in order.
    pub fn payloads_for(&self, topic: &str) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl PublishSink for RecordingSink {
    fn publish(&self, topic: &str, payload: String) {
        self.messages.lock().push(PublishedMessage {
            topic: topic.to_string(),
            payload,
        });
    }
}
