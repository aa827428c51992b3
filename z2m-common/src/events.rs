//! Events delivered on the host event bus.

use serde_json::{Map, Value};

use crate::device::{DeviceRecord, IeeeAddr};

/// Topic a subscriber can listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DeviceMessage,
    StateChange,
    DeviceJoined,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DeviceMessage => "device_message",
            EventKind::StateChange => "state_change",
            EventKind::DeviceJoined => "device_joined",
        }
    }
}

/// A raw ZCL message received from a device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMessage {
    /// The sending device.
    pub device: DeviceRecord,
    /// Group the message was addressed to, if any.
    pub group_id: Option<u16>,
    /// Cluster name, e.g. "genOnOff".
    pub cluster: String,
    /// Message type, e.g. "commandOn" or "attributeReport".
    pub command: String,
    /// Source endpoint.
    pub endpoint: Option<u8>,
    /// Decoded command payload.
    pub data: Value,
}

impl DeviceMessage {
    pub fn new(device: DeviceRecord, cluster: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            device,
            group_id: None,
            cluster: cluster.into(),
            command: command.into(),
            endpoint: None,
            data: Value::Object(Map::new()),
        }
    }

    pub fn with_group(mut self, group_id: u16) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_endpoint(mut self, endpoint: u8) -> Self {
        self.endpoint = Some(endpoint);
        self
    }
}

/// A change in the published state of a device.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub ieee_addr: IeeeAddr,
    /// State before the update.
    pub from: Map<String, Value>,
    /// State after the update.
    pub to: Map<String, Value>,
}

/// A device joined the network.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceJoined {
    pub device: DeviceRecord,
}

/// An event on the host bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    DeviceMessage(DeviceMessage),
    StateChange(StateChange),
    DeviceJoined(DeviceJoined),
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::DeviceMessage(_) => EventKind::DeviceMessage,
            BusEvent::StateChange(_) => EventKind::StateChange,
            BusEvent::DeviceJoined(_) => EventKind::DeviceJoined,
        }
    }
}

impl From<DeviceMessage> for BusEvent {
    fn from(m: DeviceMessage) -> Self {
        BusEvent::DeviceMessage(m)
    }
}

impl From<StateChange> for BusEvent {
    fn from(s: StateChange) -> Self {
        BusEvent::StateChange(s)
    }
}

impl From<DeviceJoined> for BusEvent {
    fn from(j: DeviceJoined) -> Self {
        BusEvent::DeviceJoined(j)
    }
}
