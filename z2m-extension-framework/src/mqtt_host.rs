//! MQTT-backed host.
//!
//! Mirrors a zigbee2mqtt instance from its MQTT topics into an
//! [`InMemoryNetwork`] and the event bus:
//!
//! - `bridge/devices` replaces the device list
//! - `bridge/info` carries permit join and coordinator firmware
//! - `bridge/state` tracks whether the bridge is online
//! - `bridge/event` raises `DeviceJoined` and removes devices that left
//! - `<device>` state payloads update readings and raise `StateChange`;
//!   remote-control actions are re-emitted as `DeviceMessage`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, trace, warn};

use z2m_common::{
    CoordinatorVersion, DeviceDefinition, DeviceJoined, DeviceMessage, DeviceRecord, DeviceType,
    EventBus, HostContext, IeeeAddr, InMemoryNetwork, MqttConfig, NetworkState, ParsedTopic,
    PublishSink, StateChange, TopicBuilder, current_timestamp_millis, parse_topic,
};

use crate::error::Result;

/// Capacity of the rumqttc request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 100;

/// Entry of the `bridge/devices` list.
#[derive(Debug, Deserialize)]
struct BridgeDevice {
    ieee_address: IeeeAddr,
    #[serde(default)]
    friendly_name: Option<String>,
    #[serde(rename = "type", default)]
    device_type: DeviceType,
    #[serde(default)]
    definition: Option<DeviceDefinition>,
    #[serde(default)]
    interview_completed: bool,
}

impl From<BridgeDevice> for DeviceRecord {
    fn from(d: BridgeDevice) -> Self {
        let mut record = DeviceRecord::new(d.ieee_address, d.device_type);
        if let Some(name) = d.friendly_name {
            record.friendly_name = name;
        }
        record.definition = d.definition;
        record.interview_completed = d.interview_completed;
        record
    }
}

#[derive(Debug, Deserialize)]
struct BridgeInfo {
    #[serde(default)]
    permit_join: bool,
    #[serde(default)]
    coordinator: Option<BridgeCoordinator>,
}

#[derive(Debug, Deserialize)]
struct BridgeCoordinator {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    meta: Option<Value>,
}

impl From<BridgeCoordinator> for CoordinatorVersion {
    fn from(c: BridgeCoordinator) -> Self {
        let revision = c
            .meta
            .as_ref()
            .and_then(|meta| meta.get("revision"))
            .and_then(|r| match r {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        CoordinatorVersion {
            kind: c.kind,
            revision,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BridgeEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Publish sink backed by the MQTT client.
///
/// Topics are made absolute under the base topic. Publishing never waits;
/// a full request queue drops the message with a warning.
#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
    topics: TopicBuilder,
}

impl MqttSink {
    pub fn new(client: AsyncClient, topics: TopicBuilder) -> Self {
        Self { client, topics }
    }
}

impl PublishSink for MqttSink {
    fn publish(&self, topic: &str, payload: String) {
        let topic = self.topics.absolute(topic);
        if let Err(e) = self
            .client
            .try_publish(topic.as_str(), QoS::AtMostOnce, false, payload)
        {
            warn!(%topic, error = %e, "Failed to queue MQTT publish");
        }
    }
}

/// Network state mirrored from the bridge, with permit join requested over MQTT.
pub struct MqttNetwork {
    state: Arc<InMemoryNetwork>,
    sink: MqttSink,
}

impl MqttNetwork {
    pub fn new(state: Arc<InMemoryNetwork>, sink: MqttSink) -> Self {
        Self { state, sink }
    }
}

impl NetworkState for MqttNetwork {
    fn devices(&self) -> Vec<DeviceRecord> {
        self.state.devices()
    }

    fn broker_connected(&self) -> bool {
        self.state.broker_connected()
    }

    fn permit_join(&self) -> bool {
        self.state.permit_join()
    }

    fn set_permit_join(&self, enabled: bool) -> z2m_common::Result<()> {
        let topic = self.sink.topics.bridge("request/permit_join");
        self.sink
            .client
            .try_publish(
                topic.as_str(),
                QoS::AtLeastOnce,
                false,
                json!({ "value": enabled }).to_string(),
            )
            .map_err(|e| z2m_common::Error::Host(e.to_string()))
    }

    fn coordinator(&self) -> Option<CoordinatorVersion> {
        self.state.coordinator()
    }
}

/// Translates inbound zigbee2mqtt messages into network state and bus events.
pub struct MessageHandler {
    base_topic: String,
    network: Arc<InMemoryNetwork>,
    bus: Arc<EventBus>,
    states: Mutex<HashMap<IeeeAddr, Map<String, Value>>>,
}

impl MessageHandler {
    pub fn new(
        base_topic: impl Into<String>,
        network: Arc<InMemoryNetwork>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            base_topic: base_topic.into(),
            network,
            bus,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one inbound message. Topics outside the base topic and device
    /// sub-topics are ignored.
    pub fn handle_message(&self, topic: &str, payload: &[u8]) -> Result<()> {
        match parse_topic(&self.base_topic, topic) {
            Some(ParsedTopic::Bridge(name)) => self.handle_bridge(name, payload),
            Some(ParsedTopic::Device { name, suffix: None }) => self.handle_device_state(name, payload),
            Some(ParsedTopic::Device { .. }) | None => {
                trace!(%topic, "Ignoring topic");
                Ok(())
            }
        }
    }

    fn handle_bridge(&self, name: &str, payload: &[u8]) -> Result<()> {
        match name {
            "devices" => {
                let devices: Vec<BridgeDevice> = serde_json::from_slice(payload)?;
                let records: Vec<DeviceRecord> = devices.into_iter().map(Into::into).collect();
                debug!(count = records.len(), "Device list updated");
                self.network.replace_devices(records);
            }
            "info" => {
                let info: BridgeInfo = serde_json::from_slice(payload)?;
                self.network.set_permit_join_flag(info.permit_join);
                if let Some(coordinator) = info.coordinator {
                    self.network.set_coordinator(coordinator.into());
                }
            }
            "state" => {
                let online = match serde_json::from_slice::<Value>(payload) {
                    Ok(Value::Object(map)) => map.get("state").and_then(Value::as_str) == Some("online"),
                    _ => payload == b"online",
                };
                info!(online, "Bridge state changed");
                self.network.set_broker_connected(online);
            }
            "event" => {
                let event: BridgeEvent = serde_json::from_slice(payload)?;
                self.handle_bridge_event(event)?;
            }
            _ => trace!(bridge_topic = name, "Ignoring bridge topic"),
        }
        Ok(())
    }

    fn handle_bridge_event(&self, event: BridgeEvent) -> Result<()> {
        let Some(addr) = event.data.get("ieee_address").and_then(Value::as_str) else {
            return Ok(());
        };
        let ieee_addr = IeeeAddr::parse(addr)?;

        match event.kind.as_str() {
            "device_joined" => {
                let device = match self.network.device(&ieee_addr) {
                    Some(device) => device,
                    None => {
                        let mut device = DeviceRecord::new(ieee_addr, DeviceType::Unknown);
                        if let Some(name) = event.data.get("friendly_name").and_then(Value::as_str) {
                            device.friendly_name = name.to_string();
                        }
                        device.interview_completed = false;
                        self.network.upsert_device(device.clone());
                        device
                    }
                };
                info!(ieee_addr = %ieee_addr, "Device joined");
                self.bus.emit(DeviceJoined { device });
            }
            "device_leave" => {
                info!(ieee_addr = %ieee_addr, "Device left");
                self.network.remove_device(&ieee_addr);
                self.states.lock().remove(&ieee_addr);
            }
            other => trace!(event = other, "Ignoring bridge event"),
        }
        Ok(())
    }

    fn handle_device_state(&self, name: &str, payload: &[u8]) -> Result<()> {
        let Some(device) = self.network.find_by_friendly_name(name) else {
            trace!(device = name, "State for unknown device");
            return Ok(());
        };

        let Ok(Value::Object(update)) = serde_json::from_slice::<Value>(payload) else {
            trace!(device = name, "Non-object state payload");
            return Ok(());
        };

        let ieee_addr = device.ieee_addr;
        let last_seen = update
            .get("last_seen")
            .and_then(parse_last_seen)
            .unwrap_or_else(current_timestamp_millis);

        self.network.update_device(&ieee_addr, |d| {
            d.last_seen = Some(last_seen);
            if let Some(lqi) = update.get("linkquality").and_then(Value::as_u64) {
                d.link_quality = u8::try_from(lqi).ok();
            }
            if let Some(battery) = update.get("battery").and_then(Value::as_f64) {
                d.battery = Some(battery);
            }
        });

        let (from, to) = {
            let mut states = self.states.lock();
            let state = states.entry(ieee_addr).or_default();
            let from = state.clone();
            for (key, value) in &update {
                state.insert(key.clone(), value.clone());
            }
            (from, state.clone())
        };

        self.bus.emit(StateChange {
            ieee_addr,
            from,
            to,
        });

        if let Some(message) = self
            .network
            .device(&ieee_addr)
            .and_then(|device| action_message(device, &update))
        {
            self.bus.emit(message);
        }

        Ok(())
    }
}

/// Parse `last_seen` as epoch milliseconds or an RFC 3339 string.
fn parse_last_seen(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

/// Rebuild the cluster command behind a remote-control action.
fn action_message(device: DeviceRecord, update: &Map<String, Value>) -> Option<DeviceMessage> {
    let action = update.get("action")?.as_str()?;
    let group = u16::try_from(update.get("action_group")?.as_u64()?).ok()?;

    let message = match action {
        "on" => DeviceMessage::new(device, "genOnOff", "commandOn"),
        "off" => DeviceMessage::new(device, "genOnOff", "commandOff"),
        "brightness_move_to_level" => {
            let level = update.get("action_level")?;
            DeviceMessage::new(device, "genLevelCtrl", "commandMoveToLevel")
                .with_data(json!({ "level": level }))
        }
        "color_temperature_move" => {
            let colortemp = update.get("action_color_temperature")?;
            DeviceMessage::new(device, "lightingColorCtrl", "commandMoveToColorTemp")
                .with_data(json!({ "colortemp": colortemp }))
        }
        _ => return None,
    };

    Some(message.with_group(group))
}

/// Drives the MQTT connection. Run it on its own task.
pub struct MqttEventLoop {
    event_loop: EventLoop,
    client: AsyncClient,
    handler: MessageHandler,
    subscription: String,
    reconnect_delay: Duration,
}

impl MqttEventLoop {
    /// Poll the connection until the task is aborted.
    ///
    /// Connection errors mark the broker as disconnected; rumqttc reconnects
    /// on the next poll.
    pub async fn run(mut self) {
        info!(topic = %self.subscription, "Starting MQTT event loop");

        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                    self.handler.network.set_broker_connected(true);
                    if let Err(e) = self
                        .client
                        .try_subscribe(self.subscription.as_str(), QoS::AtMostOnce)
                    {
                        error!(error = %e, "Failed to subscribe");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Err(e) = self.handler.handle_message(&publish.topic, &publish.payload) {
                        debug!(topic = %publish.topic, error = %e, "Failed to handle message");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    self.handler.network.set_broker_connected(false);
                    error!(error = %e, "MQTT connection error");
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }
}

/// Host backed by a zigbee2mqtt instance reachable over MQTT.
pub struct MqttHost {
    client: AsyncClient,
    network: Arc<InMemoryNetwork>,
    context: HostContext,
}

impl MqttHost {
    /// Create the host and its event loop. Nothing connects until the event
    /// loop is polled.
    pub fn new(config: &MqttConfig, bus: Arc<EventBus>) -> (Self, MqttEventLoop) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive());

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let topics = TopicBuilder::new(&config.base_topic);
        let network = Arc::new(InMemoryNetwork::new());
        let sink = MqttSink::new(client.clone(), topics.clone());

        let context = HostContext::new(
            bus.clone(),
            Arc::new(MqttNetwork::new(network.clone(), sink.clone())),
            Arc::new(sink),
        );

        let event_loop = MqttEventLoop {
            event_loop,
            client: client.clone(),
            handler: MessageHandler::new(topics.base(), network.clone(), bus),
            subscription: topics.wildcard(),
            reconnect_delay: config.reconnect_delay(),
        };

        (
            Self {
                client,
                network,
                context,
            },
            event_loop,
        )
    }

    /// Context handed to extensions.
    pub fn context(&self) -> HostContext {
        self.context.clone()
    }

    /// The mirrored network state.
    pub fn network(&self) -> &Arc<InMemoryNetwork> {
        &self.network
    }

    /// Request a clean disconnect from the broker.
    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}
