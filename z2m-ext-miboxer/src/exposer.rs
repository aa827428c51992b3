//! The `miboxer-fut089z/controls-exposer` extension.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};
use z2m_common::{
    BusEvent, DeviceMessage, DeviceRecord, EventKind, HostContext, IeeeAddr, SubscriptionToken,
};
use z2m_extension_framework::{Extension, ExtensionError, Publisher};

use crate::config::RemoteConfig;
use crate::decoder::{DecodeOutcome, EventDecoder, RemoteEventState};

/// Republishes the controls of supported remotes on
/// `<ieee>/action`, `<ieee>/brightness` and `<ieee>/color_temp`.
pub struct ControlsExposer {
    context: HostContext,
    remote: RemoteConfig,
    publisher: Publisher,
    decoder: Arc<Mutex<EventDecoder>>,
    subscriptions: Vec<SubscriptionToken>,
}

impl ControlsExposer {
    pub const NAME: &'static str = "miboxer-fut089z/controls-exposer";

    pub fn new(context: HostContext, remote: RemoteConfig) -> Self {
        let publisher = Publisher::new(context.sink.clone(), "");
        Self {
            context,
            remote,
            publisher,
            decoder: Arc::new(Mutex::new(EventDecoder::new())),
            subscriptions: Vec::new(),
        }
    }

    /// Known devices matching the configured remote.
    pub fn supported_remotes(&self) -> Vec<DeviceRecord> {
        self.context
            .network
            .devices()
            .into_iter()
            .filter(|d| self.remote.matches(d))
            .collect()
    }

    /// Dedup state of a remote.
    pub fn remote_state(&self, addr: &IeeeAddr) -> Option<RemoteEventState> {
        self.decoder.lock().state(addr).cloned()
    }

    pub fn is_running(&self) -> bool {
        !self.subscriptions.is_empty()
    }
}

/// Decode one message and publish the resulting event, if any.
fn expose(
    decoder: &Mutex<EventDecoder>,
    publisher: &Publisher,
    message: &DeviceMessage,
) -> z2m_common::Result<()> {
    let outcome = decoder.lock().decode(message);
    let addr = message.device.ieee_addr;

    match outcome {
        DecodeOutcome::Emit(event) => {
            let topic = format!("{}/{}", addr, event.topic_suffix());
            let payload = event.payload()?;
            debug!(ieee_addr = %addr, %topic, %payload, "Remote control event");
            publisher.publish(&topic, payload);
        }
        DecodeOutcome::Suppressed => {
            debug!(ieee_addr = %addr, "Repeated brightness command dropped");
        }
        DecodeOutcome::Ignored => {}
    }

    Ok(())
}

#[async_trait]
impl Extension for ControlsExposer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn start(&mut self) -> Result<(), ExtensionError> {
        if self.is_running() {
            return Ok(());
        }

        for device in self.supported_remotes() {
            info!(
                ieee_addr = %device.ieee_addr,
                friendly_name = %device.friendly_name,
                "Exposing controls of remote"
            );
        }

        let remote = self.remote.clone();
        self.subscriptions
            .push(self.context.bus.subscribe(EventKind::DeviceJoined, move |event| {
                if let BusEvent::DeviceJoined(joined) = event {
                    if remote.matches(&joined.device) {
                        info!(
                            ieee_addr = %joined.device.ieee_addr,
                            friendly_name = %joined.device.friendly_name,
                            "Remote joined, exposing controls"
                        );
                    }
                }
                Ok(())
            }));

        let remote = self.remote.clone();
        let decoder = self.decoder.clone();
        let publisher = self.publisher.clone();
        self.subscriptions
            .push(self.context.bus.subscribe(EventKind::DeviceMessage, move |event| {
                match event {
                    BusEvent::DeviceMessage(message) if remote.matches(&message.device) => {
                        expose(&decoder, &publisher, message)
                    }
                    _ => Ok(()),
                }
            }));

        info!(vendor = %self.remote.vendor, model = %self.remote.model, "Controls exposer started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ExtensionError> {
        self.context
            .bus
            .unsubscribe_all(self.subscriptions.drain(..));
        info!("Controls exposer stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use z2m_common::{DeviceJoined, DeviceType, EventBus, InMemoryNetwork, RecordingSink};

    const REMOTE: &str = "0x00158d0001a2b3c4";

    struct Fixture {
        network: Arc<InMemoryNetwork>,
        sink: Arc<RecordingSink>,
        bus: Arc<EventBus>,
        exposer: ControlsExposer,
    }

    fn fixture() -> Fixture {
        let network = Arc::new(InMemoryNetwork::new());
        let sink = Arc::new(RecordingSink::new());
        let bus = Arc::new(EventBus::new("test"));
        let context = HostContext::new(bus.clone(), network.clone(), sink.clone());
        let exposer = ControlsExposer::new(context, RemoteConfig::default());
        Fixture {
            network,
            sink,
            bus,
            exposer,
        }
    }

    fn remote() -> DeviceRecord {
        DeviceRecord::new(IeeeAddr::parse(REMOTE).unwrap(), DeviceType::EndDevice)
            .with_friendly_name("living room remote")
            .with_definition("MiBoxer", "FUT089Z")
    }

    fn level(value: u8) -> DeviceMessage {
        DeviceMessage::new(remote(), "genLevelCtrl", "commandMoveToLevel")
            .with_group(103)
            .with_data(json!({ "level": value }))
    }

    #[tokio::test]
    async fn test_publishes_button_press() {
        let mut f = fixture();
        f.exposer.start().await.unwrap();

        f.bus.emit(DeviceMessage::new(remote(), "genOnOff", "commandOn").with_group(105));
        f.bus.emit(DeviceMessage::new(remote(), "genOnOff", "commandOff").with_group(105));

        assert_eq!(
            f.sink.payloads_for(&format!("{REMOTE}/action")),
            vec!["button_group_5_on", "button_group_5_off"]
        );
    }

    #[tokio::test]
    async fn test_brightness_is_deduplicated() {
        let mut f = fixture();
        f.exposer.start().await.unwrap();

        f.bus.emit(level(120));
        f.bus.emit(level(120));
        f.bus.emit(level(121));

        assert_eq!(
            f.sink.payloads_for(&format!("{REMOTE}/brightness")),
            vec![
                r#"{"brightness":120,"zone":3}"#,
                r#"{"brightness":121,"zone":3}"#
            ]
        );
        let addr = IeeeAddr::parse(REMOTE).unwrap();
        assert_eq!(
            f.exposer.remote_state(&addr).unwrap().previous_brightness_level,
            Some(121)
        );
    }

    #[tokio::test]
    async fn test_color_temperature() {
        let mut f = fixture();
        f.exposer.start().await.unwrap();

        let msg = DeviceMessage::new(remote(), "lightingColorCtrl", "commandMoveToColorTemp")
            .with_group(101)
            .with_data(json!({ "colortemp": 250 }));
        f.bus.emit(msg.clone());
        f.bus.emit(msg);

        assert_eq!(
            f.sink.payloads_for(&format!("{REMOTE}/color_temp")),
            vec![r#"{"colortemp":250,"zone":1}"#; 2]
        );
    }

    #[tokio::test]
    async fn test_other_devices_are_ignored() {
        let mut f = fixture();
        f.exposer.start().await.unwrap();

        let bulb = DeviceRecord::new(IeeeAddr::from(9), DeviceType::Router)
            .with_definition("IKEA", "LED1545G12");
        f.bus.emit(DeviceMessage::new(bulb, "genOnOff", "commandOn").with_group(101));

        let unknown = DeviceRecord::new(IeeeAddr::from(10), DeviceType::EndDevice);
        f.bus.emit(DeviceMessage::new(unknown, "genOnOff", "commandOn").with_group(101));

        assert!(f.sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_published_after_stop() {
        let mut f = fixture();
        f.exposer.start().await.unwrap();
        assert_eq!(f.bus.subscriber_count(), 2);

        f.exposer.stop().await.unwrap();
        assert_eq!(f.bus.subscriber_count(), 0);
        assert!(!f.exposer.is_running());

        f.bus.emit(DeviceMessage::new(remote(), "genOnOff", "commandOn").with_group(101));
        assert!(f.sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_restart_keeps_dedup_state() {
        let mut f = fixture();
        f.exposer.start().await.unwrap();
        f.bus.emit(level(40));
        f.exposer.stop().await.unwrap();

        f.exposer.start().await.unwrap();
        f.bus.emit(level(40));
        assert_eq!(f.sink.payloads_for(&format!("{REMOTE}/brightness")).len(), 1);
    }

    #[tokio::test]
    async fn test_supported_remotes_and_joins() {
        let mut f = fixture();
        f.network.upsert_device(remote());
        f.network
            .upsert_device(DeviceRecord::new(IeeeAddr::from(0), DeviceType::Coordinator));

        let remotes = f.exposer.supported_remotes();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].friendly_name, "living room remote");

        f.exposer.start().await.unwrap();
        assert_eq!(f.bus.emit(DeviceJoined { device: remote() }), 1);
        assert!(f.sink.messages().is_empty());
    }
}
