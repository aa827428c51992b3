//! Decoding of group-addressed remote commands.
//!
//! The remote reports every control as a ZCL command sent to a zone group.
//! The color temperature slider and the color controls also resend the last
//! brightness command, so brightness readings equal to the previously
//! accepted one are suppressed per remote.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::trace;
use z2m_common::{DeviceMessage, IeeeAddr};

use crate::zone::{Zone, zone_for};

pub const CLUSTER_ON_OFF: &str = "genOnOff";
pub const CLUSTER_LEVEL_CONTROL: &str = "genLevelCtrl";
pub const CLUSTER_COLOR_CONTROL: &str = "lightingColorCtrl";

pub const COMMAND_ON: &str = "commandOn";
pub const COMMAND_OFF: &str = "commandOff";
pub const COMMAND_MOVE_TO_LEVEL: &str = "commandMoveToLevel";
pub const COMMAND_MOVE_TO_COLOR_TEMP: &str = "commandMoveToColorTemp";

/// Which side of a zone button was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonEdge {
    On,
    Off,
}

impl ButtonEdge {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonEdge::On => "on",
            ButtonEdge::Off => "off",
        }
    }
}

/// A logical remote control event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    ButtonPress { zone: Zone, edge: ButtonEdge },
    BrightnessChange { zone: Zone, level: u8 },
    ColorTemperatureChange { zone: Zone, mired: Option<u16> },
}

/// `zone` is the decoded zone (group 103 publishes `"zone":3`), not the raw
/// group id.
#[derive(Serialize)]
struct BrightnessPayload {
    brightness: u8,
    zone: Zone,
}

#[derive(Serialize)]
struct ColorTempPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    colortemp: Option<u16>,
    zone: Zone,
}

impl RemoteEvent {
    pub fn zone(&self) -> Zone {
        match self {
            RemoteEvent::ButtonPress { zone, .. }
            | RemoteEvent::BrightnessChange { zone, .. }
            | RemoteEvent::ColorTemperatureChange { zone, .. } => *zone,
        }
    }

    /// Device sub-topic the event is published on.
    pub fn topic_suffix(&self) -> &'static str {
        match self {
            RemoteEvent::ButtonPress { .. } => "action",
            RemoteEvent::BrightnessChange { .. } => "brightness",
            RemoteEvent::ColorTemperatureChange { .. } => "color_temp",
        }
    }

    /// Published payload: a plain action string for buttons, JSON otherwise.
    pub fn payload(&self) -> serde_json::Result<String> {
        match *self {
            RemoteEvent::ButtonPress { zone, edge } => {
                Ok(format!("button_group_{}_{}", zone, edge.as_str()))
            }
            RemoteEvent::BrightnessChange { zone, level } => {
                serde_json::to_string(&BrightnessPayload {
                    brightness: level,
                    zone,
                })
            }
            RemoteEvent::ColorTemperatureChange { zone, mired } => {
                serde_json::to_string(&ColorTempPayload {
                    colortemp: mired,
                    zone,
                })
            }
        }
    }
}

/// Result of decoding one device message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Emit(RemoteEvent),
    /// A brightness reading that repeats the last accepted one or has no level.
    Suppressed,
    /// Not a remote control command.
    Ignored,
}

/// Dedup state of one physical remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteEventState {
    pub previous_brightness_level: Option<u8>,
}

/// Stateful decoder, one per extension instance.
///
/// State is created on a remote's first brightness command and never
/// evicted.
#[derive(Debug, Default)]
pub struct EventDecoder {
    remotes: HashMap<IeeeAddr, RemoteEventState>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a device message. Messages not sent to a group are ignored.
    pub fn decode(&mut self, message: &DeviceMessage) -> DecodeOutcome {
        let Some(group_id) = message.group_id else {
            return DecodeOutcome::Ignored;
        };
        let addr = message.device.ieee_addr;
        let zone = zone_for(group_id, &addr);

        match (message.cluster.as_str(), message.command.as_str()) {
            (CLUSTER_ON_OFF, COMMAND_ON) => DecodeOutcome::Emit(RemoteEvent::ButtonPress {
                zone,
                edge: ButtonEdge::On,
            }),
            (CLUSTER_ON_OFF, COMMAND_OFF) => DecodeOutcome::Emit(RemoteEvent::ButtonPress {
                zone,
                edge: ButtonEdge::Off,
            }),
            (CLUSTER_LEVEL_CONTROL, COMMAND_MOVE_TO_LEVEL) => {
                self.accept_brightness(addr, zone, &message.data)
            }
            (CLUSTER_COLOR_CONTROL, COMMAND_MOVE_TO_COLOR_TEMP) => {
                DecodeOutcome::Emit(RemoteEvent::ColorTemperatureChange {
                    zone,
                    mired: field_as(&message.data, "colortemp"),
                })
            }
            _ => DecodeOutcome::Ignored,
        }
    }

    fn accept_brightness(&mut self, addr: IeeeAddr, zone: Zone, data: &Value) -> DecodeOutcome {
        let Some(level) = field_as::<u8>(data, "level") else {
            return DecodeOutcome::Suppressed;
        };

        let state = self.remotes.entry(addr).or_default();
        if state.previous_brightness_level == Some(level) {
            trace!(ieee_addr = %addr, level, "Repeated brightness suppressed");
            return DecodeOutcome::Suppressed;
        }

        state.previous_brightness_level = Some(level);
        DecodeOutcome::Emit(RemoteEvent::BrightnessChange { zone, level })
    }

    /// Dedup state of a remote, once it sent a brightness command.
    pub fn state(&self, addr: &IeeeAddr) -> Option<&RemoteEventState> {
        self.remotes.get(addr)
    }

    /// Number of remotes with dedup state.
    pub fn tracked_remotes(&self) -> usize {
        self.remotes.len()
    }
}

/// An unsigned integer field that fits `T`; anything else counts as absent.
fn field_as<T: TryFrom<u64>>(data: &Value, key: &str) -> Option<T> {
    data.get(key)?
        .as_u64()
        .and_then(|v| T::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use z2m_common::{DeviceRecord, DeviceType};

    const REMOTE: u64 = 0x00158d0001a2b3c4;

    fn message(group: u16, cluster: &str, command: &str, data: Value) -> DeviceMessage {
        let device = DeviceRecord::new(IeeeAddr::from(REMOTE), DeviceType::EndDevice)
            .with_definition("MiBoxer", "FUT089Z");
        DeviceMessage::new(device, cluster, command)
            .with_group(group)
            .with_data(data)
    }

    fn level(group: u16, level: Value) -> DeviceMessage {
        message(
            group,
            CLUSTER_LEVEL_CONTROL,
            COMMAND_MOVE_TO_LEVEL,
            json!({ "level": level, "transtime": 0 }),
        )
    }

    #[test]
    fn test_button_press() {
        let mut decoder = EventDecoder::new();

        assert_eq!(
            decoder.decode(&message(105, CLUSTER_ON_OFF, COMMAND_ON, json!({}))),
            DecodeOutcome::Emit(RemoteEvent::ButtonPress {
                zone: Zone::new(5),
                edge: ButtonEdge::On
            })
        );
        assert_eq!(
            decoder.decode(&message(101, CLUSTER_ON_OFF, COMMAND_OFF, json!({}))),
            DecodeOutcome::Emit(RemoteEvent::ButtonPress {
                zone: Zone::new(1),
                edge: ButtonEdge::Off
            })
        );
        // Button presses never touch dedup state.
        assert_eq!(decoder.tracked_remotes(), 0);
    }

    #[test]
    fn test_repeated_buttons_are_not_deduplicated() {
        let mut decoder = EventDecoder::new();
        let press = message(103, CLUSTER_ON_OFF, COMMAND_ON, json!({}));

        assert!(matches!(decoder.decode(&press), DecodeOutcome::Emit(_)));
        assert!(matches!(decoder.decode(&press), DecodeOutcome::Emit(_)));
    }

    #[test]
    fn test_brightness_dedup() {
        let mut decoder = EventDecoder::new();
        let addr = IeeeAddr::from(REMOTE);

        assert_eq!(
            decoder.decode(&level(102, json!(120))),
            DecodeOutcome::Emit(RemoteEvent::BrightnessChange {
                zone: Zone::new(2),
                level: 120
            })
        );
        assert_eq!(
            decoder.state(&addr).unwrap().previous_brightness_level,
            Some(120)
        );

        assert_eq!(
            decoder.decode(&level(102, json!(120))),
            DecodeOutcome::Suppressed
        );

        assert_eq!(
            decoder.decode(&level(102, json!(121))),
            DecodeOutcome::Emit(RemoteEvent::BrightnessChange {
                zone: Zone::new(2),
                level: 121
            })
        );
        assert_eq!(
            decoder.state(&addr).unwrap().previous_brightness_level,
            Some(121)
        );
    }

    #[test]
    fn test_brightness_dedup_spans_zones() {
        let mut decoder = EventDecoder::new();

        assert!(matches!(
            decoder.decode(&level(101, json!(80))),
            DecodeOutcome::Emit(_)
        ));
        assert_eq!(decoder.decode(&level(104, json!(80))), DecodeOutcome::Suppressed);
    }

    #[test]
    fn test_brightness_dedup_is_per_remote() {
        let mut decoder = EventDecoder::new();
        let other = DeviceMessage::new(
            DeviceRecord::new(IeeeAddr::from(1), DeviceType::EndDevice),
            CLUSTER_LEVEL_CONTROL,
            COMMAND_MOVE_TO_LEVEL,
        )
        .with_group(101)
        .with_data(json!({ "level": 50 }));

        assert!(matches!(
            decoder.decode(&level(101, json!(50))),
            DecodeOutcome::Emit(_)
        ));
        assert!(matches!(decoder.decode(&other), DecodeOutcome::Emit(_)));
        assert_eq!(decoder.tracked_remotes(), 2);
    }

    #[test]
    fn test_missing_level_is_suppressed_without_state_change() {
        let mut decoder = EventDecoder::new();
        let addr = IeeeAddr::from(REMOTE);

        assert_eq!(decoder.decode(&level(101, Value::Null)), DecodeOutcome::Suppressed);
        assert_eq!(decoder.decode(&level(101, json!(300))), DecodeOutcome::Suppressed);
        assert_eq!(
            decoder.decode(&message(101, CLUSTER_LEVEL_CONTROL, COMMAND_MOVE_TO_LEVEL, json!({}))),
            DecodeOutcome::Suppressed
        );
        assert!(decoder.state(&addr).is_none());

        decoder.decode(&level(101, json!(10)));
        decoder.decode(&level(101, Value::Null));
        assert_eq!(
            decoder.state(&addr).unwrap().previous_brightness_level,
            Some(10)
        );
    }

    #[test]
    fn test_color_temperature_never_suppressed() {
        let mut decoder = EventDecoder::new();
        let msg = message(
            106,
            CLUSTER_COLOR_CONTROL,
            COMMAND_MOVE_TO_COLOR_TEMP,
            json!({ "colortemp": 370, "transtime": 0 }),
        );

        for _ in 0..3 {
            assert_eq!(
                decoder.decode(&msg),
                DecodeOutcome::Emit(RemoteEvent::ColorTemperatureChange {
                    zone: Zone::new(6),
                    mired: Some(370)
                })
            );
        }
        assert_eq!(decoder.tracked_remotes(), 0);
    }

    #[test]
    fn test_color_temperature_without_value() {
        let mut decoder = EventDecoder::new();
        let msg = message(106, CLUSTER_COLOR_CONTROL, COMMAND_MOVE_TO_COLOR_TEMP, json!({}));

        assert_eq!(
            decoder.decode(&msg),
            DecodeOutcome::Emit(RemoteEvent::ColorTemperatureChange {
                zone: Zone::new(6),
                mired: None
            })
        );
    }

    #[test]
    fn test_ignored_messages() {
        let mut decoder = EventDecoder::new();

        assert_eq!(
            decoder.decode(&message(101, CLUSTER_ON_OFF, "commandToggle", json!({}))),
            DecodeOutcome::Ignored
        );
        assert_eq!(
            decoder.decode(&message(101, "genBasic", "attributeReport", json!({}))),
            DecodeOutcome::Ignored
        );
        assert_eq!(
            decoder.decode(&message(101, CLUSTER_COLOR_CONTROL, "commandMoveToHue", json!({}))),
            DecodeOutcome::Ignored
        );

        let ungrouped = DeviceMessage::new(
            DeviceRecord::new(IeeeAddr::from(REMOTE), DeviceType::EndDevice),
            CLUSTER_ON_OFF,
            COMMAND_ON,
        );
        assert_eq!(decoder.decode(&ungrouped), DecodeOutcome::Ignored);
    }

    #[test]
    fn test_implausible_zone_is_emitted() {
        let mut decoder = EventDecoder::new();
        let outcome = decoder.decode(&message(109, CLUSTER_ON_OFF, COMMAND_ON, json!({})));

        let DecodeOutcome::Emit(event) = outcome else {
            panic!("expected an event, got {:?}", outcome);
        };
        assert_eq!(event.zone(), Zone::new(109 - REMOTE as i128));
        assert!(!event.zone().is_printed());
    }

    #[test]
    fn test_payloads() {
        let zone = Zone::new(3);

        let press = RemoteEvent::ButtonPress {
            zone,
            edge: ButtonEdge::Off,
        };
        assert_eq!(press.topic_suffix(), "action");
        assert_eq!(press.payload().unwrap(), "button_group_3_off");

        let brightness = RemoteEvent::BrightnessChange { zone, level: 254 };
        assert_eq!(brightness.topic_suffix(), "brightness");
        assert_eq!(
            brightness.payload().unwrap(),
            r#"{"brightness":254,"zone":3}"#
        );

        let temp = RemoteEvent::ColorTemperatureChange {
            zone,
            mired: Some(153),
        };
        assert_eq!(temp.topic_suffix(), "color_temp");
        assert_eq!(temp.payload().unwrap(), r#"{"colortemp":153,"zone":3}"#);

        let temp = RemoteEvent::ColorTemperatureChange { zone, mired: None };
        assert_eq!(temp.payload().unwrap(), r#"{"zone":3}"#);
    }
}
