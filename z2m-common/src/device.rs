use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// A 64-bit IEEE hardware address, e.g. `0x00158d0001a2b3c4`.
///
/// Always stored normalized: `0x` followed by 16 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IeeeAddr(u64);

impl IeeeAddr {
    /// Parse an address with an optional `0x` prefix and 1 to 16 hex digits.
    pub fn parse(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if digits.is_empty() || digits.len() > 16 {
            return Err(Error::InvalidAddress(s.to_string()));
        }

        u64::from_str_radix(digits, 16)
            .map(IeeeAddr)
            .map_err(|_| Error::InvalidAddress(s.to_string()))
    }

    /// The numeric value of the address.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for IeeeAddr {
    fn from(v: u64) -> Self {
        IeeeAddr(v)
    }
}

impl FromStr for IeeeAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        IeeeAddr::parse(s)
    }
}

impl fmt::Display for IeeeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl Serialize for IeeeAddr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IeeeAddr {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        IeeeAddr::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Role of a device in the Zigbee network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Coordinator,
    Router,
    EndDevice,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Vendor/model pair identifying a supported device definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDefinition {
    pub vendor: String,
    pub model: String,
}

impl DeviceDefinition {
    pub fn new(vendor: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            model: model.into(),
        }
    }

    /// Check whether this definition is the given vendor/model.
    pub fn is(&self, vendor: &str, model: &str) -> bool {
        self.vendor == vendor && self.model == model
    }
}

/// A device known to the network, as seen by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    /// Hardware address (primary key).
    pub ieee_addr: IeeeAddr,

    /// User-facing name in the bridge.
    pub friendly_name: String,

    /// Network role.
    pub device_type: DeviceType,

    /// Supported-device definition, when the device was recognised.
    pub definition: Option<DeviceDefinition>,

    /// Unix epoch milliseconds of the last message from this device.
    pub last_seen: Option<i64>,

    /// Last reported link quality (0-255).
    pub link_quality: Option<u8>,

    /// Last reported battery level, for battery-powered devices.
    pub battery: Option<f64>,

    /// Whether the interview completed.
    pub interview_completed: bool,
}

impl DeviceRecord {
    /// Create a record with only an address; the friendly name defaults to it.
    pub fn new(ieee_addr: IeeeAddr, device_type: DeviceType) -> Self {
        Self {
            friendly_name: ieee_addr.to_string(),
            ieee_addr,
            device_type,
            definition: None,
            last_seen: None,
            link_quality: None,
            battery: None,
            interview_completed: true,
        }
    }

    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = name.into();
        self
    }

    pub fn with_definition(mut self, vendor: impl Into<String>, model: impl Into<String>) -> Self {
        self.definition = Some(DeviceDefinition::new(vendor, model));
        self
    }

    pub fn with_last_seen(mut self, timestamp_ms: i64) -> Self {
        self.last_seen = Some(timestamp_ms);
        self
    }

    pub fn with_link_quality(mut self, lqi: u8) -> Self {
        self.link_quality = Some(lqi);
        self
    }

    pub fn with_battery(mut self, battery: f64) -> Self {
        self.battery = Some(battery);
        self
    }

    pub fn is_coordinator(&self) -> bool {
        self.device_type == DeviceType::Coordinator
    }

    /// Check whether the device matches the given vendor/model.
    pub fn is_model(&self, vendor: &str, model: &str) -> bool {
        self.definition
            .as_ref()
            .is_some_and(|d| d.is(vendor, model))
    }
}

/// Coordinator firmware identification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorVersion {
    /// Coordinator type, e.g. "zStack3x0".
    pub kind: Option<String>,
    /// Firmware revision.
    pub revision: Option<String>,
}

impl fmt::Display for CoordinatorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            self.kind.as_deref().unwrap_or("unknown"),
            self.revision.as_deref().unwrap_or("unknown")
        )
    }
}

/// Get current Unix epoch milliseconds.
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
