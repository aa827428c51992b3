//! Zone numbering of group-addressed remote commands.
//!
//! The remote sends each zone's commands to its own Zigbee group. Firmware
//! using the fixed groups 101..=108 maps to zones 1..=8. Otherwise the group
//! is assumed to be offset by the remote's numeric address.

use std::fmt;

use serde::{Serialize, Serializer};
use z2m_common::IeeeAddr;

/// Group id of zone 0 in the fixed numbering.
pub const GROUP_BASE: u16 = 100;

/// Highest group id in the fixed numbering.
pub const FIXED_GROUP_MAX: u16 = 108;

/// A remote zone.
///
/// The address-offset fallback spans the full 64-bit address space and may
/// be zero or negative. Such zones are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Zone(i128);

impl Zone {
    pub fn new(value: i128) -> Self {
        Zone(value)
    }

    pub fn value(&self) -> i128 {
        self.0
    }

    /// Whether the zone is one of the remote's printed zones (1 to 8).
    pub fn is_printed(&self) -> bool {
        (1..=8).contains(&self.0)
    }
}

/// Zone of a command sent by `addr` to `group_id`.
pub fn zone_for(group_id: u16, addr: &IeeeAddr) -> Zone {
    if group_id <= FIXED_GROUP_MAX {
        Zone(i128::from(group_id) - i128::from(GROUP_BASE))
    } else {
        Zone(i128::from(group_id) - i128::from(addr.as_u64()))
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Zone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match i64::try_from(self.0) {
            Ok(v) => serializer.serialize_i64(v),
            Err(_) => serializer.serialize_i128(self.0),
        }
    }
}
