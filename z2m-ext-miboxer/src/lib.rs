//! zigbee2mqtt extension for MiBoxer FUT089Z remotes.
//!
//! The remote sends its controls only to zone groups, so zigbee2mqtt never
//! publishes them on the remote's own topics. This extension decodes the
//! group commands and republishes them per remote:
//!
//! ```text
//! zigbee2mqtt/<ieee>/action      button_group_<zone>_<on|off>
//! zigbee2mqtt/<ieee>/brightness  {"brightness":<level>,"zone":<zone>}
//! zigbee2mqtt/<ieee>/color_temp  {"colortemp":<mired>,"zone":<zone>}
//! ```

pub mod config;
pub mod decoder;
pub mod exposer;
pub mod zone;

pub use config::{MiboxerConfig, RemoteConfig};
pub use decoder::{ButtonEdge, DecodeOutcome, EventDecoder, RemoteEvent, RemoteEventState};
pub use exposer::ControlsExposer;
pub use zone::{Zone, zone_for};
