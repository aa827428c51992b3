/// Default zigbee2mqtt base topic.
pub const DEFAULT_BASE_TOPIC: &str = "zigbee2mqtt";

/// Trailing topic segments that are never part of a friendly name.
const DEVICE_SUFFIXES: &[&str] = &[
    "set",
    "get",
    "availability",
    "action",
    "brightness",
    "color_temp",
];

/// Builder for zigbee2mqtt topics.
///
/// Topics follow the patterns `<base>/<device>[/<suffix>]` and
/// `<base>/bridge/<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    base: String,
}

impl Default for TopicBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_TOPIC)
    }
}

impl TopicBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        let base: String = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Prefix a topic relative to the base topic.
    ///
    /// # Example
    /// ```
    /// use z2m_common::topics::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("zigbee2mqtt");
    /// assert_eq!(topics.absolute("lamp/set"), "zigbee2mqtt/lamp/set");
    /// ```
    pub fn absolute(&self, relative: &str) -> String {
        format!("{}/{}", self.base, relative.trim_start_matches('/'))
    }

    /// Topic carrying a device's state.
    pub fn device(&self, device: &str) -> String {
        format!("{}/{}", self.base, device)
    }

    /// Sub-topic of a device, e.g. `<base>/<device>/action`.
    pub fn device_suffix(&self, device: &str, suffix: &str) -> String {
        format!("{}/{}/{}", self.base, device, suffix)
    }

    /// Bridge topic, e.g. `<base>/bridge/devices`.
    ///
    /// # Example
    /// ```
    /// use z2m_common::topics::TopicBuilder;
    ///
    /// let topics = TopicBuilder::default();
    /// assert_eq!(topics.bridge("info"), "zigbee2mqtt/bridge/info");
    /// ```
    pub fn bridge(&self, name: &str) -> String {
        format!("{}/bridge/{}", self.base, name)
    }

    /// Wildcard matching everything below the base topic.
    pub fn wildcard(&self) -> String {
        format!("{}/#", self.base)
    }
}

/// A classified zigbee2mqtt topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTopic<'a> {
    /// `<base>/bridge/<name>`, where name may contain further segments.
    Bridge(&'a str),
    /// `<base>/<device>` or `<base>/<device>/<suffix>`.
    Device {
        name: &'a str,
        suffix: Option<&'a str>,
    },
}

/// Classify a topic under the given base.
///
/// Returns `None` when the topic is outside the base topic or empty below it.
/// Friendly names may contain `/`; only well-known trailing segments are
/// split off as a suffix.
pub fn parse_topic<'a>(base: &str, topic: &'a str) -> Option<ParsedTopic<'a>> {
    let rest = topic.strip_prefix(base)?.strip_prefix('/')?;
    if rest.is_empty() {
        return None;
    }

    if let Some(name) = rest.strip_prefix("bridge/") {
        return (!name.is_empty()).then_some(ParsedTopic::Bridge(name));
    }

    if let Some((name, last)) = rest.rsplit_once('/') {
        if DEVICE_SUFFIXES.contains(&last) && !name.is_empty() {
            return Some(ParsedTopic::Device {
                name,
                suffix: Some(last),
            });
        }
    }

    Some(ParsedTopic::Device {
        name: rest,
        suffix: None,
    })
}
