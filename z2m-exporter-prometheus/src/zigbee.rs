//! Zigbee network metric families.
//!
//! Every sampler reads a fresh snapshot from [`NetworkState`]; nothing is
//! cached between scrapes.

use std::sync::Arc;

use z2m_common::{DeviceRecord, NetworkState, current_timestamp_millis};

use crate::error::RegistryError;
use crate::registry::{MetricDefinition, MetricRegistry, Sample};

/// Label carrying the device address.
pub const IEEE_ADDR_LABEL: &str = "ieeeAddr";

/// Label carrying the coordinator firmware, when enabled.
pub const COORDINATOR_LABEL: &str = "coordinator";

/// Source of the current time as epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Registers the zigbee metric families against a network state source.
#[derive(Clone)]
pub struct ZigbeeMetrics {
    network: Arc<dyn NetworkState>,
    clock: Clock,
}

impl ZigbeeMetrics {
    pub fn new(network: Arc<dyn NetworkState>) -> Self {
        Self {
            network,
            clock: Arc::new(current_timestamp_millis),
        }
    }

    /// Replace the wall clock used for last-seen ages.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The `coordinator` label, `unknown@unknown` until the bridge reports it.
    pub fn coordinator_label(&self) -> (String, String) {
        let version = self.network.coordinator().unwrap_or_default();
        (COORDINATOR_LABEL.to_string(), version.to_string())
    }

    /// Register all families, in exposition order.
    pub fn register(&self, registry: &MetricRegistry) -> Result<(), RegistryError> {
        let network = self.network.clone();
        registry.register(MetricDefinition::gauge(
            "zigbee_device_joined_count",
            "Number of devices joined to the network (excluding coordinator)",
            move || Ok(vec![Sample::value(joined_devices(&*network).len() as f64)]),
        ))?;

        let (network, clock) = (self.network.clone(), self.clock.clone());
        registry.register(MetricDefinition::summary(
            "zigbee_device_last_seen_summary",
            "Seconds since device was last seen, percentile",
            move || {
                let now = clock();
                Ok(joined_devices(&*network)
                    .iter()
                    .filter_map(|d| last_seen_age(d, now))
                    .map(Sample::value)
                    .collect())
            },
        ))?;

        let (network, clock) = (self.network.clone(), self.clock.clone());
        registry.register(
            MetricDefinition::gauge(
                "zigbee_device_last_seen",
                "Seconds since device was last seen, labeled by device ieee address",
                move || {
                    let now = clock();
                    Ok(joined_devices(&*network)
                        .iter()
                        .filter_map(|d| last_seen_age(d, now).map(|age| by_address(d, age)))
                        .collect())
                },
            )
            .with_labels([IEEE_ADDR_LABEL]),
        )?;

        let network = self.network.clone();
        registry.register(MetricDefinition::summary(
            "zigbee_device_lqi_summary",
            "Device link quality index (when available), percentile",
            move || {
                Ok(joined_devices(&*network)
                    .iter()
                    .filter_map(|d| d.link_quality)
                    .map(|lqi| Sample::value(f64::from(lqi)))
                    .collect())
            },
        ))?;

        let network = self.network.clone();
        registry.register(
            MetricDefinition::gauge(
                "zigbee_device_lqi",
                "Device link quality index (when available), labeled by device ieee address",
                move || {
                    Ok(joined_devices(&*network)
                        .iter()
                        .filter_map(|d| d.link_quality.map(|lqi| by_address(d, f64::from(lqi))))
                        .collect())
                },
            )
            .with_labels([IEEE_ADDR_LABEL]),
        )?;

        let network = self.network.clone();
        registry.register(
            MetricDefinition::gauge(
                "zigbee_device_battery",
                "Battery status for battery-powered devices, labeled by device ieee address",
                move || {
                    Ok(joined_devices(&*network)
                        .iter()
                        .filter_map(|d| d.battery.map(|battery| by_address(d, battery)))
                        .collect())
                },
            )
            .with_labels([IEEE_ADDR_LABEL]),
        )?;

        let network = self.network.clone();
        registry.register(MetricDefinition::gauge(
            "zigbee_mqtt_connected",
            "1 if zigbee2mqtt is connected to downstream mqtt server, otherwise 0",
            move || Ok(vec![Sample::value(flag(network.broker_connected()))]),
        ))?;

        let network = self.network.clone();
        registry.register(MetricDefinition::gauge(
            "zigbee_permit_join",
            "1 if network is in Permit Join mode, otherwise 0",
            move || Ok(vec![Sample::value(flag(network.permit_join()))]),
        ))?;

        Ok(())
    }
}

impl std::fmt::Debug for ZigbeeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZigbeeMetrics").finish_non_exhaustive()
    }
}

fn joined_devices(network: &dyn NetworkState) -> Vec<DeviceRecord> {
    network
        .devices()
        .into_iter()
        .filter(|d| !d.is_coordinator())
        .collect()
}

/// Whole seconds since the device was last seen, rounded half up.
fn last_seen_age(device: &DeviceRecord, now_ms: i64) -> Option<f64> {
    device
        .last_seen
        .map(|seen| ((now_ms - seen) as f64 / 1000.0 + 0.5).floor())
}

fn by_address(device: &DeviceRecord, value: f64) -> Sample {
    Sample::labeled(value, [(IEEE_ADDR_LABEL, device.ieee_addr.to_string())])
}

fn flag(on: bool) -> f64 {
    if on { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z2m_common::{CoordinatorVersion, DeviceType, IeeeAddr, InMemoryNetwork};

    const NOW: i64 = 1_700_000_000_000;

    fn fixture() -> (Arc<InMemoryNetwork>, MetricRegistry) {
        let network = Arc::new(InMemoryNetwork::new());
        let registry = MetricRegistry::new();
        ZigbeeMetrics::new(network.clone())
            .with_clock(Arc::new(|| NOW))
            .register(&registry)
            .unwrap();
        (network, registry)
    }

    fn addr(s: &str) -> IeeeAddr {
        IeeeAddr::parse(s).unwrap()
    }

    #[test]
    fn test_registers_families_in_order() {
        let (_, registry) = fixture();
        assert_eq!(
            registry.names(),
            vec![
                "zigbee_device_joined_count",
                "zigbee_device_last_seen_summary",
                "zigbee_device_last_seen",
                "zigbee_device_lqi_summary",
                "zigbee_device_lqi",
                "zigbee_device_battery",
                "zigbee_mqtt_connected",
                "zigbee_permit_join",
            ]
        );
    }

    #[test]
    fn test_registering_twice_is_rejected() {
        let (network, registry) = fixture();
        let err = ZigbeeMetrics::new(network).register(&registry).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateName("zigbee_device_joined_count".to_string())
        );
    }

    #[test]
    fn test_last_seen_age_in_seconds() {
        let (network, registry) = fixture();
        network.upsert_device(
            DeviceRecord::new(addr("0x01"), DeviceType::EndDevice).with_last_seen(NOW - 90_000),
        );

        let output = registry.collect();
        assert!(output.contains("zigbee_device_last_seen{ieeeAddr=\"0x0000000000000001\"} 90\n"));
    }

    #[test]
    fn test_last_seen_rounds_half_up() {
        let device = DeviceRecord::new(addr("0x01"), DeviceType::Router).with_last_seen(NOW - 1_500);
        assert_eq!(last_seen_age(&device, NOW), Some(2.0));

        let device = DeviceRecord::new(addr("0x01"), DeviceType::Router).with_last_seen(NOW - 1_499);
        assert_eq!(last_seen_age(&device, NOW), Some(1.0));
    }

    #[test]
    fn test_missing_readings_have_no_series() {
        let (network, registry) = fixture();
        network.upsert_device(DeviceRecord::new(addr("0x02"), DeviceType::Router));

        let output = registry.collect();
        assert!(output.contains("zigbee_device_joined_count 1\n"));
        assert!(!output.contains("zigbee_device_battery{"));
        assert!(!output.contains("zigbee_device_lqi{"));
        assert!(!output.contains("zigbee_device_last_seen{"));
        // Families are still announced.
        assert!(output.contains("# TYPE zigbee_device_battery gauge\n"));
    }

    #[test]
    fn test_readings_pass_through() {
        let (network, registry) = fixture();
        network.upsert_device(
            DeviceRecord::new(addr("0x03"), DeviceType::EndDevice)
                .with_link_quality(87)
                .with_battery(64.5),
        );

        let output = registry.collect();
        assert!(output.contains("zigbee_device_lqi{ieeeAddr=\"0x0000000000000003\"} 87\n"));
        assert!(output.contains("zigbee_device_battery{ieeeAddr=\"0x0000000000000003\"} 64.5\n"));
        assert!(output.contains("zigbee_device_lqi_summary{quantile=\"0.5\"} 87\n"));
        assert!(output.contains("zigbee_device_lqi_summary_count 1\n"));
    }

    #[test]
    fn test_coordinator_excluded() {
        let (network, registry) = fixture();
        network.upsert_device(
            DeviceRecord::new(addr("0x00"), DeviceType::Coordinator)
                .with_link_quality(255)
                .with_last_seen(NOW),
        );

        let output = registry.collect();
        assert!(output.contains("zigbee_device_joined_count 0\n"));
        assert!(!output.contains("ieeeAddr"));
        assert!(output.contains("zigbee_device_last_seen_summary{quantile=\"0.5\"} NaN\n"));
    }

    #[test]
    fn test_connection_and_permit_join_flags() {
        let (network, registry) = fixture();
        assert!(registry.collect().contains("zigbee_mqtt_connected 0\n"));

        network.set_broker_connected(true);
        network.set_permit_join_flag(true);
        let output = registry.collect();
        assert!(output.contains("zigbee_mqtt_connected 1\n"));
        assert!(output.contains("zigbee_permit_join 1\n"));
    }

    #[test]
    fn test_coordinator_label() {
        let network = Arc::new(InMemoryNetwork::new());
        let metrics = ZigbeeMetrics::new(network.clone());
        assert_eq!(
            metrics.coordinator_label(),
            ("coordinator".to_string(), "unknown@unknown".to_string())
        );

        network.set_coordinator(CoordinatorVersion {
            kind: Some("zStack3x0".to_string()),
            revision: Some("20210708".to_string()),
        });
        assert_eq!(
            metrics.coordinator_label(),
            ("coordinator".to_string(), "zStack3x0@20210708".to_string())
        );
    }
}
