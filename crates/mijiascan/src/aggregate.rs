//! Per-device aggregation of decoded readings.
//!
//! Each whitelisted device gets a zero-initialized aggregate when tracking
//! starts. Readings fold into running sums and counts (always updated
//! together) in arrival order; battery keeps only the latest value. Averages
//! are computed once, when the scan loop has finished.

use crate::address::DeviceAddress;
use crate::decoder::{Reading, ReadingValue};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Running sums, counts and last-seen timestamps for one device.
///
/// Sums are kept in tenths, exactly as broadcast, so averages suffer no
/// per-sample rounding.
#[derive(Debug, Clone, Default)]
pub struct DeviceAggregate {
    pub temperature_sum: i64,
    pub temperature_count: u32,
    pub temperature_at: u64,
    pub humidity_sum: i64,
    pub humidity_count: u32,
    pub humidity_at: u64,
    pub battery: Option<u8>,
    pub battery_at: u64,
}

/// An averaged value with the unix timestamp of its newest sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Averaged {
    pub value: f64,
    pub at: u64,
}

/// Final per-device readings, each omitted when never observed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AveragedReadings {
    pub temperature: Option<Averaged>,
    pub humidity: Option<Averaged>,
    pub battery: Option<(u8, u64)>,
}

impl AveragedReadings {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none() && self.battery.is_none()
    }
}

/// Maps device addresses to their accumulated readings.
#[derive(Debug, Default)]
pub struct AggregationStore {
    devices: HashMap<DeviceAddress, DeviceAggregate>,
}

impl AggregationStore {
    /// Starts tracking a device with a zeroed aggregate.
    pub fn track(&mut self, address: DeviceAddress) {
        self.devices.entry(address).or_default();
    }

    /// Folds one reading into its device's aggregate, stamped with the
    /// current time.
    pub fn ingest(&mut self, reading: &Reading) {
        self.ingest_at(reading, unix_now());
    }

    /// Folds one reading in with an explicit timestamp.
    ///
    /// Readings for untracked devices are dropped with a warning; the reader
    /// is expected to have filtered those out already.
    pub fn ingest_at(&mut self, reading: &Reading, at: u64) {
        let Some(aggregate) = self.devices.get_mut(&reading.address) else {
            log::warn!("dropping reading for untracked device {}", reading.address);
            return;
        };

        match reading.value {
            ReadingValue::Temperature(tenths) => {
                aggregate.temperature_sum += tenths as i64;
                aggregate.temperature_count += 1;
                aggregate.temperature_at = at;
            }
            ReadingValue::Humidity(tenths) => {
                aggregate.humidity_sum += tenths as i64;
                aggregate.humidity_count += 1;
                aggregate.humidity_at = at;
            }
            ReadingValue::Battery(level) => {
                aggregate.battery = Some(level);
                aggregate.battery_at = at;
            }
        }
    }

    /// True when every tracked device has collected at least `quota`
    /// temperature samples and `quota` humidity samples.
    ///
    /// Note that a sensor that only ever broadcasts one of the two kinds
    /// never satisfies a quota; such runs need a timeout or an interrupt.
    pub fn quota_met(&self, quota: u32) -> bool {
        !self.devices.is_empty()
            && self.devices.values().all(|aggregate| {
                aggregate.temperature_count >= quota && aggregate.humidity_count >= quota
            })
    }

    pub fn get(&self, address: &DeviceAddress) -> Option<&DeviceAggregate> {
        self.devices.get(address)
    }

    /// Computes averaged readings per device. Devices that produced nothing
    /// are left out entirely; within a device, each kind is omitted when it
    /// has no samples.
    pub fn snapshot(&self) -> HashMap<DeviceAddress, AveragedReadings> {
        self.devices
            .iter()
            .filter_map(|(address, aggregate)| {
                let readings = AveragedReadings {
                    temperature: average(
                        aggregate.temperature_sum,
                        aggregate.temperature_count,
                        aggregate.temperature_at,
                    ),
                    humidity: average(
                        aggregate.humidity_sum,
                        aggregate.humidity_count,
                        aggregate.humidity_at,
                    ),
                    battery: aggregate.battery.map(|level| (level, aggregate.battery_at)),
                };
                if readings.is_empty() {
                    None
                } else {
                    Some((*address, readings))
                }
            })
            .collect()
    }
}

fn average(sum_tenths: i64, count: u32, at: u64) -> Option<Averaged> {
    if count == 0 {
        return None;
    }
    Some(Averaged {
        value: sum_tenths as f64 / count as f64 / 10.0,
        at,
    })
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> DeviceAddress {
        s.parse().unwrap()
    }

    fn reading(address: DeviceAddress, value: ReadingValue) -> Reading {
        Reading { address, value }
    }

    #[test]
    fn test_average_is_exact() {
        let device = addr("AA:BB:CC:DD:EE:FF");
        let mut store = AggregationStore::default();
        store.track(device);

        for tenths in [200, 210, 190, 205] {
            store.ingest_at(&reading(device, ReadingValue::Temperature(tenths)), 1000);
        }

        let snapshot = store.snapshot();
        let temperature = snapshot[&device].temperature.unwrap();
        // (200 + 210 + 190 + 205) / 4 / 10 = 20.125
        assert!((temperature.value - 20.125).abs() < 1e-6);
        assert_eq!(temperature.at, 1000);
    }

    #[test]
    fn test_battery_keeps_latest() {
        let device = addr("AA:BB:CC:DD:EE:FF");
        let mut store = AggregationStore::default();
        store.track(device);

        store.ingest_at(&reading(device, ReadingValue::Battery(90)), 1000);
        store.ingest_at(&reading(device, ReadingValue::Battery(77)), 2000);

        let snapshot = store.snapshot();
        assert_eq!(snapshot[&device].battery, Some((77, 2000)));
    }

    #[test]
    fn test_untracked_device_is_dropped() {
        let stranger = addr("11:22:33:44:55:66");
        let device = addr("AA:BB:CC:DD:EE:FF");
        let mut store = AggregationStore::default();
        store.track(device);

        store.ingest_at(&reading(stranger, ReadingValue::Temperature(300)), 1000);

        assert!(store.snapshot().is_empty());
        assert!(store.get(&stranger).is_none());
    }

    #[test]
    fn test_counts_and_sums_move_together() {
        let device = addr("AA:BB:CC:DD:EE:FF");
        let mut store = AggregationStore::default();
        store.track(device);

        store.ingest_at(&reading(device, ReadingValue::Temperature(200)), 1000);
        store.ingest_at(&reading(device, ReadingValue::Humidity(500)), 1001);

        let aggregate = store.get(&device).unwrap();
        assert_eq!(aggregate.temperature_sum, 200);
        assert_eq!(aggregate.temperature_count, 1);
        assert_eq!(aggregate.humidity_sum, 500);
        assert_eq!(aggregate.humidity_count, 1);
        assert_eq!(aggregate.battery, None);
    }

    #[test]
    fn test_quota_needs_both_kinds() {
        let device = addr("AA:BB:CC:DD:EE:FF");
        let mut store = AggregationStore::default();
        store.track(device);

        store.ingest_at(&reading(device, ReadingValue::Temperature(200)), 1000);
        store.ingest_at(&reading(device, ReadingValue::Temperature(201)), 1001);
        assert!(!store.quota_met(2));

        store.ingest_at(&reading(device, ReadingValue::Humidity(500)), 1002);
        assert!(!store.quota_met(2));

        store.ingest_at(&reading(device, ReadingValue::Humidity(501)), 1003);
        assert!(store.quota_met(2));
    }

    #[test]
    fn test_quota_covers_every_device() {
        let first = addr("AA:BB:CC:DD:EE:FF");
        let second = addr("11:22:33:44:55:66");
        let mut store = AggregationStore::default();
        store.track(first);
        store.track(second);

        store.ingest_at(&reading(first, ReadingValue::Temperature(200)), 1000);
        store.ingest_at(&reading(first, ReadingValue::Humidity(500)), 1000);
        assert!(!store.quota_met(1));

        store.ingest_at(&reading(second, ReadingValue::Temperature(190)), 1001);
        store.ingest_at(&reading(second, ReadingValue::Humidity(480)), 1001);
        assert!(store.quota_met(1));
    }

    #[test]
    fn test_snapshot_omits_missing_kinds() {
        let device = addr("AA:BB:CC:DD:EE:FF");
        let mut store = AggregationStore::default();
        store.track(device);

        store.ingest_at(&reading(device, ReadingValue::Humidity(495)), 1000);

        let snapshot = store.snapshot();
        let readings = &snapshot[&device];
        assert!(readings.temperature.is_none());
        assert!(readings.battery.is_none());
        assert!((readings.humidity.unwrap().value - 49.5).abs() < 1e-6);
    }
}
