//! Hub/Sensor Registry
//!
//! In-memory directory of every hub and sensor seen on the network. Serial
//! numbers are the only identity: there is at most one [`Hub`] per hub serial
//! and one [`Sensor`] per sensor serial, and a sensor belongs to exactly one
//! hub at a time.
//!
//! Freshness timestamps record processing time, not the time embedded in the
//! payload. Entries live as long as the registry.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A hub relaying sensor traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hub {
    pub serial: String,
    /// Address of the last datagram attributed to this hub
    pub address: Option<IpAddr>,
    pub firmware_revision: Option<String>,
    pub last_seen: DateTime<Utc>,
    /// Persisted separately through the sensor store
    #[serde(skip)]
    pub sensors: HashMap<String, Sensor>,
}

impl Hub {
    fn new(serial: &str, address: Option<IpAddr>, now: DateTime<Utc>) -> Self {
        Self {
            serial: serial.to_string(),
            address,
            firmware_revision: None,
            last_seen: now,
            sensors: HashMap::new(),
        }
    }
}

/// A sensor attached to a hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub serial: String,
    /// Owning hub
    pub hub_serial: String,
    pub last_message: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    hubs: HashMap<String, Hub>,
    /// Sensor serial -> owning hub serial
    owners: HashMap<String, String>,
}

impl Inner {
    fn touch_hub(&mut self, serial: &str, address: Option<IpAddr>, now: DateTime<Utc>) -> &mut Hub {
        self.hubs
            .entry(serial.to_string())
            .and_modify(|hub| {
                if address.is_some() {
                    hub.address = address;
                }
                hub.last_seen = now;
            })
            .or_insert_with(|| {
                info!(hub = %serial, "New hub");
                Hub::new(serial, address, now)
            })
    }

    /// Detach `sensor` from its current hub if that hub is not `hub_serial`
    fn release(&mut self, sensor: &str, hub_serial: &str) {
        let Some(previous) = self.owners.get(sensor) else {
            return;
        };
        if previous == hub_serial {
            return;
        }
        info!(sensor = %sensor, from = %previous, to = %hub_serial, "Sensor moved hub");
        if let Some(hub) = self.hubs.get_mut(previous) {
            hub.sensors.remove(sensor);
        }
    }
}

/// Thread-safe hub/sensor directory
///
/// Reads take a shared lock; upserts take the write lock. No I/O happens
/// while either is held.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the hub for `serial`, creating it if unknown, and refresh its
    /// address and last-seen time
    pub fn upsert_hub(&self, serial: &str, address: IpAddr) -> Hub {
        let now = Utc::now();
        let mut inner = self.inner.write();
        inner.touch_hub(serial, Some(address), now).clone()
    }

    /// Return the sensor `sensor_serial` under `hub_serial`, creating the hub
    /// and sensor as needed, and refresh its last-message time.
    ///
    /// A sensor already owned by a different hub moves to `hub_serial`.
    pub fn upsert_sensor(&self, hub_serial: &str, sensor_serial: &str, address: IpAddr) -> Sensor {
        let now = Utc::now();
        let mut inner = self.inner.write();

        inner.release(sensor_serial, hub_serial);
        inner
            .owners
            .insert(sensor_serial.to_string(), hub_serial.to_string());

        let hub = inner.touch_hub(hub_serial, Some(address), now);
        hub.sensors
            .entry(sensor_serial.to_string())
            .and_modify(|sensor| sensor.last_message = now)
            .or_insert_with(|| {
                info!(hub = %hub_serial, sensor = %sensor_serial, "New sensor");
                Sensor {
                    serial: sensor_serial.to_string(),
                    hub_serial: hub_serial.to_string(),
                    last_message: now,
                }
            })
            .clone()
    }

    /// Record the firmware a hub reports. Returns the updated hub, or `None`
    /// if the hub is unknown.
    pub fn set_firmware(&self, serial: &str, revision: &str) -> Option<Hub> {
        let mut inner = self.inner.write();
        let hub = inner.hubs.get_mut(serial)?;
        if hub.firmware_revision.as_deref() != Some(revision) {
            debug!(hub = %serial, firmware = %revision, "Hub firmware updated");
            hub.firmware_revision = Some(revision.to_string());
        }
        Some(hub.clone())
    }

    /// Seed the registry from persisted state.
    ///
    /// Sensors whose hub is not among `hubs` get a placeholder hub with no
    /// address.
    pub fn restore(&self, hubs: Vec<Hub>, sensors: Vec<Sensor>) {
        let mut inner = self.inner.write();

        for mut hub in hubs {
            hub.sensors.clear();
            inner.hubs.insert(hub.serial.clone(), hub);
        }

        for sensor in sensors {
            inner.release(&sensor.serial, &sensor.hub_serial);
            inner
                .owners
                .insert(sensor.serial.clone(), sensor.hub_serial.clone());
            let hub = inner
                .hubs
                .entry(sensor.hub_serial.clone())
                .or_insert_with(|| Hub::new(&sensor.hub_serial, None, sensor.last_message));
            hub.sensors.insert(sensor.serial.clone(), sensor);
        }

        info!(
            hubs = inner.hubs.len(),
            sensors = inner.owners.len(),
            "Registry restored"
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn hub(&self, serial: &str) -> Option<Hub> {
        self.inner.read().hubs.get(serial).cloned()
    }

    /// All hubs ordered by serial
    pub fn hubs(&self) -> Vec<Hub> {
        let mut hubs: Vec<Hub> = self.inner.read().hubs.values().cloned().collect();
        hubs.sort_by(|a, b| a.serial.cmp(&b.serial));
        hubs
    }

    pub fn sensor(&self, hub_serial: &str, sensor_serial: &str) -> Option<Sensor> {
        self.inner
            .read()
            .hubs
            .get(hub_serial)
            .and_then(|hub| hub.sensors.get(sensor_serial))
            .cloned()
    }

    /// Serial of the hub currently owning `sensor_serial`
    pub fn owner(&self, sensor_serial: &str) -> Option<String> {
        self.inner.read().owners.get(sensor_serial).cloned()
    }

    pub fn hub_count(&self) -> usize {
        self.inner.read().hubs.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.inner.read().owners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    #[test]
    fn test_upsert_hub_twice_yields_one_hub() {
        let registry = Registry::new();
        let first = registry.upsert_hub("HB-1", addr(10));
        let second = registry.upsert_hub("HB-1", addr(11));

        assert_eq!(registry.hub_count(), 1);
        assert_eq!(second.address, Some(addr(11)));
        assert!(second.last_seen >= first.last_seen);
    }

    #[test]
    fn test_upsert_sensor_twice_updates_timestamp() {
        let registry = Registry::new();
        let first = registry.upsert_sensor("HB-1", "ST-1", addr(10));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = registry.upsert_sensor("HB-1", "ST-1", addr(10));

        assert_eq!(registry.sensor_count(), 1);
        assert_eq!(registry.hub("HB-1").unwrap().sensors.len(), 1);
        assert!(second.last_message > first.last_message);
        assert_eq!(registry.sensor("HB-1", "ST-1"), Some(second));
    }

    #[test]
    fn test_upsert_sensor_creates_hub() {
        let registry = Registry::new();
        registry.upsert_sensor("HB-2", "ST-7", addr(20));

        let hub = registry.hub("HB-2").unwrap();
        assert_eq!(hub.address, Some(addr(20)));
        assert!(hub.sensors.contains_key("ST-7"));
        assert_eq!(registry.owner("ST-7").as_deref(), Some("HB-2"));
    }

    #[test]
    fn test_sensor_moves_to_new_hub() {
        let registry = Registry::new();
        registry.upsert_sensor("HB-1", "ST-1", addr(10));
        registry.upsert_sensor("HB-2", "ST-1", addr(20));

        assert_eq!(registry.sensor_count(), 1);
        assert!(registry.sensor("HB-1", "ST-1").is_none());
        assert_eq!(registry.sensor("HB-2", "ST-1").unwrap().hub_serial, "HB-2");
        assert_eq!(registry.owner("ST-1").as_deref(), Some("HB-2"));
    }

    #[test]
    fn test_set_firmware() {
        let registry = Registry::new();
        assert!(registry.set_firmware("HB-1", "35").is_none());

        registry.upsert_hub("HB-1", addr(10));
        let hub = registry.set_firmware("HB-1", "35").unwrap();
        assert_eq!(hub.firmware_revision.as_deref(), Some("35"));
    }

    #[test]
    fn test_restore_attaches_sensors() {
        let now = Utc::now();
        let hub = Hub::new("HB-1", Some(addr(10)), now);
        let sensors = vec![
            Sensor {
                serial: "ST-1".to_string(),
                hub_serial: "HB-1".to_string(),
                last_message: now,
            },
            Sensor {
                serial: "AR-1".to_string(),
                hub_serial: "HB-9".to_string(),
                last_message: now,
            },
        ];

        let registry = Registry::new();
        registry.restore(vec![hub], sensors);

        assert_eq!(registry.hub_count(), 2);
        assert_eq!(registry.sensor_count(), 2);
        assert!(registry.sensor("HB-1", "ST-1").is_some());
        assert_eq!(registry.hub("HB-9").unwrap().address, None);

        // A live message refreshes the placeholder's address
        registry.upsert_sensor("HB-9", "AR-1", addr(99));
        assert_eq!(registry.hub("HB-9").unwrap().address, Some(addr(99)));
        assert_eq!(registry.sensor_count(), 2);
    }

    #[test]
    fn test_hub_serialization_skips_sensors() {
        let registry = Registry::new();
        registry.upsert_sensor("HB-1", "ST-1", addr(10));
        let hub = registry.hub("HB-1").unwrap();

        let json = serde_json::to_value(&hub).unwrap();
        assert!(json.get("sensors").is_none());
        let back: Hub = serde_json::from_value(json).unwrap();
        assert!(back.sensors.is_empty());
        assert_eq!(back.serial, "HB-1");
    }

    #[test]
    fn test_concurrent_upserts_never_duplicate() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.upsert_sensor("HB-1", &format!("ST-{}", i % 4), addr(10));
                        let _ = registry.hubs();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.hub_count(), 1);
        assert_eq!(registry.sensor_count(), 4);
    }
}
