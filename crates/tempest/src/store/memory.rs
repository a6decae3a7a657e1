//! In-process store

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{HubStore, MessageStore, SensorStore, StoreResult, message_key, range_keys};
use crate::message::{Message, MessageType};
use crate::registry::{Hub, Sensor};

/// Volatile implementation of every store port
#[derive(Default)]
pub struct MemoryStore {
    hubs: RwLock<HashMap<String, Hub>>,
    sensors: RwLock<HashMap<String, Sensor>>,
    messages: RwLock<BTreeMap<String, Message>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages across all types
    pub fn message_count(&self) -> usize {
        self.messages.read().len()
    }
}

#[async_trait]
impl HubStore for MemoryStore {
    async fn load_all(&self) -> StoreResult<Vec<Hub>> {
        let mut hubs: Vec<Hub> = self.hubs.read().values().cloned().collect();
        hubs.sort_by(|a, b| a.serial.cmp(&b.serial));
        Ok(hubs)
    }

    async fn save(&self, hub: &Hub) -> StoreResult<()> {
        let mut stored = hub.clone();
        stored.sensors.clear();
        self.hubs.write().insert(hub.serial.clone(), stored);
        Ok(())
    }
}

#[async_trait]
impl SensorStore for MemoryStore {
    async fn load_all(&self) -> StoreResult<Vec<Sensor>> {
        let mut sensors: Vec<Sensor> = self.sensors.read().values().cloned().collect();
        sensors.sort_by(|a, b| a.serial.cmp(&b.serial));
        Ok(sensors)
    }

    async fn save(&self, sensor: &Sensor) -> StoreResult<()> {
        self.sensors
            .write()
            .insert(sensor.serial.clone(), sensor.clone());
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn load_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        kind: MessageType,
    ) -> StoreResult<Vec<Message>> {
        let Some((lo, hi)) = range_keys(start, end, kind) else {
            return Ok(Vec::new());
        };
        Ok(self
            .messages
            .read()
            .range(lo..hi)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn save(&self, message: &Message) -> StoreResult<()> {
        self.messages
            .write()
            .insert(message_key(message), message.clone());
        Ok(())
    }

    async fn delete_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        kind: MessageType,
    ) -> StoreResult<usize> {
        let Some((lo, hi)) = range_keys(start, end, kind) else {
            return Ok(0);
        };
        let mut messages = self.messages.write();
        let doomed: Vec<String> = messages.range(lo..hi).map(|(k, _)| k.clone()).collect();
        for key in &doomed {
            messages.remove(key);
        }
        Ok(doomed.len())
    }
}
