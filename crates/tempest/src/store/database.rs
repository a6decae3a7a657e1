//! redb-backed store
//!
//! One table per concern, JSON values. Message keys are
//! `<kind>:<epoch micros, zero padded>:<device>` so a time range is a single
//! ordered range scan.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::info;

use super::{
    HubStore, MessageStore, SensorStore, StoreError, StoreResult, message_key, range_keys,
};
use crate::message::{Message, MessageType};
use crate::registry::{Hub, Sensor};

const HUBS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("hubs");
const SENSORS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sensors");
const MESSAGES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Durable implementation of every store port
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) the database at `path` and ensure its tables exist
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(path)
            .map_err(|e| StoreError::Database(format!("Failed to open database: {}", e)))?;

        let write_txn = db.begin_write().map_err(db_err)?;
        for table in [HUBS_TABLE, SENSORS_TABLE, MESSAGES_TABLE] {
            write_txn.open_table(table).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        info!("Store opened (db: {})", path.display());

        Ok(Self { db: Arc::new(db) })
    }

    /// Run blocking database work off the async runtime
    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn put(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: String,
        value: Vec<u8>,
    ) -> StoreResult<()> {
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(db_err)?;
            {
                let mut table = write_txn.open_table(table).map_err(db_err)?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(db_err)?;
            }
            write_txn.commit().map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn load_table<T>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
    ) -> StoreResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(db_err)?;
            let table = read_txn.open_table(table).map_err(db_err)?;

            let mut items = Vec::new();
            for result in table.iter().map_err(db_err)? {
                let (_, value) = result.map_err(db_err)?;
                items.push(serde_json::from_slice(value.value())?);
            }
            Ok(items)
        })
        .await
    }
}

#[async_trait]
impl HubStore for RedbStore {
    async fn load_all(&self) -> StoreResult<Vec<Hub>> {
        self.load_table(HUBS_TABLE).await
    }

    async fn save(&self, hub: &Hub) -> StoreResult<()> {
        let value = serde_json::to_vec(hub)?;
        self.put(HUBS_TABLE, hub.serial.clone(), value).await
    }
}

#[async_trait]
impl SensorStore for RedbStore {
    async fn load_all(&self) -> StoreResult<Vec<Sensor>> {
        self.load_table(SENSORS_TABLE).await
    }

    async fn save(&self, sensor: &Sensor) -> StoreResult<()> {
        let value = serde_json::to_vec(sensor)?;
        self.put(SENSORS_TABLE, sensor.serial.clone(), value).await
    }
}

#[async_trait]
impl MessageStore for RedbStore {
    async fn load_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        kind: MessageType,
    ) -> StoreResult<Vec<Message>> {
        let Some((lo, hi)) = range_keys(start, end, kind) else {
            return Ok(Vec::new());
        };
        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(db_err)?;
            let table = read_txn.open_table(MESSAGES_TABLE).map_err(db_err)?;

            let mut messages = Vec::new();
            for result in table.range(lo.as_str()..hi.as_str()).map_err(db_err)? {
                let (_, value) = result.map_err(db_err)?;
                messages.push(serde_json::from_slice(value.value())?);
            }
            Ok(messages)
        })
        .await
    }

    async fn save(&self, message: &Message) -> StoreResult<()> {
        let value = serde_json::to_vec(message)?;
        self.put(MESSAGES_TABLE, message_key(message), value).await
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
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(db_err)?;
            let removed = {
                let mut table = write_txn.open_table(MESSAGES_TABLE).map_err(db_err)?;
                let mut doomed = Vec::new();
                for result in table.range(lo.as_str()..hi.as_str()).map_err(db_err)? {
                    let (key, _) = result.map_err(db_err)?;
                    doomed.push(key.value().to_string());
                }
                for key in &doomed {
                    table.remove(key.as_str()).map_err(db_err)?;
                }
                doomed.len()
            };
            write_txn.commit().map_err(db_err)?;
            Ok(removed)
        })
        .await
    }
}
