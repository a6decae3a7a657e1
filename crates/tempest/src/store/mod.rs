//! Persistence ports
//!
//! The network calls these after a message has been decoded and the registry
//! updated. A failing store is logged and counted; it never stops ingestion.

mod database;
mod memory;

pub use database::RedbStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::message::{Message, MessageType};
use crate::registry::{Hub, Sensor};

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by store implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store task failed: {0}")]
    Task(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait HubStore: Send + Sync {
    async fn load_all(&self) -> StoreResult<Vec<Hub>>;

    async fn save(&self, hub: &Hub) -> StoreResult<()>;
}

#[async_trait]
pub trait SensorStore: Send + Sync {
    async fn load_all(&self) -> StoreResult<Vec<Sensor>>;

    async fn save(&self, sensor: &Sensor) -> StoreResult<()>;
}

/// Decoded message history, keyed by type and event time
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Messages of `kind` with `start <= time <= end`, oldest first
    async fn load_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        kind: MessageType,
    ) -> StoreResult<Vec<Message>>;

    async fn save(&self, message: &Message) -> StoreResult<()>;

    /// Delete messages of `kind` with `start <= time <= end`. Returns the
    /// number removed.
    async fn delete_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        kind: MessageType,
    ) -> StoreResult<usize>;
}

/// The stores a network writes to; each one is optional
#[derive(Clone, Default)]
pub struct Stores {
    pub hubs: Option<Arc<dyn HubStore>>,
    pub sensors: Option<Arc<dyn SensorStore>>,
    pub messages: Option<Arc<dyn MessageStore>>,
}

impl Stores {
    /// Use one backend for every port
    pub fn all<S>(store: Arc<S>) -> Self
    where
        S: HubStore + SensorStore + MessageStore + 'static,
    {
        Self {
            hubs: Some(store.clone()),
            sensors: Some(store.clone()),
            messages: Some(store),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message Keys
// ─────────────────────────────────────────────────────────────────────────────

/// Epoch microseconds, clamped so zero-padded keys sort chronologically
fn key_micros(time: DateTime<Utc>) -> i64 {
    time.timestamp_micros().max(0)
}

/// `<kind>:<micros>:<device>`; a message repeated by the hub overwrites itself
pub(crate) fn message_key(message: &Message) -> String {
    let device = message.sensor_serial().unwrap_or(message.hub_serial());
    format!(
        "{}:{:020}:{}",
        message.kind(),
        key_micros(message.time()),
        device
    )
}

/// Half-open key range covering `start..=end` for `kind`, or `None` when
/// `start` is after `end`
pub(crate) fn range_keys(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    kind: MessageType,
) -> Option<(String, String)> {
    if start > end {
        return None;
    }
    // ';' sorts directly after ':', closing the range past every device suffix
    Some((
        format!("{}:{:020}:", kind, key_micros(start)),
        format!("{}:{:020};", kind, key_micros(end)),
    ))
}
