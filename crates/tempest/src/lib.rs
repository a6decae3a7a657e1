//! Tempest - WeatherFlow hub ingestion
//!
//! This crate listens for the JSON messages WeatherFlow hubs broadcast over
//! UDP and turns them into typed, unit-tagged records:
//! - Stream reassembly of objects split across or packed into datagrams
//! - Classification and fail-fast decoding per message type
//! - A hub/sensor registry keyed by serial number
//! - Pluggable persistence (in-memory or redb)

// Re-export the unit types used by decoded records
pub use tempest_units as units;

// Layered configuration (figment)
pub mod config;

// Crate error type
pub mod error;

// Message classification and decoders
pub mod message;

// UDP listener, reassembler and worker tasks
pub mod network;

// Hub/sensor directory
pub mod registry;

// Persistence ports and implementations
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use message::{Message, MessageType};
pub use network::{Network, NetworkState};
pub use registry::{Hub, Registry, Sensor};
