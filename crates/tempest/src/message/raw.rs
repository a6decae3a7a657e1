//! Raw hub messages and message classification
//!
//! A reassembled frame is parsed into a [`RawMessage`] (an untyped JSON
//! object), then classified by its `type` discriminator before one of the
//! typed decoders runs.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminator field present on every hub message
pub const TYPE_FIELD: &str = "type";
/// Serial of the relaying hub (absent on hub status messages)
pub const HUB_SERIAL_FIELD: &str = "hub_sn";
/// Serial of the reporting device; the hub itself on hub status messages
pub const SERIAL_FIELD: &str = "serial_number";

// ─────────────────────────────────────────────────────────────────────────────
// Message Type
// ─────────────────────────────────────────────────────────────────────────────

/// Message types a hub broadcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "evt_precip")]
    RainStart,
    #[serde(rename = "evt_strike")]
    LightningStrike,
    #[serde(rename = "rapid_wind")]
    RapidWind,
    #[serde(rename = "obs_st")]
    Observation,
    #[serde(rename = "obs_air")]
    AirObservation,
    #[serde(rename = "obs_sky")]
    SkyObservation,
    #[serde(rename = "device_status")]
    DeviceStatus,
    #[serde(rename = "hub_status")]
    HubStatus,
}

impl MessageType {
    pub const ALL: [MessageType; 8] = [
        Self::RainStart,
        Self::LightningStrike,
        Self::RapidWind,
        Self::Observation,
        Self::AirObservation,
        Self::SkyObservation,
        Self::DeviceStatus,
        Self::HubStatus,
    ];

    /// Wire name of this type
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RainStart => "evt_precip",
            Self::LightningStrike => "evt_strike",
            Self::RapidWind => "rapid_wind",
            Self::Observation => "obs_st",
            Self::AirObservation => "obs_air",
            Self::SkyObservation => "obs_sky",
            Self::DeviceStatus => "device_status",
            Self::HubStatus => "hub_status",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ClassifyError::UnknownType(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// A frame that could not be turned into a JSON object
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Frame is not a JSON object")]
    NotAnObject,

    #[error("Unterminated message exceeded {limit} bytes")]
    Oversized { limit: usize },
}

/// A message whose discriminator or serial numbers are unusable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("Message type not found")]
    MissingType,

    #[error("Message type is not a string")]
    TypeNotString,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Field '{0}' not found")]
    MissingSerial(&'static str),

    #[error("Field '{0}' is not a string")]
    SerialNotString(&'static str),

    #[error("Hub status messages carry no sensor serial")]
    NoSensorSerial,
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw Message
// ─────────────────────────────────────────────────────────────────────────────

/// An untyped hub message: one JSON object
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage(Map<String, Value>);

impl RawMessage {
    /// Parse one frame
    pub fn parse(bytes: &[u8]) -> Result<Self, FramingError> {
        match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(FramingError::NotAnObject),
        }
    }

    /// Field lookup
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Validated message type
    pub fn message_type(&self) -> Result<MessageType, ClassifyError> {
        match self.0.get(TYPE_FIELD) {
            None => Err(ClassifyError::MissingType),
            Some(Value::String(s)) => s.parse(),
            Some(_) => Err(ClassifyError::TypeNotString),
        }
    }

    /// Serial of the hub that relayed this message.
    ///
    /// Hub status messages describe the hub itself, so its serial sits under
    /// `serial_number` instead of `hub_sn`.
    pub fn hub_serial(&self) -> Result<&str, ClassifyError> {
        match self.message_type()? {
            MessageType::HubStatus => self.string_field(SERIAL_FIELD),
            _ => self.string_field(HUB_SERIAL_FIELD),
        }
    }

    /// Serial of the reporting sensor
    pub fn sensor_serial(&self) -> Result<&str, ClassifyError> {
        match self.message_type()? {
            MessageType::HubStatus => Err(ClassifyError::NoSensorSerial),
            _ => self.string_field(SERIAL_FIELD),
        }
    }

    fn string_field(&self, field: &'static str) -> Result<&str, ClassifyError> {
        match self.0.get(field) {
            None => Err(ClassifyError::MissingSerial(field)),
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(_) => Err(ClassifyError::SerialNotString(field)),
        }
    }
}

impl From<Map<String, Value>> for RawMessage {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Result of classifying a raw message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: MessageType,
    pub hub_serial: String,
    /// `None` for hub status messages
    pub sensor_serial: Option<String>,
}

/// Extract the discriminator and the serial numbers the registry needs
pub fn classify(raw: &RawMessage) -> Result<Classified, ClassifyError> {
    let kind = raw.message_type()?;
    let hub_serial = raw.hub_serial()?.to_string();
    let sensor_serial = match kind {
        MessageType::HubStatus => None,
        _ => Some(raw.sensor_serial()?.to_string()),
    };

    Ok(Classified {
        kind,
        hub_serial,
        sensor_serial,
    })
}
