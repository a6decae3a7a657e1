//! Typed hub messages
//!
//! Records refer to their hub and sensor by serial number only. Resolve them
//! against the [`Registry`](crate::registry::Registry) when the live entry is
//! needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tempest_units::{Direction, Distance, Pressure, Speed, Temperature, dew_point};

use super::raw::MessageType;

/// Precipitation detected during an observation interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecipitationType {
    None,
    Rain,
    Hail,
    RainAndHail,
}

impl PrecipitationType {
    /// Map the wire code (0-3)
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Rain),
            2 => Some(Self::Hail),
            3 => Some(Self::RainAndHail),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Observations
// ─────────────────────────────────────────────────────────────────────────────

/// Tempest station observation (`obs_st`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub hub_serial: String,
    pub sensor_serial: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_revision: Option<u32>,
    pub entries: Vec<ObservationEntry>,
}

/// One 18-field sample of a station observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationEntry {
    pub time: DateTime<Utc>,
    pub wind_lull: Speed,
    pub wind_average: Speed,
    pub wind_gust: Speed,
    pub wind_direction: Direction,
    /// Seconds
    pub wind_sample_interval: u32,
    pub station_pressure: Pressure,
    pub air_temperature: Temperature,
    /// Percent
    pub relative_humidity: f64,
    /// Lux
    pub illuminance: u32,
    pub uv_index: f64,
    /// W/m²
    pub solar_radiation: u32,
    /// Rain over the reporting interval
    pub rain_accumulation: Distance,
    pub precipitation_type: PrecipitationType,
    pub lightning_average_distance: Distance,
    pub lightning_strike_count: u32,
    /// Volts
    pub battery: f64,
    /// Minutes
    pub reporting_interval: u32,
}

impl ObservationEntry {
    pub fn dew_point(&self) -> Temperature {
        dew_point(self.air_temperature, self.relative_humidity)
    }
}

/// Air sensor observation (`obs_air`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirObservation {
    pub hub_serial: String,
    pub sensor_serial: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_revision: Option<u32>,
    pub entries: Vec<AirEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirEntry {
    pub time: DateTime<Utc>,
    pub station_pressure: Pressure,
    pub air_temperature: Temperature,
    pub relative_humidity: f64,
    pub lightning_strike_count: u32,
    pub lightning_average_distance: Distance,
    pub battery: f64,
    pub reporting_interval: u32,
}

impl AirEntry {
    pub fn dew_point(&self) -> Temperature {
        dew_point(self.air_temperature, self.relative_humidity)
    }
}

/// Sky sensor observation (`obs_sky`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyObservation {
    pub hub_serial: String,
    pub sensor_serial: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_revision: Option<u32>,
    pub entries: Vec<SkyEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyEntry {
    pub time: DateTime<Utc>,
    pub illuminance: u32,
    pub uv_index: f64,
    pub rain_accumulation: Distance,
    pub wind_lull: Speed,
    pub wind_average: Speed,
    pub wind_gust: Speed,
    pub wind_direction: Direction,
    pub battery: f64,
    pub reporting_interval: u32,
    pub solar_radiation: u32,
    /// Not reported by every firmware
    pub local_day_rain_accumulation: Option<Distance>,
    pub precipitation_type: PrecipitationType,
    pub wind_sample_interval: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Three-second wind sample (`rapid_wind`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RapidWind {
    pub hub_serial: String,
    pub sensor_serial: String,
    pub time: DateTime<Utc>,
    pub wind_speed: Speed,
    pub wind_direction: Direction,
}

/// Rain start event (`evt_precip`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainStart {
    pub hub_serial: String,
    pub sensor_serial: String,
    pub time: DateTime<Utc>,
}

/// Lightning strike event (`evt_strike`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightningStrike {
    pub hub_serial: String,
    pub sensor_serial: String,
    pub time: DateTime<Utc>,
    /// Estimated distance from the sensor to the strike
    pub distance: Distance,
    /// Unitless strike energy
    pub energy: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// Hub health report (`hub_status`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubStatus {
    pub hub_serial: String,
    pub time: DateTime<Utc>,
    pub firmware_revision: String,
    /// Seconds
    pub uptime: u64,
    pub rssi: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_flags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

/// Sensor health report (`device_status`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub hub_serial: String,
    pub sensor_serial: String,
    pub time: DateTime<Utc>,
    pub uptime: u64,
    pub voltage: f64,
    pub firmware_revision: u32,
    pub rssi: i32,
    pub hub_rssi: i32,
    /// Bit field of sensor faults; 0 means healthy
    pub sensor_status: u32,
}

impl DeviceStatus {
    pub fn is_healthy(&self) -> bool {
        self.sensor_status == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────────────────────────────────────

/// A decoded hub message, tagged by its wire type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "obs_st")]
    Observation(Observation),
    #[serde(rename = "obs_air")]
    AirObservation(AirObservation),
    #[serde(rename = "obs_sky")]
    SkyObservation(SkyObservation),
    #[serde(rename = "rapid_wind")]
    RapidWind(RapidWind),
    #[serde(rename = "evt_precip")]
    RainStart(RainStart),
    #[serde(rename = "evt_strike")]
    LightningStrike(LightningStrike),
    #[serde(rename = "hub_status")]
    HubStatus(HubStatus),
    #[serde(rename = "device_status")]
    DeviceStatus(DeviceStatus),
}

impl Message {
    pub fn kind(&self) -> MessageType {
        match self {
            Message::Observation(_) => MessageType::Observation,
            Message::AirObservation(_) => MessageType::AirObservation,
            Message::SkyObservation(_) => MessageType::SkyObservation,
            Message::RapidWind(_) => MessageType::RapidWind,
            Message::RainStart(_) => MessageType::RainStart,
            Message::LightningStrike(_) => MessageType::LightningStrike,
            Message::HubStatus(_) => MessageType::HubStatus,
            Message::DeviceStatus(_) => MessageType::DeviceStatus,
        }
    }

    /// Event time reported by the device (first sample for observations)
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Message::Observation(m) => m.entries.first().map(|e| e.time).unwrap_or_default(),
            Message::AirObservation(m) => m.entries.first().map(|e| e.time).unwrap_or_default(),
            Message::SkyObservation(m) => m.entries.first().map(|e| e.time).unwrap_or_default(),
            Message::RapidWind(m) => m.time,
            Message::RainStart(m) => m.time,
            Message::LightningStrike(m) => m.time,
            Message::HubStatus(m) => m.time,
            Message::DeviceStatus(m) => m.time,
        }
    }

    pub fn hub_serial(&self) -> &str {
        match self {
            Message::Observation(m) => &m.hub_serial,
            Message::AirObservation(m) => &m.hub_serial,
            Message::SkyObservation(m) => &m.hub_serial,
            Message::RapidWind(m) => &m.hub_serial,
            Message::RainStart(m) => &m.hub_serial,
            Message::LightningStrike(m) => &m.hub_serial,
            Message::HubStatus(m) => &m.hub_serial,
            Message::DeviceStatus(m) => &m.hub_serial,
        }
    }

    /// `None` for hub status messages
    pub fn sensor_serial(&self) -> Option<&str> {
        match self {
            Message::Observation(m) => Some(&m.sensor_serial),
            Message::AirObservation(m) => Some(&m.sensor_serial),
            Message::SkyObservation(m) => Some(&m.sensor_serial),
            Message::RapidWind(m) => Some(&m.sensor_serial),
            Message::RainStart(m) => Some(&m.sensor_serial),
            Message::LightningStrike(m) => Some(&m.sensor_serial),
            Message::HubStatus(_) => None,
            Message::DeviceStatus(m) => Some(&m.sensor_serial),
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Observation(m) => match m.entries.last() {
                Some(e) => write!(
                    f,
                    "observation {}: {:.2} {:.2} wind {:.2} from {}",
                    m.sensor_serial,
                    e.air_temperature,
                    e.station_pressure,
                    e.wind_average,
                    e.wind_direction.cardinal()
                ),
                None => write!(f, "observation {}: empty", m.sensor_serial),
            },
            Message::AirObservation(m) => {
                write!(f, "air observation {} ({} samples)", m.sensor_serial, m.entries.len())
            }
            Message::SkyObservation(m) => {
                write!(f, "sky observation {} ({} samples)", m.sensor_serial, m.entries.len())
            }
            Message::RapidWind(m) => write!(
                f,
                "rapid wind {}: {:.2} from {}",
                m.sensor_serial,
                m.wind_speed,
                m.wind_direction.cardinal()
            ),
            Message::RainStart(m) => write!(f, "rain start {} at {}", m.sensor_serial, m.time),
            Message::LightningStrike(m) => write!(
                f,
                "lightning strike {}: {:.1} away, energy {}",
                m.sensor_serial, m.distance, m.energy
            ),
            Message::HubStatus(m) => write!(
                f,
                "hub status {}: firmware {}, uptime {}s",
                m.hub_serial, m.firmware_revision, m.uptime
            ),
            Message::DeviceStatus(m) => write!(
                f,
                "device status {}: {:.2} V, status {:#x}",
                m.sensor_serial, m.voltage, m.sensor_status
            ),
        }
    }
}
