//! Typed decoders, one per message type
//!
//! Decoding is fail-fast: the first missing or malformed required field
//! aborts the message and no partially populated record is returned. All
//! wire numbers are floats; integer fields truncate toward zero.

use chrono::{DateTime, Utc};
use serde_json::Value;

use tempest_units::{
    Direction, DirectionUnit, Distance, DistanceUnit, Pressure, PressureUnit, Speed, SpeedUnit,
    Temperature, TemperatureUnit,
};

use super::raw::{HUB_SERIAL_FIELD, MessageType, RawMessage, SERIAL_FIELD};
use super::types::*;

/// A required field that is absent or unusable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Missing field '{0}'")]
    MissingField(String),

    #[error("Field '{field}' expected {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    #[error("Field '{field}' has {actual} elements, expected {expected}")]
    WrongLength {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Field '{field}' has invalid value: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl DecodeError {
    /// Path of the offending field
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField(field) => field,
            Self::WrongType { field, .. } => field,
            Self::WrongLength { field, .. } => field,
            Self::InvalidValue { field, .. } => field,
        }
    }
}

type Result<T> = std::result::Result<T, DecodeError>;

/// Decode a classified message into its typed record
pub fn decode(raw: &RawMessage, kind: MessageType) -> Result<Message> {
    match kind {
        MessageType::Observation => decode_observation(raw).map(Message::Observation),
        MessageType::AirObservation => decode_air_observation(raw).map(Message::AirObservation),
        MessageType::SkyObservation => decode_sky_observation(raw).map(Message::SkyObservation),
        MessageType::RapidWind => decode_rapid_wind(raw).map(Message::RapidWind),
        MessageType::RainStart => decode_rain_start(raw).map(Message::RainStart),
        MessageType::LightningStrike => decode_lightning_strike(raw).map(Message::LightningStrike),
        MessageType::HubStatus => decode_hub_status(raw).map(Message::HubStatus),
        MessageType::DeviceStatus => decode_device_status(raw).map(Message::DeviceStatus),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Field Access
// ─────────────────────────────────────────────────────────────────────────────

fn field<'a>(raw: &'a RawMessage, name: &str) -> Result<&'a Value> {
    raw.get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| DecodeError::MissingField(name.to_string()))
}

fn string(raw: &RawMessage, name: &str) -> Result<String> {
    match field(raw, name)? {
        Value::String(s) => Ok(s.clone()),
        _ => Err(DecodeError::WrongType {
            field: name.to_string(),
            expected: "string",
        }),
    }
}

fn number(raw: &RawMessage, name: &str) -> Result<f64> {
    as_number(field(raw, name)?, name)
}

fn optional_number(raw: &RawMessage, name: &str) -> Result<Option<f64>> {
    match raw.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => as_number(v, name).map(Some),
    }
}

fn as_number(value: &Value, path: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| DecodeError::WrongType {
        field: path.to_string(),
        expected: "number",
    })
}

fn array<'a>(raw: &'a RawMessage, name: &str) -> Result<&'a [Value]> {
    match field(raw, name)? {
        Value::Array(items) => Ok(items),
        _ => Err(DecodeError::WrongType {
            field: name.to_string(),
            expected: "array",
        }),
    }
}

fn truncate_u32(value: f64) -> u32 {
    value as u32
}

fn truncate_u64(value: f64) -> u64 {
    value as u64
}

fn truncate_i32(value: f64) -> i32 {
    value as i32
}

fn epoch(seconds: f64, path: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(seconds as i64, 0).ok_or_else(|| DecodeError::InvalidValue {
        field: path.to_string(),
        reason: format!("{seconds} is not a valid epoch"),
    })
}

fn precipitation(code: f64, path: &str) -> Result<PrecipitationType> {
    PrecipitationType::from_code(truncate_u32(code)).ok_or_else(|| DecodeError::InvalidValue {
        field: path.to_string(),
        reason: format!("unknown precipitation type {code}"),
    })
}

/// One positional entry, with indexes reported in error paths
struct Entry<'a> {
    path: String,
    values: &'a [Value],
}

impl<'a> Entry<'a> {
    /// Validate the shape of `value` as a positional entry of `len` fields
    fn new(value: &'a Value, path: String, len: usize) -> Result<Self> {
        let Value::Array(values) = value else {
            return Err(DecodeError::WrongType {
                field: path,
                expected: "array",
            });
        };
        if values.len() < len {
            return Err(DecodeError::WrongLength {
                field: path,
                expected: len,
                actual: values.len(),
            });
        }
        Ok(Self { path, values })
    }

    fn path(&self, index: usize, name: &str) -> String {
        format!("{}[{}] {}", self.path, index, name)
    }

    fn number(&self, index: usize, name: &str) -> Result<f64> {
        match self.values.get(index) {
            None | Some(Value::Null) => Err(DecodeError::MissingField(self.path(index, name))),
            Some(v) => as_number(v, &self.path(index, name)),
        }
    }

    fn optional_number(&self, index: usize, name: &str) -> Result<Option<f64>> {
        match self.values.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => as_number(v, &self.path(index, name)).map(Some),
        }
    }

    fn time(&self, index: usize) -> Result<DateTime<Utc>> {
        epoch(self.number(index, "epoch")?, &self.path(index, "epoch"))
    }

    fn speed(&self, index: usize, name: &str) -> Result<Speed> {
        Ok(Speed::new(self.number(index, name)?, SpeedUnit::MetersPerSecond))
    }

    fn direction(&self, index: usize, name: &str) -> Result<Direction> {
        Ok(Direction::new(self.number(index, name)?, DirectionUnit::Degrees))
    }

    fn pressure(&self, index: usize, name: &str) -> Result<Pressure> {
        Ok(Pressure::new(self.number(index, name)?, PressureUnit::Millibar))
    }

    fn temperature(&self, index: usize, name: &str) -> Result<Temperature> {
        Ok(Temperature::new(self.number(index, name)?, TemperatureUnit::Celsius))
    }

    fn distance(&self, index: usize, name: &str, unit: DistanceUnit) -> Result<Distance> {
        Ok(Distance::new(self.number(index, name)?, unit))
    }

    fn optional_distance(
        &self,
        index: usize,
        name: &str,
        unit: DistanceUnit,
    ) -> Result<Option<Distance>> {
        Ok(self
            .optional_number(index, name)?
            .map(|value| Distance::new(value, unit)))
    }

    fn count(&self, index: usize, name: &str) -> Result<u32> {
        self.number(index, name).map(truncate_u32)
    }

    fn precipitation(&self, index: usize) -> Result<PrecipitationType> {
        let name = "precipitation_type";
        precipitation(self.number(index, name)?, &self.path(index, name))
    }
}

/// Iterate the entries of an observation array (`obs`), requiring at least one
fn entries<'a, T>(
    raw: &'a RawMessage,
    len: usize,
    decode_entry: impl Fn(&Entry<'a>) -> Result<T>,
) -> Result<Vec<T>> {
    const FIELD: &str = "obs";
    let items = array(raw, FIELD)?;
    if items.is_empty() {
        return Err(DecodeError::WrongLength {
            field: FIELD.to_string(),
            expected: 1,
            actual: 0,
        });
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| decode_entry(&Entry::new(item, format!("{FIELD}[{i}]"), len)?))
        .collect()
}

fn serials(raw: &RawMessage) -> Result<(String, String)> {
    Ok((string(raw, HUB_SERIAL_FIELD)?, string(raw, SERIAL_FIELD)?))
}

fn firmware(raw: &RawMessage) -> Result<Option<u32>> {
    Ok(optional_number(raw, "firmware_revision")?.map(truncate_u32))
}

// ─────────────────────────────────────────────────────────────────────────────
// Observations
// ─────────────────────────────────────────────────────────────────────────────

const OBSERVATION_FIELDS: usize = 18;
const AIR_FIELDS: usize = 8;
const SKY_FIELDS: usize = 14;

fn decode_observation(raw: &RawMessage) -> Result<Observation> {
    let (hub_serial, sensor_serial) = serials(raw)?;
    let entries = entries(raw, OBSERVATION_FIELDS, |e| {
        Ok(ObservationEntry {
            time: e.time(0)?,
            wind_lull: e.speed(1, "wind_lull")?,
            wind_average: e.speed(2, "wind_average")?,
            wind_gust: e.speed(3, "wind_gust")?,
            wind_direction: e.direction(4, "wind_direction")?,
            wind_sample_interval: e.count(5, "wind_sample_interval")?,
            station_pressure: e.pressure(6, "station_pressure")?,
            air_temperature: e.temperature(7, "air_temperature")?,
            relative_humidity: e.number(8, "relative_humidity")?,
            illuminance: e.count(9, "illuminance")?,
            uv_index: e.number(10, "uv_index")?,
            solar_radiation: e.count(11, "solar_radiation")?,
            rain_accumulation: e.distance(12, "rain_accumulation", DistanceUnit::Millimeters)?,
            precipitation_type: e.precipitation(13)?,
            lightning_average_distance: e.distance(
                14,
                "lightning_average_distance",
                DistanceUnit::Kilometers,
            )?,
            lightning_strike_count: e.count(15, "lightning_strike_count")?,
            battery: e.number(16, "battery")?,
            reporting_interval: e.count(17, "reporting_interval")?,
        })
    })?;

    Ok(Observation {
        hub_serial,
        sensor_serial,
        firmware_revision: firmware(raw)?,
        entries,
    })
}

fn decode_air_observation(raw: &RawMessage) -> Result<AirObservation> {
    let (hub_serial, sensor_serial) = serials(raw)?;
    let entries = entries(raw, AIR_FIELDS, |e| {
        Ok(AirEntry {
            time: e.time(0)?,
            station_pressure: e.pressure(1, "station_pressure")?,
            air_temperature: e.temperature(2, "air_temperature")?,
            relative_humidity: e.number(3, "relative_humidity")?,
            lightning_strike_count: e.count(4, "lightning_strike_count")?,
            lightning_average_distance: e.distance(
                5,
                "lightning_average_distance",
                DistanceUnit::Kilometers,
            )?,
            battery: e.number(6, "battery")?,
            reporting_interval: e.count(7, "reporting_interval")?,
        })
    })?;

    Ok(AirObservation {
        hub_serial,
        sensor_serial,
        firmware_revision: firmware(raw)?,
        entries,
    })
}

fn decode_sky_observation(raw: &RawMessage) -> Result<SkyObservation> {
    let (hub_serial, sensor_serial) = serials(raw)?;
    let entries = entries(raw, SKY_FIELDS, |e| {
        Ok(SkyEntry {
            time: e.time(0)?,
            illuminance: e.count(1, "illuminance")?,
            uv_index: e.number(2, "uv_index")?,
            rain_accumulation: e.distance(3, "rain_accumulation", DistanceUnit::Millimeters)?,
            wind_lull: e.speed(4, "wind_lull")?,
            wind_average: e.speed(5, "wind_average")?,
            wind_gust: e.speed(6, "wind_gust")?,
            wind_direction: e.direction(7, "wind_direction")?,
            battery: e.number(8, "battery")?,
            reporting_interval: e.count(9, "reporting_interval")?,
            solar_radiation: e.count(10, "solar_radiation")?,
            local_day_rain_accumulation: e.optional_distance(
                11,
                "local_day_rain_accumulation",
                DistanceUnit::Millimeters,
            )?,
            precipitation_type: e.precipitation(12)?,
            wind_sample_interval: e.count(13, "wind_sample_interval")?,
        })
    })?;

    Ok(SkyObservation {
        hub_serial,
        sensor_serial,
        firmware_revision: firmware(raw)?,
        entries,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

fn decode_rapid_wind(raw: &RawMessage) -> Result<RapidWind> {
    let (hub_serial, sensor_serial) = serials(raw)?;
    let e = Entry::new(field(raw, "ob")?, "ob".to_string(), 3)?;

    Ok(RapidWind {
        hub_serial,
        sensor_serial,
        time: e.time(0)?,
        wind_speed: e.speed(1, "wind_speed")?,
        wind_direction: e.direction(2, "wind_direction")?,
    })
}

fn decode_rain_start(raw: &RawMessage) -> Result<RainStart> {
    let (hub_serial, sensor_serial) = serials(raw)?;
    let e = Entry::new(field(raw, "evt")?, "evt".to_string(), 1)?;

    Ok(RainStart {
        hub_serial,
        sensor_serial,
        time: e.time(0)?,
    })
}

fn decode_lightning_strike(raw: &RawMessage) -> Result<LightningStrike> {
    let (hub_serial, sensor_serial) = serials(raw)?;
    let e = Entry::new(field(raw, "evt")?, "evt".to_string(), 3)?;

    Ok(LightningStrike {
        hub_serial,
        sensor_serial,
        time: e.time(0)?,
        distance: e.distance(1, "distance", DistanceUnit::Kilometers)?,
        energy: e.count(2, "energy")?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

fn decode_hub_status(raw: &RawMessage) -> Result<HubStatus> {
    const FIRMWARE: &str = "firmware_revision";
    // Hubs report their firmware as a string, older ones as a number
    let firmware_revision = match field(raw, FIRMWARE)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => {
            return Err(DecodeError::WrongType {
                field: FIRMWARE.to_string(),
                expected: "string or number",
            });
        }
    };

    let reset_flags = match raw.get("reset_flags") {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };

    Ok(HubStatus {
        hub_serial: string(raw, SERIAL_FIELD)?,
        time: epoch(number(raw, "timestamp")?, "timestamp")?,
        firmware_revision,
        uptime: truncate_u64(number(raw, "uptime")?),
        rssi: truncate_i32(number(raw, "rssi")?),
        reset_flags,
        seq: optional_number(raw, "seq")?.map(truncate_u64),
    })
}

fn decode_device_status(raw: &RawMessage) -> Result<DeviceStatus> {
    let (hub_serial, sensor_serial) = serials(raw)?;

    Ok(DeviceStatus {
        hub_serial,
        sensor_serial,
        time: epoch(number(raw, "timestamp")?, "timestamp")?,
        uptime: truncate_u64(number(raw, "uptime")?),
        voltage: number(raw, "voltage")?,
        firmware_revision: truncate_u32(number(raw, "firmware_revision")?),
        rssi: truncate_i32(number(raw, "rssi")?),
        hub_rssi: truncate_i32(number(raw, "hub_rssi")?),
        sensor_status: truncate_u32(number(raw, "sensor_status")?),
    })
}
