//! Temperature readings

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Measurement, Unit, UnitParseError};

/// Temperature scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl Unit for TemperatureUnit {
    fn scale(self) -> f64 {
        match self {
            Self::Celsius | Self::Kelvin => 1.0,
            Self::Fahrenheit => 5.0 / 9.0,
        }
    }

    fn offset(self) -> f64 {
        match self {
            Self::Celsius => 0.0,
            Self::Fahrenheit => -32.0 * 5.0 / 9.0,
            Self::Kelvin => -273.15,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
            Self::Kelvin => "K",
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" | "celsius" | "°c" => Ok(Self::Celsius),
            "f" | "fahrenheit" | "°f" => Ok(Self::Fahrenheit),
            "k" | "kelvin" => Ok(Self::Kelvin),
            _ => Err(UnitParseError::UnknownUnit {
                kind: "temperature",
                tag: s.to_string(),
            }),
        }
    }
}

/// A temperature reading
pub type Temperature = Measurement<TemperatureUnit>;

impl Measurement<TemperatureUnit> {
    pub fn celsius(&self) -> f64 {
        self.in_unit(TemperatureUnit::Celsius)
    }

    pub fn fahrenheit(&self) -> f64 {
        self.in_unit(TemperatureUnit::Fahrenheit)
    }

    pub fn kelvin(&self) -> f64 {
        self.in_unit(TemperatureUnit::Kelvin)
    }
}

/// Approximate dew point from air temperature and relative humidity (%).
///
/// Uses `Td ≈ T - (100 - RH) / 5`, which is accurate to about 1 °C above 50% RH.
/// The result is expressed in Celsius.
pub fn dew_point(air: Temperature, relative_humidity: f64) -> Temperature {
    Temperature::new(
        air.celsius() - (100.0 - relative_humidity) / 5.0,
        TemperatureUnit::Celsius,
    )
}
