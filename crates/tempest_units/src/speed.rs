//! Wind speed readings

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Measurement, Unit, UnitParseError};

/// Speed unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    MetersPerSecond,
    KilometersPerHour,
    MilesPerHour,
    Knots,
    FeetPerSecond,
}

impl Unit for SpeedUnit {
    fn scale(self) -> f64 {
        match self {
            Self::MetersPerSecond => 1.0,
            Self::KilometersPerHour => 1.0 / 3.6,
            Self::MilesPerHour => 0.44704,
            Self::Knots => 1852.0 / 3600.0,
            Self::FeetPerSecond => 0.3048,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::MetersPerSecond => "m/s",
            Self::KilometersPerHour => "km/h",
            Self::MilesPerHour => "mph",
            Self::Knots => "kn",
            Self::FeetPerSecond => "ft/s",
        }
    }
}

impl FromStr for SpeedUnit {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "m/s" | "mps" => Ok(Self::MetersPerSecond),
            "km/h" | "kph" | "kmh" => Ok(Self::KilometersPerHour),
            "mph" => Ok(Self::MilesPerHour),
            "kn" | "kt" | "kts" | "knots" => Ok(Self::Knots),
            "ft/s" | "fps" => Ok(Self::FeetPerSecond),
            _ => Err(UnitParseError::UnknownUnit {
                kind: "speed",
                tag: s.to_string(),
            }),
        }
    }
}

/// A speed reading
pub type Speed = Measurement<SpeedUnit>;

impl Measurement<SpeedUnit> {
    pub fn meters_per_second(&self) -> f64 {
        self.in_unit(SpeedUnit::MetersPerSecond)
    }

    pub fn kilometers_per_hour(&self) -> f64 {
        self.in_unit(SpeedUnit::KilometersPerHour)
    }

    pub fn miles_per_hour(&self) -> f64 {
        self.in_unit(SpeedUnit::MilesPerHour)
    }

    pub fn knots(&self) -> f64 {
        self.in_unit(SpeedUnit::Knots)
    }

    pub fn feet_per_second(&self) -> f64 {
        self.in_unit(SpeedUnit::FeetPerSecond)
    }
}
