//! Barometric pressure readings

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Distance, Measurement, Unit, UnitParseError};

/// Pascals in one inch of mercury (at 0 °C)
const PASCALS_PER_INHG: f64 = 3386.389;

/// Scale height used by the simplified barometric formula, in meters
const BAROMETRIC_HEIGHT_M: f64 = 44330.0;

/// Pressure unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureUnit {
    Pascal,
    Millibar,
    Hectopascal,
    InchesOfMercury,
}

impl Unit for PressureUnit {
    fn scale(self) -> f64 {
        match self {
            Self::Pascal => 1.0,
            Self::Millibar | Self::Hectopascal => 100.0,
            Self::InchesOfMercury => PASCALS_PER_INHG,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Pascal => "Pa",
            Self::Millibar => "mb",
            Self::Hectopascal => "hPa",
            Self::InchesOfMercury => "inHg",
        }
    }
}

impl FromStr for PressureUnit {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pa" | "pascal" => Ok(Self::Pascal),
            "mb" | "mbar" | "millibar" => Ok(Self::Millibar),
            "hpa" | "hectopascal" => Ok(Self::Hectopascal),
            "inhg" => Ok(Self::InchesOfMercury),
            _ => Err(UnitParseError::UnknownUnit {
                kind: "pressure",
                tag: s.to_string(),
            }),
        }
    }
}

/// A pressure reading
pub type Pressure = Measurement<PressureUnit>;

impl Measurement<PressureUnit> {
    pub fn pascals(&self) -> f64 {
        self.in_unit(PressureUnit::Pascal)
    }

    pub fn millibars(&self) -> f64 {
        self.in_unit(PressureUnit::Millibar)
    }

    pub fn hectopascals(&self) -> f64 {
        self.in_unit(PressureUnit::Hectopascal)
    }

    pub fn inches_of_mercury(&self) -> f64 {
        self.in_unit(PressureUnit::InchesOfMercury)
    }

    /// Station pressure reduced to sea level for a station at `elevation`.
    ///
    /// `p_sea = p / (1 - h / 44330)`. The result is in pascals.
    pub fn sea_level(&self, elevation: Distance) -> Pressure {
        let factor = 1.0 - elevation.meters() / BAROMETRIC_HEIGHT_M;
        Pressure::new(self.pascals() / factor, PressureUnit::Pascal)
    }
}
