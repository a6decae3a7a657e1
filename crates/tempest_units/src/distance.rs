//! Distances: lightning range, rain depth, station elevation

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Measurement, Unit, UnitParseError};

/// Distance unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    Meters,
    Kilometers,
    Millimeters,
    Miles,
    NauticalMiles,
    Feet,
    Yards,
    Inches,
}

impl Unit for DistanceUnit {
    fn scale(self) -> f64 {
        match self {
            Self::Meters => 1.0,
            Self::Kilometers => 1000.0,
            Self::Millimeters => 0.001,
            Self::Miles => 1609.344,
            Self::NauticalMiles => 1852.0,
            Self::Feet => 0.3048,
            Self::Yards => 0.9144,
            Self::Inches => 0.0254,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Meters => "m",
            Self::Kilometers => "km",
            Self::Millimeters => "mm",
            Self::Miles => "mi",
            Self::NauticalMiles => "nmi",
            Self::Feet => "ft",
            Self::Yards => "yd",
            Self::Inches => "in",
        }
    }
}

impl FromStr for DistanceUnit {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "m" | "meters" => Ok(Self::Meters),
            "km" | "kilometers" => Ok(Self::Kilometers),
            "mm" | "millimeters" => Ok(Self::Millimeters),
            "mi" | "miles" => Ok(Self::Miles),
            "nmi" | "nautical_miles" => Ok(Self::NauticalMiles),
            "ft" | "feet" => Ok(Self::Feet),
            "yd" | "yards" => Ok(Self::Yards),
            "in" | "inches" => Ok(Self::Inches),
            _ => Err(UnitParseError::UnknownUnit {
                kind: "distance",
                tag: s.to_string(),
            }),
        }
    }
}

/// A distance measurement
pub type Distance = Measurement<DistanceUnit>;

impl Measurement<DistanceUnit> {
    pub fn meters(&self) -> f64 {
        self.in_unit(DistanceUnit::Meters)
    }

    pub fn kilometers(&self) -> f64 {
        self.in_unit(DistanceUnit::Kilometers)
    }

    pub fn millimeters(&self) -> f64 {
        self.in_unit(DistanceUnit::Millimeters)
    }

    pub fn miles(&self) -> f64 {
        self.in_unit(DistanceUnit::Miles)
    }

    pub fn nautical_miles(&self) -> f64 {
        self.in_unit(DistanceUnit::NauticalMiles)
    }

    pub fn feet(&self) -> f64 {
        self.in_unit(DistanceUnit::Feet)
    }

    pub fn yards(&self) -> f64 {
        self.in_unit(DistanceUnit::Yards)
    }

    pub fn inches(&self) -> f64 {
        self.in_unit(DistanceUnit::Inches)
    }
}
