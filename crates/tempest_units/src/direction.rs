//! Wind direction and 16-point compass headings

use std::f64::consts::PI;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Measurement, Unit, UnitParseError};

/// Mils in one full turn (NATO convention)
const MILS_PER_TURN: f64 = 6400.0;

/// Width of one compass sector in degrees
const SECTOR_DEGREES: f64 = 360.0 / 16.0;

/// Angular unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionUnit {
    Degrees,
    Radians,
    Mils,
}

impl Unit for DirectionUnit {
    fn scale(self) -> f64 {
        match self {
            Self::Degrees => 1.0,
            Self::Radians => 180.0 / PI,
            Self::Mils => 360.0 / MILS_PER_TURN,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Degrees => "°",
            Self::Radians => "rad",
            Self::Mils => "mil",
        }
    }
}

impl FromStr for DirectionUnit {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deg" | "degrees" | "°" => Ok(Self::Degrees),
            "rad" | "radians" => Ok(Self::Radians),
            "mil" | "mils" => Ok(Self::Mils),
            _ => Err(UnitParseError::UnknownUnit {
                kind: "direction",
                tag: s.to_string(),
            }),
        }
    }
}

/// A direction measurement (where the wind is coming from)
pub type Direction = Measurement<DirectionUnit>;

impl Measurement<DirectionUnit> {
    pub fn degrees(&self) -> f64 {
        self.in_unit(DirectionUnit::Degrees)
    }

    pub fn radians(&self) -> f64 {
        self.in_unit(DirectionUnit::Radians)
    }

    pub fn mils(&self) -> f64 {
        self.in_unit(DirectionUnit::Mils)
    }

    /// Compass heading containing this direction
    pub fn cardinal(&self) -> Cardinal {
        Cardinal::from_degrees(self.degrees())
    }
}

impl From<Cardinal> for Direction {
    fn from(heading: Cardinal) -> Self {
        Direction::new(heading.degrees(), DirectionUnit::Degrees)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Compass
// ─────────────────────────────────────────────────────────────────────────────

/// 16-point compass heading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinal {
    N,
    NNE,
    NE,
    ENE,
    E,
    ESE,
    SE,
    SSE,
    S,
    SSW,
    SW,
    WSW,
    W,
    WNW,
    NW,
    NNW,
}

impl Cardinal {
    /// All headings clockwise from north
    pub const ALL: [Cardinal; 16] = [
        Self::N,
        Self::NNE,
        Self::NE,
        Self::ENE,
        Self::E,
        Self::ESE,
        Self::SE,
        Self::SSE,
        Self::S,
        Self::SSW,
        Self::SW,
        Self::WSW,
        Self::W,
        Self::WNW,
        Self::NW,
        Self::NNW,
    ];

    /// Classify a bearing in degrees.
    ///
    /// The bearing is normalized into [0, 360) and each heading owns a 22.5°
    /// window centred on it, so N covers [348.75, 360) and [0, 11.25).
    pub fn from_degrees(degrees: f64) -> Self {
        let normalized = degrees.rem_euclid(360.0);
        let sector = ((normalized + SECTOR_DEGREES / 2.0) / SECTOR_DEGREES).floor();
        // NaN and infinities fall through `as usize` to 0 (north)
        Self::ALL[(sector as usize) % 16]
    }

    /// Centre bearing of this heading in degrees
    pub fn degrees(self) -> f64 {
        (self as usize) as f64 * SECTOR_DEGREES
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::N => "N",
            Self::NNE => "NNE",
            Self::NE => "NE",
            Self::ENE => "ENE",
            Self::E => "E",
            Self::ESE => "ESE",
            Self::SE => "SE",
            Self::SSE => "SSE",
            Self::S => "S",
            Self::SSW => "SSW",
            Self::SW => "SW",
            Self::WSW => "WSW",
            Self::W => "W",
            Self::WNW => "WNW",
            Self::NW => "NW",
            Self::NNW => "NNW",
        }
    }
}

impl std::fmt::Display for Cardinal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cardinal {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|h| h.as_str() == upper)
            .ok_or_else(|| UnitParseError::UnknownHeading(s.to_string()))
    }
}
