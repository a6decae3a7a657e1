//! Tempest Units - Measurement value types for weather telemetry
//!
//! Every quantity is a `(value, unit)` pair. Conversions are pure and total:
//! each unit knows its linear relationship to the base unit of its kind, and
//! all conversions go through that one path.
//!
//! | Kind        | Base unit | Other units                              |
//! |-------------|-----------|------------------------------------------|
//! | Temperature | °C        | °F, K                                    |
//! | Pressure    | Pa        | mb, hPa, inHg                            |
//! | Speed       | m/s       | km/h, mph, kn, ft/s                      |
//! | Distance    | m         | km, mm, mi, nmi, ft, yd, in              |
//! | Direction   | degrees   | radians, mils (plus 16-point compass)    |

mod direction;
mod distance;
mod pressure;
mod speed;
mod temperature;

pub use direction::*;
pub use distance::*;
pub use pressure::*;
pub use speed::*;
pub use temperature::*;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Unit Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of measure related linearly to the base unit of its kind.
///
/// `base = value * scale() + offset()`
pub trait Unit: Copy + PartialEq + std::fmt::Debug {
    /// Multiplier taking a value in this unit to the base unit
    fn scale(self) -> f64;

    /// Offset added after scaling (non-zero only for temperature scales)
    fn offset(self) -> f64 {
        0.0
    }

    /// Short symbol used when formatting
    fn symbol(self) -> &'static str;
}

/// Convert a raw value between two units of the same kind
pub fn convert<U: Unit>(value: f64, from: U, to: U) -> f64 {
    if from == to {
        return value;
    }
    let base = value * from.scale() + from.offset();
    (base - to.offset()) / to.scale()
}

// ─────────────────────────────────────────────────────────────────────────────
// Measurement
// ─────────────────────────────────────────────────────────────────────────────

/// A magnitude tagged with its unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement<U> {
    pub value: f64,
    pub unit: U,
}

impl<U: Unit> Measurement<U> {
    /// Create a new measurement
    pub fn new(value: f64, unit: U) -> Self {
        Self { value, unit }
    }

    /// Value expressed in `unit`
    pub fn in_unit(&self, unit: U) -> f64 {
        convert(self.value, self.unit, unit)
    }

    /// Same quantity re-expressed in `unit`
    pub fn to(&self, unit: U) -> Self {
        Self::new(self.in_unit(unit), unit)
    }
}

impl<U: Unit> std::fmt::Display for Measurement<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match f.precision() {
            Some(p) => write!(f, "{:.*} {}", p, self.value, self.unit.symbol()),
            None => write!(f, "{} {}", self.value, self.unit.symbol()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error returned when a unit tag or compass heading cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitParseError {
    #[error("Unknown {kind} unit: {tag}")]
    UnknownUnit { kind: &'static str, tag: String },

    #[error("Unknown compass heading: {0}")]
    UnknownHeading(String),
}

#[cfg(test)]
pub(crate) fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_same_unit_is_identity() {
        assert_eq!(convert(12.5, TemperatureUnit::Kelvin, TemperatureUnit::Kelvin), 12.5);
    }

    #[test]
    fn test_display_with_precision() {
        let t = Temperature::new(18.678, TemperatureUnit::Celsius);
        assert_eq!(format!("{:.1}", t), "18.7 °C");
    }

    #[test]
    fn test_measurement_serde() {
        let p = Pressure::new(995.9, PressureUnit::Millibar);
        let json = serde_json::to_string(&p).unwrap();
        let back: Pressure = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
