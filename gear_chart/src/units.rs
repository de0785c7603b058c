//! Length literals with unit suffixes, normalised to metres.

use std::fmt;
use std::ops::{Add, Div, Mul};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::GearError;

/// Unit assumed when a length literal carries no suffix.
pub const DEFAULT_UNIT: Unit = Unit::Mm;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Km,
    M,
    Dm,
    Cm,
    Mm,
    Ft,
    In,
}

impl Unit {
    pub const ALL: [Unit; 7] = [
        Unit::Km,
        Unit::M,
        Unit::Dm,
        Unit::Cm,
        Unit::Mm,
        Unit::Ft,
        Unit::In,
    ];

    /// Metres per one of this unit.
    pub fn metres(self) -> f64 {
        match self {
            Unit::Km => 1000.0,
            Unit::M => 1.0,
            Unit::Dm => 0.1,
            Unit::Cm => 0.01,
            Unit::Mm => 0.001,
            Unit::Ft => 0.3048,
            Unit::In => 0.0254,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Km => "km",
            Unit::M => "m",
            Unit::Dm => "dm",
            Unit::Cm => "cm",
            Unit::Mm => "mm",
            Unit::Ft => "ft",
            Unit::In => "in",
        }
    }
}

impl FromStr for Unit {
    type Err = GearError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::ALL
            .into_iter()
            .find(|unit| unit.as_str() == s)
            .ok_or_else(|| GearError::UnknownUnit(s.to_string()))
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert `value` expressed in `unit` to metres.
pub fn convert(value: f64, unit: &str) -> Result<f64, GearError> {
    Ok(value * unit.parse::<Unit>()?.metres())
}

/// A physical length. Only the canonical magnitude (metres) is stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Length(f64);

impl Length {
    pub fn new(value: f64, unit: Unit) -> Self {
        Length(value * unit.metres())
    }

    pub fn parse_unit(value: f64, unit: &str) -> Result<Self, GearError> {
        convert(value, unit).map(Length)
    }

    pub fn from_metres(metres: f64) -> Self {
        Length(metres)
    }

    pub fn from_mm(mm: f64) -> Self {
        Length::new(mm, Unit::Mm)
    }

    pub fn metres(self) -> f64 {
        self.0
    }

    pub fn to_unit(self, unit: Unit) -> f64 {
        self.0 / unit.metres()
    }
}

impl Add for Length {
    type Output = Length;

    fn add(self, rhs: Length) -> Length {
        Length(self.0 + rhs.0)
    }
}

impl Mul<f64> for Length {
    type Output = Length;

    fn mul(self, rhs: f64) -> Length {
        Length(self.0 * rhs)
    }
}

impl Div<f64> for Length {
    type Output = Length;

    fn div(self, rhs: f64) -> Length {
        Length(self.0 / rhs)
    }
}

/// Ratio of two lengths, dimensionless.
impl Div for Length {
    type Output = f64;

    fn div(self, rhs: Length) -> f64 {
        self.0 / rhs.0
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} mm", self.to_unit(Unit::Mm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipliers_relative_to_millimetres() {
        let mm = convert(1.0, "mm").unwrap();
        let expected = [
            ("km", 1_000_000.0),
            ("m", 1000.0),
            ("dm", 100.0),
            ("cm", 10.0),
            ("mm", 1.0),
            ("ft", 304.8),
            ("in", 25.4),
        ];
        for (unit, factor) in expected {
            let ratio = convert(1.0, unit).unwrap() / mm;
            assert!((ratio - factor).abs() < 1e-9 * factor, "{unit}: {ratio}");
        }
    }

    #[test]
    fn same_magnitude_from_any_unit() {
        let a = Length::parse_unit(700.0, "mm").unwrap();
        let b = Length::parse_unit(70.0, "cm").unwrap();
        let c = Length::parse_unit(0.7, "m").unwrap();
        assert!((a.metres() - b.metres()).abs() < 1e-12);
        assert!((a.metres() - c.metres()).abs() < 1e-12);
    }

    #[test]
    fn unknown_unit_is_rejected() {
        match convert(3.0, "furlong") {
            Err(GearError::UnknownUnit(unit)) => assert_eq!(unit, "furlong"),
            other => panic!("unexpected {:?}", other),
        }
        assert!("MM".parse::<Unit>().is_err());
    }

    #[test]
    fn length_arithmetic() {
        let wheel = Length::from_mm(311.0);
        let tyre = Length::new(1.0, Unit::In);
        let sum = wheel + tyre;
        assert!((sum.to_unit(Unit::Mm) - 336.4).abs() < 1e-9);
        assert!(((sum * 2.0) / sum - 2.0).abs() < 1e-12);
        assert_eq!(format!("{}", Length::from_mm(172.5)), "172.5 mm");
    }
}
