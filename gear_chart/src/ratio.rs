//! Gearing measures for a single front/rear sprocket pair.

use std::f64::consts::{PI, TAU};

use crate::units::{Length, Unit};

pub fn gear_ratio(front: f64, rear: f64) -> f64 {
    front / rear
}

/// Distance travelled per crank revolution.
pub fn development(front: f64, rear: f64, full_radius: Length) -> Length {
    full_radius * (gear_ratio(front, rear) * TAU)
}

/// Equivalent direct-drive wheel diameter in inches. Ignores crank length.
pub fn gear_inches(front: f64, rear: f64, full_radius: Length) -> f64 {
    (development(front, rear, full_radius) / PI).to_unit(Unit::In)
}

/// Distance the bike moves per unit of pedal travel (dimensionless).
pub fn gain_ratio(front: f64, rear: f64, full_radius: Length, crank: Length) -> f64 {
    gear_ratio(front, rear) * (full_radius / crank)
}
