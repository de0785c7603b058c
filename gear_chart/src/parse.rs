//! Line-oriented bike description format.
//!
//! ```text
//! # Bike Display Name
//! front: 50, 34
//! rear: 11, 13, 15, 17, 19, 21, 24, 28
//! wheel_diameter: 700 mm
//! crank: 172.5 mm
//! ```
//!
//! A `#` line opens a new bike; every other non-blank line is `key: value`.

use crate::bike::{Bike, BikeBuilder, Key};
use crate::units::{Length, DEFAULT_UNIT};
use crate::GearError;

pub fn parse_bikes(text: &str) -> Result<Vec<Bike>, GearError> {
    parse_lines(text.lines())
}

pub fn parse_lines<I, S>(lines: I) -> Result<Vec<Bike>, GearError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut bikes = Vec::new();
    let mut current: Option<BikeBuilder> = None;

    for (idx, raw) in lines.into_iter().enumerate() {
        let line = idx + 1;
        let raw = raw.as_ref();
        if raw.trim().is_empty() {
            continue;
        }

        if let Some(rest) = raw.strip_prefix('#') {
            if let Some(finished) = current.replace(BikeBuilder::new(header_name(rest))) {
                bikes.push(finished.build()?);
            }
            continue;
        }

        let malformed = || GearError::MalformedLine {
            line,
            text: raw.to_string(),
        };
        let builder = current.as_mut().ok_or_else(malformed)?;
        let (key, value) = raw.split_once(':').ok_or_else(malformed)?;
        let (key, value) = (key.trim(), value.trim());
        let key = Key::from_name(key).ok_or_else(|| GearError::UnknownKey {
            line,
            key: key.to_string(),
        })?;

        if key.is_list() {
            builder.teeth(key, parse_list(value, line)?)?;
        } else {
            builder.length(key, parse_length(value, line)?)?;
        }
    }

    if let Some(finished) = current {
        bikes.push(finished.build()?);
    }
    Ok(bikes)
}

/// The character after `#` is a delimiter; the rest is the name verbatim.
fn header_name(rest: &str) -> &str {
    let mut chars = rest.chars();
    chars.next();
    chars.as_str()
}

fn parse_list(value: &str, line: usize) -> Result<Vec<f64>, GearError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<f64>().map_err(|_| GearError::InvalidValue {
                line,
                value: item.to_string(),
            })
        })
        .collect()
}

/// `magnitude [unit]`, e.g. `700`, `172.5 mm`, `27 in`.
fn parse_length(value: &str, line: usize) -> Result<Length, GearError> {
    let invalid = || GearError::InvalidValue {
        line,
        value: value.to_string(),
    };
    if value.contains(',') {
        return Err(invalid());
    }
    let mut tokens = value.split_whitespace();
    let (magnitude, unit) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(magnitude), unit, None) => (magnitude, unit.unwrap_or(DEFAULT_UNIT.as_str())),
        _ => return Err(invalid()),
    };
    let digits = magnitude.strip_prefix('-').unwrap_or(magnitude);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(invalid());
    }
    let magnitude: f64 = magnitude.parse().map_err(|_| invalid())?;
    Length::parse_unit(magnitude, unit)
}
