//! Gain-ratio computation and chart layout for comparing bicycle gearing.

pub mod bike;
pub mod layout;
pub mod parse;
pub mod ratio;
pub mod units;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bike::{Bike, BikeBuilder, GainRatioEntry, GearRow, Key};
pub use layout::{layout, BikeRow, ChartLayout, GridLine, GridWeight, LabelSide, Marker};
pub use parse::{parse_bikes, parse_lines};
pub use units::{convert, Length, Unit};

#[derive(Error, Debug)]
pub enum GearError {
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),
    #[error("line {line}: malformed line '{text}'")]
    MalformedLine { line: usize, text: String },
    #[error("line {line}: invalid value '{value}'")]
    InvalidValue { line: usize, value: String },
    #[error("line {line}: unknown key '{key}'")]
    UnknownKey { line: usize, key: String },
    #[error("bike '{bike}': missing {field}")]
    MissingField { bike: String, field: &'static str },
    #[error("bike '{bike}': {field} must be positive, got {value}")]
    InvalidField {
        bike: String,
        field: &'static str,
        value: String,
    },
    #[error("no bikes to chart")]
    EmptyInput,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Largest supersampled canvas, in pixels, a chart may be drawn on.
pub const MAX_DRAW_PIXELS: u64 = 1 << 28;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChartParams {
    pub width: u32,
    pub height: u32,
    /// Render at this multiple of the output size, then downscale.
    pub supersampling: u32,
}

impl Default for ChartParams {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            supersampling: 16,
        }
    }
}

impl ChartParams {
    pub fn validate(&self) -> Result<(), GearError> {
        if self.width == 0 || self.height == 0 {
            return Err(GearError::InvalidParameter(format!(
                "canvas size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.supersampling == 0 {
            return Err(GearError::InvalidParameter(
                "supersampling factor must be at least 1".into(),
            ));
        }
        let oversized = self.width.checked_mul(self.supersampling).is_none()
            || self.height.checked_mul(self.supersampling).is_none();
        if oversized {
            return Err(GearError::InvalidParameter(format!(
                "supersampling x{} overflows a {}x{} canvas",
                self.supersampling, self.width, self.height
            )));
        }
        let (draw_w, draw_h) = self.draw_size();
        let pixels = u64::from(draw_w) * u64::from(draw_h);
        if pixels > MAX_DRAW_PIXELS {
            return Err(GearError::InvalidParameter(format!(
                "{}x{} drawing canvas exceeds {} pixels",
                draw_w, draw_h, MAX_DRAW_PIXELS
            )));
        }
        Ok(())
    }

    pub fn draw_size(&self) -> (u32, u32) {
        (
            self.width * self.supersampling,
            self.height * self.supersampling,
        )
    }
}

/// Lay out `bikes` on the supersampled canvas described by `params`.
pub fn build_chart(bikes: &[Bike], params: &ChartParams) -> Result<ChartLayout, GearError> {
    params.validate()?;
    layout(bikes, params.draw_size())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_draw_size() {
        let params = ChartParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.draw_size(), (20480, 11520));
    }

    #[test]
    fn rejects_degenerate_params() {
        let mut params = ChartParams::default();
        params.supersampling = 0;
        assert!(matches!(
            params.validate(),
            Err(GearError::InvalidParameter(_))
        ));
        let params = ChartParams {
            width: 0,
            ..ChartParams::default()
        };
        assert!(params.validate().is_err());
        let params = ChartParams {
            width: u32::MAX,
            ..ChartParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_canvas_too_large_to_allocate() {
        let params = ChartParams {
            width: 100_000,
            height: 100_000,
            supersampling: 1,
        };
        assert!(matches!(
            params.validate(),
            Err(GearError::InvalidParameter(_))
        ));
        let params = ChartParams {
            supersampling: 17,
            ..ChartParams::default()
        };
        assert!(params.validate().is_ok());
        let params = ChartParams {
            supersampling: 18,
            ..ChartParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn build_chart_end_to_end() {
        let bikes = parse_bikes("# Road\nfront: 50, 34\nrear: 11, 28\n").unwrap();
        let params = ChartParams {
            width: 640,
            height: 360,
            supersampling: 2,
        };
        let chart = build_chart(&bikes, &params).unwrap();
        assert_eq!((chart.width, chart.height), (1280.0, 720.0));
        assert_eq!(chart.rows.len(), 1);
        assert_eq!(chart.rows[0].markers.len(), 4);
    }

    #[test]
    fn errors_render_readably() {
        let err = GearError::MissingField {
            bike: "Fixie".into(),
            field: "rear",
        };
        assert_eq!(err.to_string(), "bike 'Fixie': missing rear");
    }
}
