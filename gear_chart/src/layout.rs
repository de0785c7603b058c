//! Maps gain ratios onto a logarithmic chart and places markers and labels.
//!
//! Coordinates are canvas pixels with y growing downward. Every size in the
//! plan is derived from the canvas height so the same layout scales to any
//! supersampling factor.

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::bike::{Bike, GainRatioEntry};
use crate::GearError;

pub type Rgb = (u8, u8, u8);

pub const BACKGROUND_COLOR: Rgb = (0, 0, 0);
pub const MARKER_COLOR: Rgb = (200, 200, 200);
pub const TEXT_COLOR: Rgb = (255, 255, 255);

const AXIS_SPAN: f64 = 0.95;
const AXIS_OFFSET: f64 = 0.02;
/// Grid iteration stops once a tick lands this far past the right edge.
const GRID_OVERSHOOT: f64 = 1.1;
const GRID_LAST_TICK: u32 = 199;

const MARKER_RADIUS: f64 = 0.01;
const OUTLINE_WIDTH: f64 = 0.002;
const CHAINRING_SPREAD: f64 = 0.03;
const LABEL_GAP: f64 = 1.1;
const LARGE_FONT: f64 = 0.04;
const SMALL_FONT: f64 = 0.02;
const NAME_MARGIN: f64 = 0.02;
const GRID_LABEL_PAD: f64 = 0.003;
const GRID_LABEL_TOP: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GridWeight {
    /// Whole units, labelled.
    Major,
    /// Half units.
    Medium,
    Minor,
}

impl GridWeight {
    fn for_tick(tenths: u32) -> Self {
        if tenths % 10 == 0 {
            GridWeight::Major
        } else if tenths % 5 == 0 {
            GridWeight::Medium
        } else {
            GridWeight::Minor
        }
    }

    /// Stroke width as a fraction of canvas height.
    pub fn stroke_fraction(self) -> f64 {
        match self {
            GridWeight::Major => 0.003,
            GridWeight::Medium => 0.001,
            GridWeight::Minor => 0.0003,
        }
    }

    pub fn color(self) -> Rgb {
        match self {
            GridWeight::Major => (127, 127, 127),
            GridWeight::Medium | GridWeight::Minor => (119, 127, 127),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GridLine {
    pub value: f64,
    pub x: f64,
    pub weight: GridWeight,
    pub stroke_width: f64,
    pub color: Rgb,
    pub label: Option<String>,
}

/// Which side of its marker a gear label sits on, in screen terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelSide {
    Above,
    Below,
}

impl LabelSide {
    /// Direction along the y axis.
    pub fn sign(self) -> f64 {
        match self {
            LabelSide::Above => -1.0,
            LabelSide::Below => 1.0,
        }
    }

    fn flipped(self) -> Self {
        match self {
            LabelSide::Above => LabelSide::Below,
            LabelSide::Below => LabelSide::Above,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Marker {
    pub ratio: f64,
    pub front_rank: usize,
    pub rear_rank: usize,
    pub x: f64,
    pub y: f64,
    /// Cross-chained combination, drawn as an outline.
    pub flagged: bool,
    pub label: String,
    pub label_side: LabelSide,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BikeRow {
    pub name: String,
    pub y: f64,
    pub name_x: f64,
    pub markers: Vec<Marker>,
}

/// Everything a renderer needs to draw one chart frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartLayout {
    pub width: f64,
    pub height: f64,
    pub max_ratio: f64,
    pub marker_radius: f64,
    pub outline_width: f64,
    /// Distance from a marker's centre to the near edge of its label.
    pub label_gap: f64,
    pub large_font: f64,
    pub small_font: f64,
    pub grid_label_pad: f64,
    pub grid_label_top: f64,
    pub grid: Vec<GridLine>,
    pub rows: Vec<BikeRow>,
}

/// Horizontal position of `value` on a log axis whose top is `max_ratio`.
///
/// 1.0 maps to 2% of the width and `max_ratio` to 97%.
pub fn axis_x(value: f64, max_ratio: f64, width: f64) -> f64 {
    value.ln() / max_ratio.ln() * width * AXIS_SPAN + AXIS_OFFSET * width
}

/// Signed distance of a 1-based rank from the middle of `count` ranks.
pub fn deviation(rank: usize, count: usize) -> f64 {
    rank as f64 - count as f64 / 2.0 - 0.5
}

/// Front and rear move in opposite directions from their centres, by enough
/// to stand out from the normal gear progression.
pub fn is_crossed(
    front_rank: usize,
    front_count: usize,
    rear_rank: usize,
    rear_count: usize,
) -> bool {
    let product = deviation(rear_rank, rear_count) * deviation(front_rank, front_count);
    product < 0.0 && product.abs() >= (rear_count as f64 - 1.0) * 0.25
}

pub fn gear_label(entry: &GainRatioEntry, front_count: usize) -> String {
    if front_count > 1 {
        format!("{}\u{2013}{}", entry.front_rank, entry.rear_rank)
    } else {
        entry.rear_rank.to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LabelState {
    side: LabelSide,
    forced: bool,
}

impl LabelState {
    const START: LabelState = LabelState {
        side: LabelSide::Below,
        forced: true,
    };

    fn next(self, front_rank: usize, front_count: usize) -> Self {
        let d = deviation(front_rank, front_count);
        if d > 0.0 {
            LabelState {
                side: LabelSide::Below,
                forced: true,
            }
        } else if d < 0.0 {
            LabelState {
                side: LabelSide::Above,
                forced: true,
            }
        } else if self.forced {
            LabelState {
                side: self.side.flipped(),
                forced: false,
            }
        } else {
            LabelState {
                forced: false,
                ..self
            }
        }
    }
}

/// Label sides for a ratio-sorted gear list.
///
/// Chainrings off-centre pin their labels to the outer side of their
/// sub-row; the centre chainring flips away from the preceding pinned run.
pub fn label_sides(entries: &[GainRatioEntry], front_count: usize) -> Vec<LabelSide> {
    entries
        .iter()
        .scan(LabelState::START, |state, entry| {
            *state = state.next(entry.front_rank, front_count);
            Some(state.side)
        })
        .collect()
}

pub fn grid_lines(max_ratio: f64, width: f64, height: f64) -> Vec<GridLine> {
    let mut lines = Vec::new();
    for tenths in 1..=GRID_LAST_TICK {
        let value = f64::from(tenths) / 10.0;
        let x = axis_x(value, max_ratio, width);
        if x > width * GRID_OVERSHOOT {
            break;
        }
        if x < 0.0 {
            continue;
        }
        let weight = GridWeight::for_tick(tenths);
        lines.push(GridLine {
            value,
            x,
            weight,
            stroke_width: height * weight.stroke_fraction(),
            color: weight.color(),
            label: (weight == GridWeight::Major).then(|| (tenths / 10).to_string()),
        });
    }
    lines
}

fn bike_row(
    bike: &Bike,
    index: usize,
    count: usize,
    max_ratio: f64,
    width: f64,
    height: f64,
) -> BikeRow {
    let y = height * (index + 1) as f64 / (count + 1) as f64;
    let front_count = bike.front().len();
    let rear_count = bike.rear().len();
    let entries = bike.gain_ratios();
    let sides = label_sides(&entries, front_count);

    let markers = entries
        .iter()
        .zip(sides)
        .map(|(entry, label_side)| Marker {
            ratio: entry.ratio,
            front_rank: entry.front_rank,
            rear_rank: entry.rear_rank,
            x: axis_x(entry.ratio, max_ratio, width),
            y: y + height * CHAINRING_SPREAD * deviation(entry.front_rank, front_count),
            flagged: is_crossed(entry.front_rank, front_count, entry.rear_rank, rear_count),
            label: gear_label(entry, front_count),
            label_side,
        })
        .collect();

    BikeRow {
        name: bike.name().to_string(),
        y,
        name_x: height * NAME_MARGIN,
        markers,
    }
}

/// Compute the full draw plan for `bikes` on a `(width, height)` canvas.
pub fn layout(bikes: &[Bike], canvas: (u32, u32)) -> Result<ChartLayout, GearError> {
    let (width, height) = (f64::from(canvas.0), f64::from(canvas.1));
    if canvas.0 == 0 || canvas.1 == 0 {
        return Err(GearError::InvalidParameter(format!(
            "canvas size must be non-zero, got {}x{}",
            canvas.0, canvas.1
        )));
    }
    let max_ratio = bikes
        .iter()
        .filter_map(Bike::max_gain_ratio)
        .max_by_key(|r| OrderedFloat(*r))
        .ok_or(GearError::EmptyInput)?;
    if max_ratio <= 1.0 {
        return Err(GearError::InvalidParameter(format!(
            "highest gain ratio {max_ratio:.3} must exceed 1 for a logarithmic axis"
        )));
    }

    let marker_radius = height * MARKER_RADIUS;
    let rows = bikes
        .iter()
        .enumerate()
        .map(|(index, bike)| bike_row(bike, index, bikes.len(), max_ratio, width, height))
        .collect();

    Ok(ChartLayout {
        width,
        height,
        max_ratio,
        marker_radius,
        outline_width: height * OUTLINE_WIDTH,
        label_gap: marker_radius * LABEL_GAP,
        large_font: height * LARGE_FONT,
        small_font: height * SMALL_FONT,
        grid_label_pad: height * GRID_LABEL_PAD,
        grid_label_top: height * GRID_LABEL_TOP,
        grid: grid_lines(max_ratio, width, height),
        rows,
    })
}
