use std::f64::consts::TAU;

use ordered_float::OrderedFloat;
use serde::Serialize;
use tracing::debug;

use crate::ratio::{development, gain_ratio, gear_inches, gear_ratio};
use crate::units::Length;
use crate::GearError;

pub const DEFAULT_FULL_RADIUS_MM: f64 = 350.0;
pub const DEFAULT_CRANK_MM: f64 = 172.5;

/// Keys accepted in a bike block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Front,
    Rear,
    Crank,
    FullRadius,
    WheelRadius,
    WheelDiameter,
    TyreThickness,
    FullDiameter,
    FullCircumference,
}

impl Key {
    pub fn from_name(name: &str) -> Option<Key> {
        Some(match name {
            "front" => Key::Front,
            "rear" => Key::Rear,
            "crank" => Key::Crank,
            "full_radius" => Key::FullRadius,
            "wheel_radius" => Key::WheelRadius,
            "wheel_diameter" => Key::WheelDiameter,
            "tyre_thickness" => Key::TyreThickness,
            "full_diameter" => Key::FullDiameter,
            "full_circumference" => Key::FullCircumference,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Key::Front => "front",
            Key::Rear => "rear",
            Key::Crank => "crank",
            Key::FullRadius => "full_radius",
            Key::WheelRadius => "wheel_radius",
            Key::WheelDiameter => "wheel_diameter",
            Key::TyreThickness => "tyre_thickness",
            Key::FullDiameter => "full_diameter",
            Key::FullCircumference => "full_circumference",
        }
    }

    /// Sprocket lists rather than lengths.
    pub fn is_list(self) -> bool {
        matches!(self, Key::Front | Key::Rear)
    }
}

/// One front/rear combination of a bike, with 1-based ranks.
///
/// `front_rank` counts up from the smallest chainring; `rear_rank` counts up
/// from the largest cog, so rank 1/1 is normally the easiest gear.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GainRatioEntry {
    pub ratio: f64,
    pub front_rank: usize,
    pub rear_rank: usize,
    pub front_teeth: f64,
    pub rear_teeth: f64,
}

/// All measures for one gear, as written to the gear table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GearRow {
    pub front_teeth: f64,
    pub rear_teeth: f64,
    pub front_rank: usize,
    pub rear_rank: usize,
    pub gear_ratio: f64,
    pub development_m: f64,
    pub gear_inches: f64,
    pub gain_ratio: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bike {
    name: String,
    front: Vec<f64>,
    rear: Vec<f64>,
    full_radius: Length,
    crank: Length,
}

impl Bike {
    pub fn new(
        name: impl Into<String>,
        front: Vec<f64>,
        rear: Vec<f64>,
        full_radius: Length,
        crank: Length,
    ) -> Result<Self, GearError> {
        let name = name.into();
        for (field, teeth) in [(Key::Front, &front), (Key::Rear, &rear)] {
            if teeth.is_empty() {
                return Err(GearError::MissingField {
                    bike: name,
                    field: field.as_str(),
                });
            }
            if let Some(bad) = teeth.iter().find(|t| !is_positive(**t)) {
                return Err(GearError::InvalidField {
                    bike: name,
                    field: field.as_str(),
                    value: bad.to_string(),
                });
            }
        }
        for (field, length) in [(Key::FullRadius, full_radius), (Key::Crank, crank)] {
            if !is_positive(length.metres()) {
                return Err(GearError::InvalidField {
                    bike: name,
                    field: field.as_str(),
                    value: length.to_string(),
                });
            }
        }
        Ok(Self {
            name,
            front,
            rear,
            full_radius,
            crank,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn front(&self) -> &[f64] {
        &self.front
    }

    pub fn rear(&self) -> &[f64] {
        &self.rear
    }

    pub fn full_radius(&self) -> Length {
        self.full_radius
    }

    pub fn crank(&self) -> Length {
        self.crank
    }

    /// 1-based position of `teeth` among the chainrings sorted ascending.
    pub fn front_rank(&self, teeth: f64) -> usize {
        let mut sorted = self.front.clone();
        sorted.sort_by_key(|v| OrderedFloat(*v));
        rank_of(&sorted, teeth)
    }

    /// 1-based position of `teeth` among the cogs sorted descending.
    pub fn rear_rank(&self, teeth: f64) -> usize {
        let mut sorted = self.rear.clone();
        sorted.sort_by_key(|v| std::cmp::Reverse(OrderedFloat(*v)));
        rank_of(&sorted, teeth)
    }

    /// Every front x rear combination, ascending by gain ratio.
    pub fn gain_ratios(&self) -> Vec<GainRatioEntry> {
        let mut entries: Vec<GainRatioEntry> = self
            .front
            .iter()
            .flat_map(|&front| {
                self.rear.iter().map(move |&rear| GainRatioEntry {
                    ratio: gain_ratio(front, rear, self.full_radius, self.crank),
                    front_rank: self.front_rank(front),
                    rear_rank: self.rear_rank(rear),
                    front_teeth: front,
                    rear_teeth: rear,
                })
            })
            .collect();
        entries.sort_by_key(|e| (OrderedFloat(e.ratio), e.front_rank, e.rear_rank));
        entries
    }

    pub fn max_gain_ratio(&self) -> Option<f64> {
        self.gain_ratios().last().map(|e| e.ratio)
    }

    pub fn gear_table(&self) -> Vec<GearRow> {
        self.gain_ratios()
            .into_iter()
            .map(|e| GearRow {
                front_teeth: e.front_teeth,
                rear_teeth: e.rear_teeth,
                front_rank: e.front_rank,
                rear_rank: e.rear_rank,
                gear_ratio: gear_ratio(e.front_teeth, e.rear_teeth),
                development_m: development(e.front_teeth, e.rear_teeth, self.full_radius)
                    .metres(),
                gear_inches: gear_inches(e.front_teeth, e.rear_teeth, self.full_radius),
                gain_ratio: e.ratio,
            })
            .collect()
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn rank_of(sorted: &[f64], teeth: f64) -> usize {
    sorted.iter().position(|v| *v == teeth).unwrap_or(0) + 1
}

/// Accumulates one bike block while parsing, then finalises into a [`Bike`].
///
/// Later assignments to the same key replace earlier ones.
#[derive(Clone, Debug, Default)]
pub struct BikeBuilder {
    name: String,
    front: Option<Vec<f64>>,
    rear: Option<Vec<f64>>,
    crank: Option<Length>,
    full_radius: Option<Length>,
    wheel_radius: Option<Length>,
    wheel_diameter: Option<Length>,
    tyre_thickness: Option<Length>,
    full_diameter: Option<Length>,
    full_circumference: Option<Length>,
}

impl BikeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn front(&mut self, teeth: Vec<f64>) -> &mut Self {
        self.front = Some(teeth);
        self
    }

    pub fn rear(&mut self, teeth: Vec<f64>) -> &mut Self {
        self.rear = Some(teeth);
        self
    }

    /// Set a sprocket list by key; only `front` and `rear` take one.
    pub fn teeth(&mut self, key: Key, teeth: Vec<f64>) -> Result<&mut Self, GearError> {
        match key {
            Key::Front => Ok(self.front(teeth)),
            Key::Rear => Ok(self.rear(teeth)),
            other => Err(GearError::InvalidParameter(format!(
                "{} is not a sprocket list",
                other.as_str()
            ))),
        }
    }

    /// Set a length by key; `front` and `rear` are rejected.
    pub fn length(&mut self, key: Key, length: Length) -> Result<&mut Self, GearError> {
        *self.length_slot(key)? = Some(length);
        Ok(self)
    }

    fn length_slot(&mut self, key: Key) -> Result<&mut Option<Length>, GearError> {
        Ok(match key {
            Key::Crank => &mut self.crank,
            Key::FullRadius => &mut self.full_radius,
            Key::WheelRadius => &mut self.wheel_radius,
            Key::WheelDiameter => &mut self.wheel_diameter,
            Key::TyreThickness => &mut self.tyre_thickness,
            Key::FullDiameter => &mut self.full_diameter,
            Key::FullCircumference => &mut self.full_circumference,
            Key::Front | Key::Rear => {
                return Err(GearError::InvalidParameter(format!(
                    "{} is not a length",
                    key.as_str()
                )));
            }
        })
    }

    /// Every supplied length must be positive, checked before any of them are combined.
    fn check_lengths(&self) -> Result<(), GearError> {
        let supplied = [
            (Key::Crank, self.crank),
            (Key::FullRadius, self.full_radius),
            (Key::WheelRadius, self.wheel_radius),
            (Key::WheelDiameter, self.wheel_diameter),
            (Key::TyreThickness, self.tyre_thickness),
            (Key::FullDiameter, self.full_diameter),
            (Key::FullCircumference, self.full_circumference),
        ];
        let bad = supplied.into_iter().find_map(|(key, length)| {
            length
                .filter(|l| !is_positive(l.metres()))
                .map(|l| (key, l))
        });
        match bad {
            Some((key, length)) => Err(GearError::InvalidField {
                bike: self.name.clone(),
                field: key.as_str(),
                value: length.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Collapse the wheel-size keys into `full_radius`.
    ///
    /// An explicit `full_radius` is kept as is. Otherwise the first present of
    /// `full_circumference`, `full_diameter`, then `wheel_radius`/`wheel_diameter`
    /// plus `tyre_thickness` decides; with none of them the default applies.
    /// All other radius keys are consumed either way. A zero or negative
    /// length on any key is rejected first.
    pub fn resolve_full_radius(&mut self) -> Result<Length, GearError> {
        self.check_lengths()?;
        let wheel_radius = self.wheel_radius.take();
        let wheel_diameter = self.wheel_diameter.take();
        let tyre_thickness = self.tyre_thickness.take();
        let full_diameter = self.full_diameter.take();
        let full_circumference = self.full_circumference.take();

        let resolved = if let Some(radius) = self.full_radius {
            radius
        } else if let Some(circumference) = full_circumference {
            circumference / TAU
        } else if let Some(diameter) = full_diameter {
            diameter / 2.0
        } else {
            let wheel = wheel_radius.or(wheel_diameter.map(|d| d / 2.0));
            match (wheel, tyre_thickness) {
                (Some(wheel), tyre) => wheel + tyre.unwrap_or_default(),
                (None, Some(_)) => {
                    return Err(GearError::MissingField {
                        bike: self.name.clone(),
                        field: Key::WheelRadius.as_str(),
                    });
                }
                (None, None) => {
                    debug!(bike = %self.name, "no wheel size given, using default radius");
                    Length::from_mm(DEFAULT_FULL_RADIUS_MM)
                }
            }
        };
        self.full_radius = Some(resolved);
        Ok(resolved)
    }

    pub fn build(mut self) -> Result<Bike, GearError> {
        let full_radius = self.resolve_full_radius()?;
        let front = self.front.ok_or_else(|| GearError::MissingField {
            bike: self.name.clone(),
            field: Key::Front.as_str(),
        })?;
        let rear = self.rear.ok_or_else(|| GearError::MissingField {
            bike: self.name.clone(),
            field: Key::Rear.as_str(),
        })?;
        let crank = self
            .crank
            .unwrap_or_else(|| Length::from_mm(DEFAULT_CRANK_MM));
        Bike::new(self.name, front, rear, full_radius, crank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;

    fn road(front: Vec<f64>, rear: Vec<f64>) -> Bike {
        let mut builder = BikeBuilder::new("road");
        builder.front(front).rear(rear);
        builder.build().unwrap()
    }

    fn with_lengths(lengths: &[(Key, f64)]) -> BikeBuilder {
        let mut builder = BikeBuilder::new("b");
        for &(key, mm) in lengths {
            builder.length(key, Length::from_mm(mm)).unwrap();
        }
        builder
    }

    fn close(a: Length, mm: f64) -> bool {
        (a.to_unit(Unit::Mm) - mm).abs() < 1e-9
    }

    #[test]
    fn defaults_apply_when_not_given() {
        let bike = road(vec![50.0, 34.0], vec![11.0, 13.0]);
        assert!(close(bike.full_radius(), 350.0));
        assert!(close(bike.crank(), 172.5));
    }

    #[test]
    fn explicit_full_radius_survives_resolution() {
        let mut builder = with_lengths(&[
            (Key::FullRadius, 340.0),
            (Key::WheelDiameter, 622.0),
            (Key::TyreThickness, 28.0),
        ]);
        let radius = builder.resolve_full_radius().unwrap();
        assert!(close(radius, 340.0));
        // Second pass sees only full_radius and must not change it.
        assert!(close(builder.resolve_full_radius().unwrap(), 340.0));
    }

    #[test]
    fn circumference_beats_diameter() {
        let mut builder = with_lengths(&[
            (Key::WheelDiameter, 622.0),
            (Key::FullDiameter, 680.0),
            (Key::FullCircumference, 2100.0),
        ]);
        let radius = builder.resolve_full_radius().unwrap();
        assert!(close(radius, 2100.0 / TAU));
    }

    #[test]
    fn full_diameter_beats_wheel_size() {
        let mut builder = with_lengths(&[(Key::WheelRadius, 311.0), (Key::FullDiameter, 680.0)]);
        assert!(close(builder.resolve_full_radius().unwrap(), 340.0));
    }

    #[test]
    fn tyre_adds_to_wheel_radius() {
        let mut builder = with_lengths(&[(Key::WheelDiameter, 622.0), (Key::TyreThickness, 25.0)]);
        assert!(close(builder.resolve_full_radius().unwrap(), 336.0));

        let mut builder = with_lengths(&[(Key::WheelRadius, 300.0), (Key::WheelDiameter, 622.0)]);
        assert!(close(builder.resolve_full_radius().unwrap(), 300.0));
    }

    #[test]
    fn tyre_without_wheel_is_missing_field() {
        let mut builder = with_lengths(&[(Key::TyreThickness, 25.0)]);
        match builder.resolve_full_radius() {
            Err(GearError::MissingField { field, .. }) => assert_eq!(field, "wheel_radius"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_rear_is_reported() {
        let mut builder = BikeBuilder::new("fixie");
        builder.front(vec![48.0]);
        match builder.build() {
            Err(GearError::MissingField { bike, field }) => {
                assert_eq!(bike, "fixie");
                assert_eq!(field, "rear");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn non_positive_values_are_rejected() {
        let err = Bike::new(
            "b",
            vec![50.0, 0.0],
            vec![11.0],
            Length::from_mm(350.0),
            Length::from_mm(170.0),
        )
        .unwrap_err();
        assert!(matches!(err, GearError::InvalidField { field: "front", .. }));

        let err = Bike::new(
            "b",
            vec![50.0],
            vec![11.0],
            Length::from_mm(350.0),
            Length::from_mm(-1.0),
        )
        .unwrap_err();
        assert!(matches!(err, GearError::InvalidField { field: "crank", .. }));
    }

    #[test]
    fn negative_wheel_is_rejected_before_tyre_is_added() {
        let mut builder = with_lengths(&[(Key::WheelRadius, -10.0), (Key::TyreThickness, 400.0)]);
        match builder.resolve_full_radius() {
            Err(GearError::InvalidField { field, .. }) => assert_eq!(field, "wheel_radius"),
            other => panic!("unexpected {:?}", other),
        }

        let mut builder = with_lengths(&[(Key::FullCircumference, 0.0)]);
        assert!(matches!(
            builder.resolve_full_radius(),
            Err(GearError::InvalidField { field: "full_circumference", .. })
        ));
    }

    #[test]
    fn keys_of_the_wrong_kind_are_errors() {
        let mut builder = BikeBuilder::new("b");
        assert!(matches!(
            builder.teeth(Key::Crank, vec![170.0]),
            Err(GearError::InvalidParameter(_))
        ));
        assert!(matches!(
            builder.length(Key::Rear, Length::from_mm(11.0)),
            Err(GearError::InvalidParameter(_))
        ));
        builder.teeth(Key::Front, vec![50.0]).unwrap();
        builder.teeth(Key::Rear, vec![11.0]).unwrap();
        assert!(builder.build().is_ok());
    }

    #[test]
    fn single_chainring_ratios_and_ranks() {
        let bike = road(vec![50.0], vec![11.0, 14.0, 19.0]);
        let ratios = bike.gain_ratios();
        assert_eq!(ratios.len(), 3);
        assert!(ratios.windows(2).all(|w| w[0].ratio <= w[1].ratio));
        let ranks: Vec<(f64, usize)> = ratios.iter().map(|e| (e.rear_teeth, e.rear_rank)).collect();
        assert_eq!(ranks, vec![(19.0, 1), (14.0, 2), (11.0, 3)]);
        assert!(ratios.iter().all(|e| e.front_rank == 1));
    }

    #[test]
    fn double_chainring_extremes() {
        let bike = road(vec![50.0, 34.0], vec![11.0, 28.0]);
        let ratios = bike.gain_ratios();
        let first = ratios.first().unwrap();
        let last = ratios.last().unwrap();
        assert_eq!((first.front_teeth, first.rear_teeth), (34.0, 28.0));
        assert_eq!((first.front_rank, first.rear_rank), (1, 1));
        assert_eq!((last.front_teeth, last.rear_teeth), (50.0, 11.0));
        assert_eq!((last.front_rank, last.rear_rank), (2, 2));
        assert_eq!(bike.max_gain_ratio(), Some(last.ratio));
    }

    #[test]
    fn duplicate_sprockets_share_first_rank() {
        let bike = road(vec![40.0], vec![15.0, 15.0, 21.0]);
        assert_eq!(bike.rear_rank(21.0), 1);
        assert_eq!(bike.rear_rank(15.0), 2);
    }

    #[test]
    fn gear_table_carries_all_measures() {
        let bike = road(vec![50.0], vec![25.0]);
        let rows = bike.gear_table();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert!((row.gear_ratio - 2.0).abs() < 1e-12);
        assert!((row.development_m - 0.7 * TAU).abs() < 1e-12);
        assert!((row.gear_inches - 1400.0 / 25.4).abs() < 1e-9);
        assert!((row.gain_ratio - 2.0 * 350.0 / 172.5).abs() < 1e-12);
    }
}
