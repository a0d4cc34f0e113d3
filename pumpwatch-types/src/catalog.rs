//! Static description of every monitored point.
//!
//! The catalog is loaded once at process start and consumed read-only by
//! every other component. It describes which pumps exist, where each of
//! their parameters lives in the controller data block, and the engineering
//! range and display metadata for each value.

use serde::Serialize;
use thiserror::Error;

/// Number of pumps in the reference deployment.
pub const PUMP_COUNT: u8 = 7;

/// Byte stride between consecutive pumps in the controller data block.
const PUMP_STRIDE: u16 = 16;

/// Wire representation of a point value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PointKind {
    /// One byte, non-zero means true.
    Bool,
    /// Four bytes, IEEE-754 big-endian single precision.
    Real,
}

/// The six monitored parameters of a pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Parameter {
    Ready,
    Running,
    Trip,
    Pressure,
    Speed,
    PressureSetpoint,
}

impl Parameter {
    /// All parameters, in catalog order.
    pub const ALL: [Parameter; 6] = [
        Parameter::Ready,
        Parameter::Running,
        Parameter::Trip,
        Parameter::Pressure,
        Parameter::Speed,
        Parameter::PressureSetpoint,
    ];

    /// Snake-case name as used in persisted rows and settings.
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::Ready => "ready",
            Parameter::Running => "running",
            Parameter::Trip => "trip",
            Parameter::Pressure => "pressure",
            Parameter::Speed => "speed",
            Parameter::PressureSetpoint => "pressure_setpoint",
        }
    }

    /// Wire representation of this parameter.
    pub fn kind(&self) -> PointKind {
        match self {
            Parameter::Ready | Parameter::Running | Parameter::Trip => PointKind::Bool,
            _ => PointKind::Real,
        }
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One monitored value at a fixed address in the controller data block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointSpec {
    /// Owning pump, 1-based.
    pub pump_id: u8,
    pub parameter: Parameter,
    /// Byte offset within the data block.
    pub offset: u16,
    pub kind: PointKind,
    /// Engineering range, meaningful for Real points only.
    pub min: f64,
    pub max: f64,
    /// Display unit ("bar", "Hz"); empty for booleans.
    pub unit: String,
    /// Display label, e.g. "PUMP 3 SPEED".
    pub label: String,
}

impl PointSpec {
    /// Number of bytes read for this point.
    pub fn width(&self) -> u16 {
        match self.kind {
            PointKind::Bool => 1,
            PointKind::Real => 4,
        }
    }
}

/// Catalog construction failures. Fatal at startup, never seen at runtime.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate address {offset} (pump {pump_id} {parameter})")]
    DuplicateAddress {
        pump_id: u8,
        parameter: Parameter,
        offset: u16,
    },

    #[error("invalid engineering range {min}..{max} (pump {pump_id} {parameter})")]
    InvalidRange {
        pump_id: u8,
        parameter: Parameter,
        min: f64,
        max: f64,
    },

    #[error("pump {pump_id} is missing parameter {parameter}")]
    MissingParameter { pump_id: u8, parameter: Parameter },

    #[error("pump ids are 1-based, got 0 ({parameter})")]
    InvalidPumpId { parameter: Parameter },

    #[error("catalog has no pumps")]
    Empty,
}

/// The validated set of all monitored points.
///
/// Construction checks address uniqueness, range sanity and parameter
/// completeness once; after that every accessor is infallible or returns
/// `Option`.
#[derive(Debug, Clone)]
pub struct Catalog {
    points: Vec<PointSpec>,
    pump_count: u8,
}

impl Catalog {
    /// Build a catalog from an explicit point list, validating it.
    pub fn new(points: Vec<PointSpec>) -> Result<Self, CatalogError> {
        let pump_count = points.iter().map(|p| p.pump_id).max().ok_or(CatalogError::Empty)?;

        let mut seen_offsets = std::collections::BTreeMap::new();
        for point in &points {
            if point.pump_id == 0 {
                return Err(CatalogError::InvalidPumpId {
                    parameter: point.parameter,
                });
            }
            if let Some(_previous) = seen_offsets.insert(point.offset, point) {
                return Err(CatalogError::DuplicateAddress {
                    pump_id: point.pump_id,
                    parameter: point.parameter,
                    offset: point.offset,
                });
            }
            if point.kind == PointKind::Real && point.min >= point.max {
                return Err(CatalogError::InvalidRange {
                    pump_id: point.pump_id,
                    parameter: point.parameter,
                    min: point.min,
                    max: point.max,
                });
            }
        }

        for pump_id in 1..=pump_count {
            for parameter in Parameter::ALL {
                let present = points
                    .iter()
                    .any(|p| p.pump_id == pump_id && p.parameter == parameter);
                if !present {
                    return Err(CatalogError::MissingParameter { pump_id, parameter });
                }
            }
        }

        Ok(Self { points, pump_count })
    }

    /// The reference deployment: seven pumps on a 16-byte stride.
    ///
    /// Status bits sit at the start of each stride (pump 1's bits start at
    /// byte 1 in the installed data block), reals at stride +4, +8, +12.
    pub fn reference() -> Self {
        let mut points = Vec::with_capacity(PUMP_COUNT as usize * Parameter::ALL.len());

        for pump_id in 1..=PUMP_COUNT {
            let base = u16::from(pump_id - 1) * PUMP_STRIDE;
            // Pump 1 is the historical oddity: its bits occupy bytes 1..=3.
            let bit_base = if pump_id == 1 { base + 1 } else { base };

            points.push(bool_point(pump_id, Parameter::Ready, bit_base, "READY"));
            points.push(bool_point(pump_id, Parameter::Running, bit_base + 1, "RUNNING"));
            points.push(bool_point(pump_id, Parameter::Trip, bit_base + 2, "TRIP"));
            points.push(real_point(
                pump_id,
                Parameter::Pressure,
                base + 4,
                0.0,
                10.0,
                "bar",
                "PRESSURE",
            ));
            points.push(real_point(
                pump_id,
                Parameter::Speed,
                base + 8,
                0.0,
                50.0,
                "Hz",
                "SPEED",
            ));
            points.push(real_point(
                pump_id,
                Parameter::PressureSetpoint,
                base + 12,
                0.0,
                10.0,
                "bar",
                "PRESSURE SETPOINT",
            ));
        }

        Self::new(points).expect("reference catalog is valid")
    }

    /// Number of pumps described by this catalog.
    pub fn pump_count(&self) -> u8 {
        self.pump_count
    }

    /// Iterate over pump ids, ascending.
    pub fn pump_ids(&self) -> impl Iterator<Item = u8> {
        1..=self.pump_count
    }

    /// All points, in catalog order.
    pub fn points(&self) -> &[PointSpec] {
        &self.points
    }

    /// Points belonging to one pump.
    pub fn points_for(&self, pump_id: u8) -> impl Iterator<Item = &PointSpec> {
        self.points.iter().filter(move |p| p.pump_id == pump_id)
    }

    /// Look up a single point.
    pub fn spec(&self, pump_id: u8, parameter: Parameter) -> Option<&PointSpec> {
        self.points
            .iter()
            .find(|p| p.pump_id == pump_id && p.parameter == parameter)
    }
}

fn bool_point(pump_id: u8, parameter: Parameter, offset: u16, label: &str) -> PointSpec {
    PointSpec {
        pump_id,
        parameter,
        offset,
        kind: PointKind::Bool,
        min: 0.0,
        max: 1.0,
        unit: String::new(),
        label: format!("PUMP {} {}", pump_id, label),
    }
}

#[allow(clippy::too_many_arguments)]
fn real_point(
    pump_id: u8,
    parameter: Parameter,
    offset: u16,
    min: f64,
    max: f64,
    unit: &str,
    label: &str,
) -> PointSpec {
    PointSpec {
        pump_id,
        parameter,
        offset,
        kind: PointKind::Real,
        min,
        max,
        unit: unit.to_string(),
        label: format!("PUMP {} {}", pump_id, label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_catalog_has_seven_pumps_with_six_points_each() {
        let catalog = Catalog::reference();
        assert_eq!(catalog.pump_count(), 7);
        assert_eq!(catalog.points().len(), 42);
        for pump_id in catalog.pump_ids() {
            assert_eq!(catalog.points_for(pump_id).count(), 6);
        }
    }

    #[test]
    fn reference_offsets_follow_the_stride() {
        let catalog = Catalog::reference();

        // Pump 1's bits start at byte 1, not 0.
        assert_eq!(catalog.spec(1, Parameter::Ready).unwrap().offset, 1);
        assert_eq!(catalog.spec(1, Parameter::Trip).unwrap().offset, 3);
        assert_eq!(catalog.spec(1, Parameter::Pressure).unwrap().offset, 4);

        // Later pumps are regular.
        assert_eq!(catalog.spec(2, Parameter::Ready).unwrap().offset, 16);
        assert_eq!(catalog.spec(3, Parameter::Speed).unwrap().offset, 40);
        assert_eq!(catalog.spec(7, Parameter::PressureSetpoint).unwrap().offset, 108);
    }

    #[test]
    fn reference_addresses_are_unique() {
        let catalog = Catalog::reference();
        let mut offsets: Vec<u16> = catalog.points().iter().map(|p| p.offset).collect();
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), catalog.points().len());
    }

    #[test]
    fn duplicate_address_is_rejected() {
        let mut points: Vec<PointSpec> = Catalog::reference().points().to_vec();
        let clash = points[0].offset;
        points[1].offset = clash;

        let err = Catalog::new(points).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateAddress { .. }));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let mut points: Vec<PointSpec> = Catalog::reference().points().to_vec();
        let pressure = points
            .iter_mut()
            .find(|p| p.parameter == Parameter::Pressure)
            .unwrap();
        pressure.min = 10.0;
        pressure.max = 0.0;

        let err = Catalog::new(points).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRange { .. }));
    }

    #[test]
    fn missing_parameter_is_rejected() {
        let points: Vec<PointSpec> = Catalog::reference()
            .points()
            .iter()
            .filter(|p| !(p.pump_id == 4 && p.parameter == Parameter::Speed))
            .cloned()
            .collect();

        let err = Catalog::new(points).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::MissingParameter {
                pump_id: 4,
                parameter: Parameter::Speed
            }
        ));
    }

    #[test]
    fn point_widths_match_wire_kinds() {
        let catalog = Catalog::reference();
        assert_eq!(catalog.spec(1, Parameter::Trip).unwrap().width(), 1);
        assert_eq!(catalog.spec(1, Parameter::Speed).unwrap().width(), 4);
    }

    #[test]
    fn empty_catalog_is_rejected() {
        assert!(matches!(Catalog::new(Vec::new()), Err(CatalogError::Empty)));
    }

    #[test]
    fn zero_pump_id_is_rejected() {
        let mut points: Vec<PointSpec> = Catalog::reference().points().to_vec();
        points[0].pump_id = 0;

        let err = Catalog::new(points).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidPumpId { .. }));
    }
}
