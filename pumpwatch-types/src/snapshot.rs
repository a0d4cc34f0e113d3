//! Snapshots - complete per-cycle views of the monitored pumps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Parameter, PointKind};

/// A decoded point value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PointValue {
    Bool(bool),
    Real(f64),
}

impl PointValue {
    /// Fallback value recorded when a single point read fails.
    pub fn fallback(kind: PointKind) -> Self {
        match kind {
            PointKind::Bool => PointValue::Bool(false),
            PointKind::Real => PointValue::Real(0.0),
        }
    }
}

/// Current values of one pump, captured in a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PumpSnapshot {
    pub pump_id: u8,
    pub ready: bool,
    pub running: bool,
    pub trip: bool,
    pub pressure: f64,
    pub speed: f64,
    pub pressure_setpoint: f64,
}

impl PumpSnapshot {
    /// A snapshot with every point at its fallback value.
    pub fn empty(pump_id: u8) -> Self {
        Self {
            pump_id,
            ready: false,
            running: false,
            trip: false,
            pressure: 0.0,
            speed: 0.0,
            pressure_setpoint: 0.0,
        }
    }

    /// Store a decoded value. A kind mismatch leaves the field untouched.
    pub fn set(&mut self, parameter: Parameter, value: PointValue) {
        match (parameter, value) {
            (Parameter::Ready, PointValue::Bool(v)) => self.ready = v,
            (Parameter::Running, PointValue::Bool(v)) => self.running = v,
            (Parameter::Trip, PointValue::Bool(v)) => self.trip = v,
            (Parameter::Pressure, PointValue::Real(v)) => self.pressure = v,
            (Parameter::Speed, PointValue::Real(v)) => self.speed = v,
            (Parameter::PressureSetpoint, PointValue::Real(v)) => self.pressure_setpoint = v,
            _ => debug_assert!(false, "kind mismatch for {parameter}"),
        }
    }

    /// Read a value back by parameter.
    pub fn value(&self, parameter: Parameter) -> PointValue {
        match parameter {
            Parameter::Ready => PointValue::Bool(self.ready),
            Parameter::Running => PointValue::Bool(self.running),
            Parameter::Trip => PointValue::Bool(self.trip),
            Parameter::Pressure => PointValue::Real(self.pressure),
            Parameter::Speed => PointValue::Real(self.speed),
            Parameter::PressureSetpoint => PointValue::Real(self.pressure_setpoint),
        }
    }
}

/// The complete set of current values across all pumps at one cycle.
///
/// Built whole at the end of a cycle and published by swap; the alarm flag
/// is derived at construction (true iff any pump trips) and cannot drift
/// from the per-pump values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSnapshot {
    /// Capture time of the cycle.
    pub timestamp: DateTime<Utc>,
    /// True iff any pump's trip field is set.
    pub alarm: bool,
    pumps: BTreeMap<u8, PumpSnapshot>,
}

impl SystemSnapshot {
    /// Build a snapshot, deriving the alarm flag.
    pub fn new(timestamp: DateTime<Utc>, pumps: BTreeMap<u8, PumpSnapshot>) -> Self {
        let alarm = pumps.values().any(|p| p.trip);
        Self {
            timestamp,
            alarm,
            pumps,
        }
    }

    /// Values for one pump.
    pub fn pump(&self, pump_id: u8) -> Option<&PumpSnapshot> {
        self.pumps.get(&pump_id)
    }

    /// Iterate over all pumps, ascending by id.
    pub fn iter(&self) -> impl Iterator<Item = (&u8, &PumpSnapshot)> {
        self.pumps.iter()
    }

    /// Number of pumps captured.
    pub fn len(&self) -> usize {
        self.pumps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pumps.is_empty()
    }

    /// Derive the broadcast summary: alarm flag plus per-pump setpoints.
    pub fn summary(&self) -> SystemSummary {
        SystemSummary {
            timestamp: self.timestamp,
            alarm: self.alarm,
            setpoints: self
                .pumps
                .iter()
                .map(|(id, pump)| (*id, pump.pressure_setpoint))
                .collect(),
        }
    }
}

/// What observers receive after every completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSummary {
    pub timestamp: DateTime<Utc>,
    pub alarm: bool,
    /// Pressure setpoint per pump, in bar.
    pub setpoints: BTreeMap<u8, f64>,
}

/// Indicator class for a boolean point, as consumed by display layers.
///
/// Each status bit lights its own colour when set; everything else,
/// including non-boolean parameters, renders as off.
pub fn status_class(parameter: Parameter, value: bool) -> &'static str {
    match (parameter, value) {
        (Parameter::Ready, true) => "status-yellow",
        (Parameter::Running, true) => "status-green",
        (Parameter::Trip, true) => "status-red",
        _ => "status-off",
    }
}

/// Format a boolean point for display.
pub fn format_bool(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

/// Format a real point for display, two decimals plus unit.
pub fn format_real(value: f64, unit: &str) -> String {
    if unit.is_empty() {
        format!("{value:.2}")
    } else {
        format!("{value:.2} {unit}")
    }
}
