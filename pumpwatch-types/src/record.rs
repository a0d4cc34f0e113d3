//! Persisted rows and the transition events derived between cycles.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::PumpSnapshot;

/// One persisted sample: a pump's values at one completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SampleRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub pump_id: u8,
    pub pressure: f64,
    pub speed: f64,
    pub pressure_setpoint: f64,
    pub ready: bool,
    pub running: bool,
    pub trip: bool,
}

/// A persisted trip transition.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TripEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub pump_id: u8,
    /// True when the pump tripped, false when the trip cleared.
    pub trip_on: bool,
    /// Pressure at the cycle that detected the transition, in bar.
    pub pressure: f64,
    /// Speed at the cycle that detected the transition, in Hz.
    pub speed: f64,
}

/// A persisted running/ready transition.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StatusEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub pump_id: u8,
    pub status: String,
    pub description: String,
    pub pressure: f64,
    pub speed: f64,
}

/// Status labels for running/ready transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PumpStatus {
    Running,
    Stopped,
    Ready,
    NotReady,
}

impl PumpStatus {
    /// Short label stored in the status column.
    pub fn label(&self) -> &'static str {
        match self {
            PumpStatus::Running => "Running",
            PumpStatus::Stopped => "Stopped",
            PumpStatus::Ready => "Ready",
            PumpStatus::NotReady => "Not Ready",
        }
    }

    /// Free-text description stored alongside the label.
    pub fn description(&self) -> &'static str {
        match self {
            PumpStatus::Running => "Pump started",
            PumpStatus::Stopped => "Pump stopped",
            PumpStatus::Ready => "Pump ready for operation",
            PumpStatus::NotReady => "Pump not ready",
        }
    }
}

/// The kind of a detected transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Transition {
    Trip { on: bool },
    Status { status: PumpStatus },
}

/// A boolean field change detected between two consecutive cycles.
///
/// Produced by the detector and persisted in the same transaction as the
/// cycle's samples; carries the pressure/speed observed in that cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransitionEvent {
    pub pump_id: u8,
    pub timestamp: DateTime<Utc>,
    pub transition: Transition,
    pub pressure: f64,
    pub speed: f64,
}

impl TransitionEvent {
    pub fn trip(snapshot: &PumpSnapshot, timestamp: DateTime<Utc>, on: bool) -> Self {
        Self {
            pump_id: snapshot.pump_id,
            timestamp,
            transition: Transition::Trip { on },
            pressure: snapshot.pressure,
            speed: snapshot.speed,
        }
    }

    pub fn status(snapshot: &PumpSnapshot, timestamp: DateTime<Utc>, status: PumpStatus) -> Self {
        Self {
            pump_id: snapshot.pump_id,
            timestamp,
            transition: Transition::Status { status },
            pressure: snapshot.pressure,
            speed: snapshot.speed,
        }
    }
}

/// Window aggregates over sample records.
///
/// An empty window yields the all-zero default rather than an error, so
/// display layers never have to special-case missing data.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Stats {
    pub avg_pressure: f64,
    pub max_pressure: f64,
    pub min_pressure: f64,
    pub avg_speed: f64,
    pub max_speed: f64,
    pub record_count: i64,
    pub trip_count: i64,
}
