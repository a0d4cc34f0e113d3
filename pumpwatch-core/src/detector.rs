//! State-change detection between consecutive cycles.
//!
//! The detector is a pure function over (previous flags, current snapshot):
//! it owns no state and touches no I/O, which keeps the event rules
//! testable without a running sampler. The sampler keeps the per-pump
//! baseline and feeds it back in on the next cycle.

use chrono::{DateTime, Utc};
use pumpwatch_types::{PumpSnapshot, PumpStatus, TransitionEvent};

/// The boolean fields of one pump as seen in a completed cycle.
///
/// This is the baseline the sampler carries between cycles; only the three
/// booleans participate in event detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpFlags {
    pub ready: bool,
    pub running: bool,
    pub trip: bool,
}

impl From<&PumpSnapshot> for PumpFlags {
    fn from(pump: &PumpSnapshot) -> Self {
        Self {
            ready: pump.ready,
            running: pump.running,
            trip: pump.trip,
        }
    }
}

/// Compare a pump's current cycle against its previous flags and emit one
/// event per boolean field that changed.
///
/// With no previous flags (the pump's first observed cycle) nothing is
/// emitted: the first cycle establishes the baseline, even when the pump
/// is already running or tripped at startup. When several fields change
/// in the same cycle the events come out trip first, then running, then
/// ready.
pub fn detect_transitions(
    previous: Option<PumpFlags>,
    current: &PumpSnapshot,
    timestamp: DateTime<Utc>,
) -> Vec<TransitionEvent> {
    let Some(previous) = previous else {
        return Vec::new();
    };

    let mut events = Vec::new();

    if previous.trip != current.trip {
        events.push(TransitionEvent::trip(current, timestamp, current.trip));
    }

    if previous.running != current.running {
        let status = if current.running {
            PumpStatus::Running
        } else {
            PumpStatus::Stopped
        };
        events.push(TransitionEvent::status(current, timestamp, status));
    }

    if previous.ready != current.ready {
        let status = if current.ready {
            PumpStatus::Ready
        } else {
            PumpStatus::NotReady
        };
        events.push(TransitionEvent::status(current, timestamp, status));
    }

    events
}
