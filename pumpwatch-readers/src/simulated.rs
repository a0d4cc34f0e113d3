//! Synthetic snapshot generator.
//!
//! Used when no controller is reachable so that downstream components
//! always receive a structurally valid snapshot. Values stay inside each
//! point's engineering range; `ready` gates `running`, and a running pump
//! shows elevated pressure and speed.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pumpwatch_types::{Catalog, Parameter, PumpSnapshot, SystemSnapshot};

use crate::{DeviceReader, ReadError};

/// A reader that fabricates plausible pump data from the catalog.
///
/// `read()` never fails; the reader is also usable standalone when the
/// process runs without controller hardware.
pub struct SimulatedReader {
    catalog: Arc<Catalog>,
    rng: StdRng,
    connected: bool,
}

impl SimulatedReader {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::from_rng(catalog, StdRng::from_entropy())
    }

    /// Seeded variant for deterministic sequences in tests.
    pub fn with_seed(catalog: Arc<Catalog>, seed: u64) -> Self {
        Self::from_rng(catalog, StdRng::seed_from_u64(seed))
    }

    fn from_rng(catalog: Arc<Catalog>, rng: StdRng) -> Self {
        Self {
            catalog,
            rng,
            connected: false,
        }
    }

    /// Produce one synthetic snapshot. Unlike [`DeviceReader::read`] this
    /// cannot fail, which matters for callers using the generator as a
    /// last-resort fallback.
    pub fn generate(&mut self) -> SystemSnapshot {
        let timestamp = Utc::now();
        let pumps: BTreeMap<u8, PumpSnapshot> = self
            .catalog
            .pump_ids()
            .map(|id| (id, self.generate_pump(id)))
            .collect();
        SystemSnapshot::new(timestamp, pumps)
    }

    fn generate_pump(&mut self, pump_id: u8) -> PumpSnapshot {
        let mut pump = PumpSnapshot::empty(pump_id);

        pump.ready = self.rng.gen_bool(0.7);
        // A pump can only run when it is ready.
        pump.running = pump.ready && self.rng.gen_bool(0.5);
        pump.trip = self.rng.gen_bool(0.05);

        let (pressure, speed) = if pump.running {
            (
                5.0 + self.rng.gen_range(-1.0..2.0),
                30.0 + self.rng.gen_range(-5.0..10.0),
            )
        } else {
            (self.rng.gen_range(0.0..2.0), self.rng.gen_range(0.0..5.0))
        };

        pump.pressure = self.clamp_to_range(pump_id, Parameter::Pressure, pressure);
        pump.speed = self.clamp_to_range(pump_id, Parameter::Speed, speed);
        pump.pressure_setpoint = self.clamp_to_range(
            pump_id,
            Parameter::PressureSetpoint,
            5.5 + f64::from(pump_id - 1) * 0.3,
        );

        pump
    }

    fn clamp_to_range(&self, pump_id: u8, parameter: Parameter, value: f64) -> f64 {
        match self.catalog.spec(pump_id, parameter) {
            Some(spec) => value.clamp(spec.min, spec.max),
            None => value,
        }
    }
}

#[async_trait]
impl DeviceReader for SimulatedReader {
    async fn connect(&mut self) -> Result<(), ReadError> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    async fn read(&mut self) -> Result<SystemSnapshot, ReadError> {
        Ok(self.generate())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn description(&self) -> &str {
        "simulated"
    }
}
