//! The monitoring facade.
//!
//! [`PumpMonitor`] wires catalog, reader, store, publisher and sampler
//! together and is the one type embedders touch. Its query methods absorb
//! store failures: a display layer asking for history during a database
//! hiccup gets an empty result and a warning in the log, never an error
//! it has to render.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use pumpwatch_readers::{DeviceReader, SimulatedReader};
use pumpwatch_types::{Catalog, SampleRecord, Stats, StatusEvent, SystemSnapshot, TripEvent};

use crate::publisher::{SnapshotPublisher, SummaryStream};
use crate::sampler::Sampler;
use crate::settings::Settings;
use crate::store::{StoreError, TimeSeriesStore};

/// Per-subscriber summary backlog before a slow reader starts skipping.
const SUMMARY_BACKLOG: usize = 64;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Device link state as seen from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    /// Description of the endpoint the sampler reads from.
    pub endpoint: String,
}

/// Builder for [`PumpMonitor`]; without an explicit reader the monitor
/// runs on synthetic data.
pub struct MonitorBuilder {
    settings: Settings,
    catalog: Option<Catalog>,
    reader: Option<Box<dyn DeviceReader>>,
}

impl MonitorBuilder {
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn reader(mut self, reader: Box<dyn DeviceReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub async fn build(self) -> Result<PumpMonitor, MonitorError> {
        let catalog = Arc::new(self.catalog.unwrap_or_else(Catalog::reference));
        let reader = self
            .reader
            .unwrap_or_else(|| Box::new(SimulatedReader::new(catalog.clone())));

        let store = TimeSeriesStore::open(&self.settings.database_url, &catalog).await?;
        let publisher = Arc::new(SnapshotPublisher::new(SUMMARY_BACKLOG));
        let sampler = Sampler::new(
            catalog.clone(),
            reader,
            store.clone(),
            publisher.clone(),
            self.settings.sampler_config(),
        );

        Ok(PumpMonitor {
            catalog,
            store,
            publisher,
            sampler,
        })
    }
}

/// The assembled acquisition pipeline.
pub struct PumpMonitor {
    catalog: Arc<Catalog>,
    store: TimeSeriesStore,
    publisher: Arc<SnapshotPublisher>,
    sampler: Sampler,
}

impl PumpMonitor {
    pub fn builder(settings: Settings) -> MonitorBuilder {
        MonitorBuilder {
            settings,
            catalog: None,
            reader: None,
        }
    }

    /// Start acquisition. Idempotent.
    pub fn start(&self) {
        self.sampler.start();
    }

    /// Stop acquisition and disconnect the device.
    pub async fn shutdown(&self) {
        self.sampler.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.sampler.is_running()
    }

    /// The snapshot from the most recently completed cycle.
    pub fn current_snapshot(&self) -> Option<Arc<SystemSnapshot>> {
        self.sampler.latest()
    }

    /// Subscribe to per-cycle summaries; delivers the latest one
    /// immediately when a cycle has already completed.
    pub fn subscribe(&self) -> SummaryStream {
        self.publisher.subscribe()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.sampler.is_connected(),
            endpoint: self.sampler.description().to_string(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Samples in the trailing window, newest first; empty on store
    /// failure.
    pub async fn history(&self, pump_id: Option<u8>, hours: u32) -> Vec<SampleRecord> {
        self.store.history(pump_id, hours).await.unwrap_or_else(|err| {
            warn!(error = %err, "history query failed, returning no records");
            Vec::new()
        })
    }

    /// Trip events in the trailing window, newest first; empty on store
    /// failure.
    pub async fn trip_events(&self, pump_id: Option<u8>, hours: u32) -> Vec<TripEvent> {
        self.store
            .trip_events(pump_id, hours)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, "trip event query failed, returning no events");
                Vec::new()
            })
    }

    /// Status events in the trailing window, newest first; empty on store
    /// failure.
    pub async fn status_events(&self, pump_id: Option<u8>, hours: u32) -> Vec<StatusEvent> {
        self.store
            .status_events(pump_id, hours)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, "status event query failed, returning no events");
                Vec::new()
            })
    }

    /// Window aggregates; the all-zero default on store failure or when
    /// the window is empty.
    pub async fn stats(&self, pump_id: Option<u8>, hours: u32) -> Stats {
        self.store.stats(pump_id, hours).await.unwrap_or_else(|err| {
            warn!(error = %err, "stats query failed, returning defaults");
            Stats::default()
        })
    }

    /// Per-pump aggregates keyed by pump id; empty on store failure.
    pub async fn stats_per_pump(&self, hours: u32) -> BTreeMap<u8, Stats> {
        self.store.stats_per_pump(hours).await.unwrap_or_else(|err| {
            warn!(error = %err, "per-pump stats query failed, returning none");
            BTreeMap::new()
        })
    }

    /// The pump reference list: (id, display name), ascending; empty on
    /// store failure.
    pub async fn pumps(&self) -> Vec<(u8, String)> {
        self.store.pumps().await.unwrap_or_else(|err| {
            warn!(error = %err, "pump list query failed, returning none");
            Vec::new()
        })
    }
}
