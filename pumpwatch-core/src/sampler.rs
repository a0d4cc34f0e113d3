//! The cyclic acquisition loop.
//!
//! One background task per sampler: every tick it reads a snapshot from
//! the device (or fabricates one when the device is unreachable), runs
//! transition detection against the previous cycle, persists samples and
//! events in one transaction, and publishes the result. A cycle that
//! overruns the interval delays subsequent ticks rather than stacking
//! them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use pumpwatch_readers::{DeviceReader, SimulatedReader};
use pumpwatch_types::{Catalog, SystemSnapshot};

use crate::detector::{detect_transitions, PumpFlags};
use crate::publisher::SnapshotPublisher;
use crate::store::TimeSeriesStore;

/// Timing knobs for the acquisition loop.
#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    /// Target period between cycles.
    pub interval: Duration,
    /// Budget for a single device read or connect attempt.
    pub read_timeout: Duration,
    /// How long [`Sampler::stop`] waits for the loop to finish its cycle
    /// before aborting the task.
    pub stop_grace: Duration,
    /// While disconnected, attempt a reconnect every this many cycles.
    pub reconnect_every: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            read_timeout: Duration::from_millis(800),
            stop_grace: Duration::from_secs(5),
            reconnect_every: 10,
        }
    }
}

/// State shared between the sampler handle and its background task.
struct SamplerShared {
    latest: RwLock<Option<Arc<SystemSnapshot>>>,
    connected: AtomicBool,
}

struct RunningTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<Box<dyn DeviceReader>>,
}

/// Owns the acquisition task and the reader it drives.
///
/// `start` is idempotent; `stop` waits out the in-flight cycle (bounded by
/// the grace period), disconnects the reader and hands it back so a later
/// `start` can reuse it. If the grace period expires the task is aborted
/// and the reader is lost with it: the sampler stays stopped until it is
/// rebuilt with a fresh reader.
pub struct Sampler {
    catalog: Arc<Catalog>,
    store: TimeSeriesStore,
    publisher: Arc<SnapshotPublisher>,
    config: SamplerConfig,
    description: String,
    shared: Arc<SamplerShared>,
    idle_reader: Mutex<Option<Box<dyn DeviceReader>>>,
    task: Mutex<Option<RunningTask>>,
}

impl Sampler {
    pub fn new(
        catalog: Arc<Catalog>,
        reader: Box<dyn DeviceReader>,
        store: TimeSeriesStore,
        publisher: Arc<SnapshotPublisher>,
        config: SamplerConfig,
    ) -> Self {
        let description = reader.description().to_string();
        let shared = Arc::new(SamplerShared {
            latest: RwLock::new(None),
            connected: AtomicBool::new(reader.is_connected()),
        });
        Self {
            catalog,
            store,
            publisher,
            config,
            description,
            shared,
            idle_reader: Mutex::new(Some(reader)),
            task: Mutex::new(None),
        }
    }

    /// Launch the acquisition loop. A second call while running is a no-op.
    pub fn start(&self) {
        let mut task_slot = self.task.lock();
        if task_slot.is_some() {
            debug!("sampler already running");
            return;
        }
        let Some(reader) = self.idle_reader.lock().take() else {
            warn!("sampler has no reader to start with");
            return;
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let cycle_loop = CycleLoop {
            reader,
            fallback: SimulatedReader::new(self.catalog.clone()),
            baselines: HashMap::new(),
            cycles_since_attempt: 0,
            shared: self.shared.clone(),
            store: self.store.clone(),
            publisher: self.publisher.clone(),
            config: self.config,
        };
        let handle = tokio::spawn(cycle_loop.run(stop_rx));
        *task_slot = Some(RunningTask {
            stop: stop_tx,
            handle,
        });
        info!(
            device = %self.description,
            interval = ?self.config.interval,
            "sampler started"
        );
    }

    /// Stop the loop, letting an in-flight cycle finish within the grace
    /// period, then disconnect the reader. Safe to call when not running.
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().take() else {
            debug!("sampler not running");
            return;
        };
        let RunningTask { stop, mut handle } = task;
        let _ = stop.send(true);

        match timeout(self.config.stop_grace, &mut handle).await {
            Ok(Ok(mut reader)) => {
                reader.disconnect().await;
                *self.idle_reader.lock() = Some(reader);
                info!("sampler stopped");
            }
            Ok(Err(err)) => {
                error!(error = %err, "sampler task failed");
            }
            Err(_) => {
                // The reader is owned by the aborted task and cannot be
                // recovered; restarting needs a rebuilt sampler.
                warn!(
                    grace = ?self.config.stop_grace,
                    "sampler did not stop within grace period, aborting task and discarding reader"
                );
                handle.abort();
            }
        }
        self.shared.connected.store(false, Ordering::Release);
    }

    /// The snapshot from the most recently completed cycle.
    pub fn latest(&self) -> Option<Arc<SystemSnapshot>> {
        self.shared.latest.read().clone()
    }

    /// Whether the device link was up as of the last cycle.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// The reader's endpoint description, for status surfaces.
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Everything the background task owns. Consumed by `run`, which returns
/// the reader on shutdown so it can be disconnected and reused.
struct CycleLoop {
    reader: Box<dyn DeviceReader>,
    fallback: SimulatedReader,
    baselines: HashMap<u8, PumpFlags>,
    cycles_since_attempt: u32,
    shared: Arc<SamplerShared>,
    store: TimeSeriesStore,
    publisher: Arc<SnapshotPublisher>,
    config: SamplerConfig,
}

impl CycleLoop {
    async fn run(mut self, mut stop_rx: watch::Receiver<bool>) -> Box<dyn DeviceReader> {
        if self.reader.is_connected() {
            self.shared.connected.store(true, Ordering::Release);
        } else {
            self.try_connect().await;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    match changed {
                        Ok(()) if *stop_rx.borrow() => break,
                        Ok(()) => {}
                        // Sampler handle dropped; nothing left to serve.
                        Err(_) => break,
                    }
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }

        debug!("acquisition loop exited");
        self.reader
    }

    async fn run_cycle(&mut self) {
        let snapshot = self.acquire().await;

        let mut events = Vec::new();
        for (pump_id, pump) in snapshot.iter() {
            let previous = self.baselines.get(pump_id).copied();
            events.extend(detect_transitions(previous, pump, snapshot.timestamp));
            self.baselines.insert(*pump_id, PumpFlags::from(pump));
        }
        if !events.is_empty() {
            info!(count = events.len(), "pump state transitions detected");
        }

        // Persistence failure costs this cycle's records, nothing more; the
        // snapshot is still published.
        if let Err(err) = self.store.record_cycle(&snapshot, &events).await {
            warn!(error = %err, "cycle not persisted, records lost");
        }

        let snapshot = Arc::new(snapshot);
        *self.shared.latest.write() = Some(snapshot.clone());
        self.publisher.publish(snapshot.summary());
    }

    /// Read from the device when connected; otherwise (or on failure) fall
    /// back to synthetic data, scheduling periodic reconnect attempts.
    async fn acquire(&mut self) -> SystemSnapshot {
        if self.shared.connected.load(Ordering::Acquire) {
            match timeout(self.config.read_timeout, self.reader.read()).await {
                Ok(Ok(snapshot)) => return snapshot,
                Ok(Err(err)) => {
                    warn!(error = %err, "device read failed, switching to simulated data");
                }
                Err(_) => {
                    warn!("device read timed out, switching to simulated data");
                }
            }
            self.shared.connected.store(false, Ordering::Release);
            self.cycles_since_attempt = 0;
        } else {
            self.cycles_since_attempt += 1;
            if self.cycles_since_attempt >= self.config.reconnect_every {
                self.try_connect().await;
                if self.shared.connected.load(Ordering::Acquire) {
                    match timeout(self.config.read_timeout, self.reader.read()).await {
                        Ok(Ok(snapshot)) => return snapshot,
                        _ => {
                            warn!("read after reconnect failed, staying on simulated data");
                            self.shared.connected.store(false, Ordering::Release);
                        }
                    }
                }
            }
        }

        self.fallback.generate()
    }

    async fn try_connect(&mut self) {
        self.cycles_since_attempt = 0;
        match timeout(self.config.read_timeout, self.reader.connect()).await {
            Ok(Ok(())) => {
                info!(device = %self.reader.description(), "device connected");
                self.shared.connected.store(true, Ordering::Release);
            }
            Ok(Err(err)) => {
                debug!(error = %err, "connect attempt failed");
            }
            Err(_) => {
                debug!("connect attempt timed out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pumpwatch_readers::ReadError;
    use pumpwatch_types::Catalog;

    /// A reader whose reads never complete.
    struct HangingReader;

    #[async_trait]
    impl DeviceReader for HangingReader {
        async fn connect(&mut self) -> Result<(), ReadError> {
            Ok(())
        }

        async fn disconnect(&mut self) {}

        async fn read(&mut self) -> Result<SystemSnapshot, ReadError> {
            std::future::pending().await
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn description(&self) -> &str {
            "hanging"
        }
    }

    async fn simulated_sampler(interval: Duration) -> (Sampler, Arc<SnapshotPublisher>) {
        let catalog = Arc::new(Catalog::reference());
        let store = TimeSeriesStore::in_memory(&catalog).await.unwrap();
        let publisher = Arc::new(SnapshotPublisher::new(16));
        let reader = Box::new(SimulatedReader::with_seed(catalog.clone(), 11));
        let config = SamplerConfig {
            interval,
            read_timeout: Duration::from_millis(100),
            stop_grace: Duration::from_secs(2),
            reconnect_every: 2,
        };
        let sampler = Sampler::new(catalog, reader, store, publisher.clone(), config);
        (sampler, publisher)
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let (sampler, _) = simulated_sampler(Duration::from_millis(10)).await;
        assert!(!sampler.is_running());
        sampler.stop().await;
        assert!(!sampler.is_running());
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_returns_the_reader() {
        let (sampler, _) = simulated_sampler(Duration::from_millis(10)).await;

        sampler.start();
        sampler.start();
        assert!(sampler.is_running());

        sampler.stop().await;
        assert!(!sampler.is_running());

        // The reader came back, so the sampler can be started again.
        sampler.start();
        assert!(sampler.is_running());
        sampler.stop().await;
    }

    #[tokio::test]
    async fn forced_abort_leaves_the_sampler_stopped_for_good() {
        let catalog = Arc::new(Catalog::reference());
        let store = TimeSeriesStore::in_memory(&catalog).await.unwrap();
        let publisher = Arc::new(SnapshotPublisher::new(16));
        // Read timeout longer than the grace period: the cycle is still
        // stuck in its read when stop gives up.
        let config = SamplerConfig {
            interval: Duration::from_millis(10),
            read_timeout: Duration::from_secs(30),
            stop_grace: Duration::from_millis(50),
            reconnect_every: 2,
        };
        let sampler = Sampler::new(catalog, Box::new(HangingReader), store, publisher, config);

        sampler.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        sampler.stop().await;
        assert!(!sampler.is_running());

        // The reader went down with the aborted task, so a restart is
        // refused rather than spinning without one.
        sampler.start();
        assert!(!sampler.is_running());
    }

    #[tokio::test]
    async fn cycles_publish_summaries_and_persist_samples() {
        let (sampler, publisher) = simulated_sampler(Duration::from_millis(10)).await;
        let mut stream = publisher.subscribe();

        sampler.start();
        let summary = timeout(Duration::from_secs(2), stream.recv())
            .await
            .expect("a cycle should complete well within two seconds")
            .expect("publisher is alive");
        assert_eq!(summary.setpoints.len(), 7);

        sampler.stop().await;

        let snapshot = sampler.latest().expect("at least one cycle ran");
        assert_eq!(snapshot.len(), 7);
        let records = sampler.store.history(None, 1).await.unwrap();
        assert!(!records.is_empty());
    }
}
