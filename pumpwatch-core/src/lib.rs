//! # pumpwatch-core
//!
//! The acquisition pipeline: a cyclic sampler reads pump snapshots from a
//! device, a detector turns state changes between cycles into events, a
//! SQLite store persists samples and events transactionally, and a
//! publisher fans per-cycle summaries out to subscribers.
//!
//! [`PumpMonitor`] assembles the whole pipeline:
//!
//! ```no_run
//! use pumpwatch_core::{PumpMonitor, Settings};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let monitor = PumpMonitor::builder(Settings::default()).build().await?;
//!     monitor.start();
//!
//!     let mut updates = monitor.subscribe();
//!     while let Some(summary) = updates.recv().await {
//!         println!("alarm: {}", summary.alarm);
//!     }
//!
//!     monitor.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod detector;
pub mod monitor;
pub mod publisher;
pub mod sampler;
pub mod settings;
pub mod store;

pub use detector::{detect_transitions, PumpFlags};
pub use monitor::{ConnectionStatus, MonitorBuilder, MonitorError, PumpMonitor};
pub use publisher::{SnapshotPublisher, SummaryStream};
pub use sampler::{Sampler, SamplerConfig};
pub use settings::{ControllerSettings, Settings, SettingsError};
pub use store::{StoreError, TimeSeriesStore};
