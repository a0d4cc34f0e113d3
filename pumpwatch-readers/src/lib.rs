//! # pumpwatch-readers
//!
//! Device readers for the pumpwatch acquisition pipeline.
//!
//! This crate provides a trait-based abstraction for reading a complete
//! snapshot of every catalogued point from an industrial controller, plus
//! two implementations:
//!
//! - [`ControllerReader`] - catalog-driven reads over an opaque
//!   [`PointTransport`] byte interface (the actual wire protocol lives in
//!   the transport implementation, outside this crate)
//! - [`SimulatedReader`] - a synthetic generator producing structurally
//!   valid snapshots bounded by each point's engineering range, used when
//!   no controller is reachable
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pumpwatch_readers::{DeviceReader, SimulatedReader};
//! use pumpwatch_types::Catalog;
//!
//! # tokio_test::block_on(async {
//! let catalog = Arc::new(Catalog::reference());
//! let mut reader = SimulatedReader::with_seed(catalog, 7);
//! reader.connect().await.unwrap();
//!
//! let snapshot = reader.read().await.unwrap();
//! assert_eq!(snapshot.len(), 7);
//! # });
//! ```

mod controller;
mod error;
mod simulated;

pub use controller::{ControllerReader, PointTransport};
pub use error::ReadError;
pub use simulated::SimulatedReader;

use async_trait::async_trait;
use pumpwatch_types::SystemSnapshot;

/// Trait for reading complete point snapshots from a device.
///
/// Implementations read every catalogued point and return a structurally
/// valid [`SystemSnapshot`] or a whole-read failure. A failure to read an
/// individual point is not a whole-read failure: the point is recorded
/// with its fallback value and logged, never raised.
#[async_trait]
pub trait DeviceReader: Send {
    /// Establish the device connection.
    async fn connect(&mut self) -> Result<(), ReadError>;

    /// Tear the connection down. Safe to call when not connected.
    async fn disconnect(&mut self);

    /// Read all catalogued points into one snapshot.
    async fn read(&mut self) -> Result<SystemSnapshot, ReadError>;

    /// Whether the device link is currently up.
    fn is_connected(&self) -> bool;

    /// Human-readable description of the device endpoint.
    ///
    /// Used in logs and the connection status surface.
    fn description(&self) -> &str;
}
