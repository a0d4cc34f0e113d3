//! # pumpwatch-types
//!
//! Core types for the pumpwatch acquisition pipeline. This crate defines the
//! schema shared by the device readers, the sampler and the time-series
//! store: the static point catalog, per-cycle snapshots and the persisted
//! record types.
//!
//! ## Design Goals
//!
//! - **Pure data**: no I/O and no behaviour beyond derivation and validation
//! - **Validated once**: the catalog is checked at construction, never at
//!   read time
//! - **Whole-value snapshots**: a [`SystemSnapshot`] is built complete or not
//!   at all; the alarm flag is derived at construction and cannot drift
//!
//! ## Example
//!
//! ```rust
//! use pumpwatch_types::{Catalog, Parameter};
//!
//! let catalog = Catalog::reference();
//! assert_eq!(catalog.pump_count(), 7);
//!
//! let speed = catalog.spec(3, Parameter::Speed).unwrap();
//! assert_eq!(speed.unit, "Hz");
//! assert_eq!((speed.min, speed.max), (0.0, 50.0));
//! ```

mod catalog;
mod record;
mod snapshot;

pub use catalog::*;
pub use record::*;
pub use snapshot::*;
