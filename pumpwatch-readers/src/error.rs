//! Error types for device readers.

use thiserror::Error;

/// Whole-read failures surfaced by a [`DeviceReader`](crate::DeviceReader).
///
/// Single-point read failures are handled inside the reader with fallback
/// values and never appear here.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The device link could not be established or was lost.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A read was attempted without an established connection.
    #[error("not connected")]
    NotConnected,

    /// The device did not answer within the enforced timeout.
    #[error("read timed out")]
    Timeout,

    /// The transport reported a protocol-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}
