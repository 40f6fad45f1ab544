//! Error types shared across the crate.

/// Anything that can go wrong between the facade and the device.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The GATT session is not (or no longer) connected.
    #[error("device link is down")]
    Disconnected,

    /// Discovery finished without finding a matching unit.
    #[error("no device found")]
    DeviceNotFound,

    /// The transport failed while establishing the session.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// A reply frame failed checksum verification.
    #[error("checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// A query or latch wait ran out of time.
    #[error("timed out waiting for the device")]
    Timeout,

    /// The supervisor worker is gone; commands have nowhere to go.
    #[error("bridge worker is not running")]
    WorkerStopped,

    #[error(transparent)]
    Ble(#[from] btleplug::Error),
}
