//! Error types.
//!
//! [`Error`] is the crate-wide error returned by the setup, reset and teardown
//! controllers and by the command queue. Lower layers report their own, smaller
//! enums ([`TransportError`] for hardware exchanges, [`StoreError`] for profile
//! persistence) which convert into [`Error`] where they cross a controller.
//!
//! ## Reset severity
//! Every [`Error`] can be classified with [`Error::reset_severity`]. The reset
//! retry driver keeps looping on [`ResetSeverity::Transient`] results and gives
//! up on the first [`ResetSeverity::Fatal`] one.

use std::io;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a [`Transport`](crate::backends::Transport) or by a
/// collaborator that talks to hardware through it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The device handle is gone (unplugged, closed, or never opened).
    #[error("device disconnected")]
    Disconnected,

    /// The device did not answer in time.
    #[error("device timed out")]
    Timeout,

    /// Any other I/O failure reported by the OS or HID layer.
    #[error("transport I/O error: {0}")]
    Io(String),

    /// The backend cannot perform this operation.
    #[error("operation not supported by transport: {0}")]
    Unsupported(&'static str),
}

/// Failure reported by a [`ProfileStore`](crate::store::ProfileStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("profile store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Whether a failed reset is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetSeverity {
    /// Retry after another settle interval.
    Transient,
    /// The connection cannot be salvaged; the device must be disconnected.
    Fatal,
}

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum Error {
    /// The control node for the device could not be created.
    #[error("failed to create control node: {0}")]
    DevNodeFailed(#[source] io::Error),

    /// The input subsystem refused to open for the device.
    #[error("failed to open input device: {0}")]
    InputOpenFailed(#[source] io::Error),

    /// The batch does not fit; nothing was queued.
    #[error("command queue full: {queued} queued + {requested} requested > capacity {capacity}")]
    QueueFull {
        queued: usize,
        requested: usize,
        capacity: usize,
    },

    /// A queued command could not be delivered while flushing before a reset.
    #[error("failed to drain command queue: {0}")]
    QueueDrainFailed(#[source] TransportError),

    /// The firmware version query failed after a reset.
    #[error("firmware version could not be read")]
    FirmwareUnreadable,

    /// The profile could not be restored onto hardware during setup.
    #[error("failed to restore profile onto hardware")]
    RestoreFailed,

    /// The device came back from a reset but could not be fully re-initialized.
    #[error("device reset completed but re-initialization is incomplete")]
    ResetIncomplete,

    /// Failure propagated unchanged from the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The operation needs a device that finished setup and has not been closed.
    #[error("device is not initialized")]
    NotInitialized,

    /// Every device slot is occupied.
    #[error("no free device slot (max {0})")]
    NoFreeSlot(usize),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Classify this error for the reset retry driver.
    ///
    /// Fatal: an incomplete re-initialization, a transport that reports the
    /// device as gone, or a device that is no longer initialized. Everything
    /// else is retried.
    pub fn reset_severity(&self) -> ResetSeverity {
        match self {
            Self::ResetIncomplete
            | Self::NotInitialized
            | Self::Transport(TransportError::Disconnected) => ResetSeverity::Fatal,
            _ => ResetSeverity::Transient,
        }
    }

    /// Shorthand for `reset_severity() == ResetSeverity::Fatal`.
    pub fn is_fatal(&self) -> bool {
        self.reset_severity() == ResetSeverity::Fatal
    }
}
