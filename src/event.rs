//! Connectivity notifications.
//!
//! The lifecycle controllers report two kinds of change through the
//! [`Notifier`](crate::backends::Notifier): the set of connected keyboards
//! changed, or one keyboard connected/disconnected. [`EventBus`](crate::eventbus::EventBus)
//! turns those calls into timestamped [`DeviceEvent`]s for listeners.

use std::time::Instant;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// The list of connected keyboards changed.
    ConnectivityChanged,

    /// A keyboard finished setup.
    Connected { serial: String, name: String },

    /// A keyboard was torn down.
    Disconnected { serial: String, name: String },
}

impl EventKind {
    /// Serial of the keyboard this event is about, if it concerns one keyboard.
    pub fn serial(&self) -> Option<&str> {
        match self {
            Self::ConnectivityChanged => None,
            Self::Connected { serial, .. } | Self::Disconnected { serial, .. } => Some(serial),
        }
    }
}

/// Timestamped notification delivered to listeners.
#[derive(Clone, Debug)]
pub struct DeviceEvent {
    /// Emission time (monotonic).
    pub at: Instant,
    pub kind: EventKind,
}

impl DeviceEvent {
    pub fn now(kind: EventKind) -> Self {
        Self {
            at: Instant::now(),
            kind,
        }
    }
}
