//! Point-in-time view of connected keyboards.
//!
//! [`DeviceStatus`] is an **owned**, serializable copy of the interesting parts
//! of one [`DeviceState`](crate::device::DeviceState), taken under its state
//! lock. [`Snapshot`] collects them for every occupied slot of a
//! [`DeviceManager`](crate::manager::DeviceManager), keyed by serial number.
//!
//! A snapshot is immutable and does not track later changes; ask the manager
//! for a new one to refresh.
//!
//! # Example
//! ```no_run
//! use kbdlink::Snapshot;
//!
//! fn print(snap: &Snapshot) {
//!     for (serial, status) in snap.iter() {
//!         println!("{serial}: {:?} fw={:#06x} queued={}",
//!                  status.lifecycle, status.fw_version, status.queued);
//!     }
//! }
//! ```

use crate::device::{DeviceState, Lifecycle, PollRate};
use crate::features::FeatureSet;
use crate::metadata::DeviceIdentity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub identity: DeviceIdentity,
    pub lifecycle: Lifecycle,
    pub features: FeatureSet,
    pub open: bool,
    pub active: bool,
    pub poll_rate: PollRate,
    pub fw_version: u16,
    pub hw_loaded: bool,
    pub queued: usize,
    pub modes: usize,
    pub current_mode: usize,
}

impl DeviceStatus {
    pub fn from_state(state: &DeviceState) -> Self {
        Self {
            identity: state.identity.clone(),
            lifecycle: state.lifecycle,
            features: state.features,
            open: state.is_open(),
            active: state.active,
            poll_rate: state.poll_rate,
            fw_version: state.fw_version,
            hw_loaded: state.hw_loaded,
            queued: state.queue.len(),
            modes: state.profile.modes.len(),
            current_mode: state.profile.current_mode,
        }
    }
}

/// Owned snapshot of device statuses (`serial → DeviceStatus`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot(pub HashMap<String, DeviceStatus>);

impl Snapshot {
    /// Get the status for a specific serial.
    #[inline]
    pub fn get(&self, serial: &str) -> Option<&DeviceStatus> {
        self.0.get(serial)
    }

    /// Iterate `(serial, status)` pairs.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DeviceStatus)> {
        self.0.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the snapshot and return the inner map.
    #[inline]
    pub fn into_inner(self) -> HashMap<String, DeviceStatus> {
        self.0
    }

    /// Serialize to pretty JSON, e.g. for a status endpoint.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.0)
    }
}
