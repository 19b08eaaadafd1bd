//! Runtime configuration.
//!
//! [`Config`] is an immutable value handed to the controllers through
//! [`Services`](crate::backends::Services). It replaces process-wide tunables:
//! the feature mask applied at setup, the command queue capacity, the number of
//! device slots, and the three hardware settle intervals.
//!
//! # TOML
//! ```toml
//! feature_mask = "RGB | POLL_RATE | BIND | NOTIFY | FW_VERSION"
//! queue_capacity = 40
//! max_devices = 9
//!
//! [settle]
//! short_ms = 10
//! medium_ms = 100
//! long_ms = 1000
//! ```
//! Every key is optional.

use crate::error::Result;
use crate::features::FeatureSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of messages a device queue can hold.
pub const DEFAULT_QUEUE_CAPACITY: usize = 40;

/// Default number of device slots in a [`DeviceManager`](crate::manager::DeviceManager).
pub const DEFAULT_MAX_DEVICES: usize = 9;

/// Which settle interval to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    Short,
    Medium,
    Long,
}

/// Hardware quiescence delays, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleTimes {
    pub short_ms: u64,
    pub medium_ms: u64,
    pub long_ms: u64,
}

impl Default for SettleTimes {
    fn default() -> Self {
        Self {
            short_ms: 10,
            medium_ms: 100,
            long_ms: 1000,
        }
    }
}

impl SettleTimes {
    pub fn duration(&self, settle: Settle) -> Duration {
        let ms = match settle {
            Settle::Short => self.short_ms,
            Settle::Medium => self.medium_ms,
            Settle::Long => self.long_ms,
        };
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Features allowed on any device. Intersected with the per-model set at setup.
    pub feature_mask: FeatureSet,
    pub queue_capacity: usize,
    pub max_devices: usize,
    pub settle: SettleTimes,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feature_mask: FeatureSet::all(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_devices: DEFAULT_MAX_DEVICES,
            settle: SettleTimes::default(),
        }
    }
}

impl Config {
    /// Default configuration with every settle interval set to zero.
    ///
    /// Meant for tests and simulated devices, where nothing needs time to settle.
    pub fn immediate() -> Self {
        Self {
            settle: SettleTimes {
                short_ms: 0,
                medium_ms: 0,
                long_ms: 0,
            },
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Same config with `features` removed from the mask.
    pub fn without(mut self, features: FeatureSet) -> Self {
        self.feature_mask.remove(features);
        self
    }

    /// Block the calling thread for the given settle interval.
    pub fn settle(&self, settle: Settle) {
        let wait = self.settle.duration(settle);
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}
