//! Lighting/keymap profiles.
//!
//! A [`Profile`] belongs to one physical keyboard, identified by the serial
//! number the hardware reports. Profiles are created at setup (read from the
//! hardware or restored from a [`ProfileStore`](crate::store::ProfileStore)),
//! edited by the application while the device is connected, and written back
//! to the store at teardown.
//!
//! Mode payloads are opaque here; their layout belongs to the firmware backend.

use serde::{Deserialize, Serialize};

/// Which keymap a profile uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keymap {
    /// The host system's native layout.
    System,
    /// A user layout, referenced by name.
    Named(String),
}

/// One lighting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode {
    pub name: String,
    /// Backend-defined lighting payload.
    pub lighting: Vec<u8>,
}

impl Mode {
    /// Placeholder for mode `index` when the hardware cannot be read.
    pub fn blank(index: usize) -> Self {
        Self {
            name: format!("Mode {}", index + 1),
            lighting: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub serial: String,
    pub name: String,
    /// `None` only before setup has finished.
    pub keymap: Option<Keymap>,
    pub modes: Vec<Mode>,
    pub current_mode: usize,
}

impl Profile {
    /// Fresh profile with no keymap and no modes.
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            name: "Unnamed".to_string(),
            keymap: None,
            modes: Vec::new(),
            current_mode: 0,
        }
    }

    pub fn current(&self) -> Option<&Mode> {
        self.modes.get(self.current_mode)
    }

    pub fn mode_count(&self) -> usize {
        self.modes.len()
    }
}
