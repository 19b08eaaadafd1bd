//! Device identity snapshot.
//!
//! [`DeviceIdentity`] is the cloneable description of a connected keyboard:
//! who made it, which form factor it is, what to call it, and the serial
//! number its profile is keyed by. It is filled in by the setup controller and
//! cleared again at teardown.
//!
//! ## Persistence notes
//! - `serial` is the stable key across reconnects; profiles are stored under it.
//! - `vendor_id`/`product_id` identify the model, not the unit.
//! - `path` is the OS path the transport was opened from; diagnostic only.

use crate::features::ModelClass;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// USB vendor id.
    pub vendor_id: u16,

    /// USB product id.
    pub product_id: u16,

    /// Form factor derived from `product_id`. `None` until setup runs.
    pub model: Option<ModelClass>,

    /// Human-readable name. Caller-supplied names win over the derived default.
    pub name: String,

    /// Serial number reported by the hardware.
    pub serial: String,

    /// OS path of the HID interface, when known.
    pub path: Option<String>,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:04x}:{:04x}] (S/N: {})",
            self.name, self.vendor_id, self.product_id, self.serial
        )
    }
}
