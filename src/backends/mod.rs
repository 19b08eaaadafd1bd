//! Collaborator interfaces and their implementations.
//!
//! The lifecycle controllers never talk to the OS directly. Everything outside
//! the core is reached through the traits in this module:
//!
//! | Trait              | Responsibility                                         |
//! |--------------------|--------------------------------------------------------|
//! | [`Transport`]      | per-device HID handle: send/receive reports, reset     |
//! | [`ControlNode`]    | the device's control endpoint (IPC node)               |
//! | [`InputSubsystem`] | virtual input device that key events are emitted into  |
//! | [`LedUpdater`]     | indicator LEDs (caps/num/scroll lock)                  |
//! | [`Firmware`]       | version query, profile load/flash, mode marker         |
//! | [`Lighting`]       | lighting modes, software/hardware control, frame push  |
//! | [`Notifier`]       | connectivity notifications                             |
//!
//! [`Services`] bundles the process-wide collaborators with the [`Config`].
//!
//! # Feature flags
//! - **`hid`**: enables [`hid`], a `hidapi`-backed [`Transport`] and keyboard probe.
//!
//! [`virtual_input`] is always available: an in-memory keyboard and host used
//! by tests and simulations.

use crate::config::Config;
use crate::device::{DeviceState, PollRate};
use crate::error::{Result, TransportError};
use crate::profile::Mode;
use crate::queue::Message;
use crate::store::ProfileStore;
use std::io;
use std::panic::Location;
use std::sync::Arc;

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;

pub mod virtual_input;

/// Open HID handle of one device. All calls block.
pub trait Transport: Send {
    fn send(&mut self, message: &Message) -> std::result::Result<(), TransportError>;

    fn receive(&mut self) -> std::result::Result<Message, TransportError>;

    /// Physically reset the device. `origin` is the call site that asked for
    /// the reset, for diagnostics.
    fn reset(&mut self, origin: &'static Location<'static>)
        -> std::result::Result<(), TransportError>;

    /// Release the handle. Calling it twice is harmless.
    fn close(&mut self);
}

pub trait ControlNode: Send + Sync {
    fn create(&self, device: &DeviceState) -> io::Result<()>;
    fn remove(&self, device: &DeviceState);
}

pub trait InputSubsystem: Send + Sync {
    fn open(&self, device: &DeviceState) -> io::Result<()>;
    fn close(&self, device: &DeviceState);

    /// Forward a raw input report from the keyboard with serial `serial`.
    fn emit(&self, serial: &str, report: &[u8]);
}

pub trait LedUpdater: Send + Sync {
    /// Best effort; failures are the updater's to log.
    fn push_indicators(&self, device: &mut DeviceState);
}

/// Result of a firmware version query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfo {
    /// Never 0 on success.
    pub version: u16,
    pub poll_rate: PollRate,
}

pub trait Firmware: Send + Sync {
    fn query_version(
        &self,
        device: &mut DeviceState,
    ) -> std::result::Result<FirmwareInfo, TransportError>;

    /// Decided from the version recorded on `device`.
    fn needs_update(&self, device: &DeviceState) -> bool;

    /// Push `device.profile` to the hardware. With `validate`, the profile is
    /// checked and fixed up before flashing; without, it is trusted as-is.
    fn load_profile(
        &self,
        device: &mut DeviceState,
        validate: bool,
    ) -> std::result::Result<(), TransportError>;

    /// Record that the device runs in native firmware mode.
    fn write_mode_marker(&self, device: &DeviceState);
}

pub trait Lighting: Send + Sync {
    /// Read lighting mode `index` off the hardware.
    fn read_mode(
        &self,
        device: &mut DeviceState,
        index: usize,
    ) -> std::result::Result<Mode, TransportError>;

    /// Hand lighting control to the keyboard's own firmware (`on`) or take it
    /// back for software (`!on`). Used by boards without RGB.
    fn set_hardware_mode(
        &self,
        device: &mut DeviceState,
        on: bool,
    ) -> std::result::Result<(), TransportError>;

    /// Engage or release software lighting control. May enqueue commands.
    fn set_active(&self, device: &mut DeviceState, active: bool) -> Result<()>;

    /// Send the full current lighting state.
    fn push_state(&self, device: &mut DeviceState) -> Result<()>;
}

pub trait Notifier: Send + Sync {
    fn connectivity_changed(&self);
    fn connect_state(&self, device: &DeviceState, connected: bool);
}

/// Process-wide collaborators plus configuration, shared by every device.
#[derive(Clone)]
pub struct Services {
    pub config: Config,
    pub control: Arc<dyn ControlNode>,
    pub input: Arc<dyn InputSubsystem>,
    pub leds: Arc<dyn LedUpdater>,
    pub firmware: Arc<dyn Firmware>,
    pub lighting: Arc<dyn Lighting>,
    pub notifier: Arc<dyn Notifier>,
    pub store: Arc<dyn ProfileStore>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
