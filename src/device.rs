//! The per-connection device record.
//!
//! A [`Device`] is shared (usually as `Arc<Device>`) between the control path
//! (setup, reset, teardown, queue flushing) and the input path (key reports).
//! It holds two locks:
//! - the **state lock** around [`DeviceState`]: identity, features, transport,
//!   queue and profile;
//! - the **input lock** around the input side, taken by [`Device::deliver_input`].
//!
//! Lock order is state, then input. Teardown takes both and holds them until
//! the record is back in its closed state, so no input delivery can see a
//! half torn-down device.

use crate::backends::{Services, Transport};
use crate::error::{Result, TransportError};
use crate::features::FeatureSet;
use crate::metadata::DeviceIdentity;
use crate::profile::Profile;
use crate::queue::{CommandQueue, Message};
use crate::snapshot::DeviceStatus;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a device record is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Setup has not created the control node yet.
    Uninitialized,
    /// Set up and usable.
    Active,
    /// Set up, but the firmware must be updated before lighting works.
    NeedsUpdate,
    /// Torn down. The record holds no handles.
    Closed,
}

impl Lifecycle {
    /// `true` while the control node exists, i.e. teardown has work to do.
    pub fn has_control_node(self) -> bool {
        matches!(self, Self::Active | Self::NeedsUpdate)
    }
}

/// USB poll rate as reported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollRate {
    /// Not reported (boards without RGB).
    Disabled,
    Millis(u8),
}

impl PollRate {
    /// Wire value: milliseconds, or -1 when disabled.
    pub fn as_raw(self) -> i16 {
        match self {
            Self::Disabled => -1,
            Self::Millis(ms) => i16::from(ms),
        }
    }
}

/// What the enumerating code knows before setup: serial, optional name, and
/// the open transport (if the hardware is attached).
pub struct DeviceSkeleton {
    pub name: Option<String>,
    pub serial: String,
    pub path: Option<String>,
    pub transport: Option<Box<dyn Transport>>,
}

impl DeviceSkeleton {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            name: None,
            serial: serial.into(),
            path: None,
            transport: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }
}

impl fmt::Debug for DeviceSkeleton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSkeleton")
            .field("name", &self.name)
            .field("serial", &self.serial)
            .field("path", &self.path)
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

/// Everything guarded by the state lock.
pub struct DeviceState {
    pub lifecycle: Lifecycle,
    pub identity: DeviceIdentity,
    pub features: FeatureSet,
    /// Present iff the hardware is attached and open.
    pub transport: Option<Box<dyn Transport>>,
    /// Software lighting control engaged.
    pub active: bool,
    pub poll_rate: PollRate,
    /// 0 until the firmware has been queried successfully.
    pub fw_version: u16,
    /// The in-memory profile has been pushed to hardware this session.
    pub hw_loaded: bool,
    pub queue: CommandQueue,
    pub profile: Profile,
}

impl DeviceState {
    /// Record with no identity, no handles and no storage.
    pub(crate) fn empty(lifecycle: Lifecycle) -> Self {
        Self {
            lifecycle,
            identity: DeviceIdentity::default(),
            features: FeatureSet::empty(),
            transport: None,
            active: false,
            poll_rate: PollRate::Disabled,
            fw_version: 0,
            hw_loaded: false,
            queue: CommandQueue::new(),
            profile: Profile::new(String::new()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn has(&self, features: FeatureSet) -> bool {
        self.features.contains(features)
    }

    pub fn serial(&self) -> &str {
        &self.identity.serial
    }

    /// Queue a batch of commands, all or nothing.
    ///
    /// A no-op for devices that are not open or have no RGB lighting.
    pub fn enqueue(&mut self, batch: &[Message]) -> Result<()> {
        if !self.is_open() || !self.has(FeatureSet::RGB) {
            return Ok(());
        }
        self.queue.push_all(batch)
    }

    /// Send the oldest queued command. Returns `Ok(false)` if the queue was
    /// empty. A command that fails to send is dropped, not re-queued.
    pub fn dequeue(&mut self) -> std::result::Result<bool, TransportError> {
        let Some(msg) = self.queue.pop() else {
            return Ok(false);
        };
        self.send_now(&msg)?;
        Ok(true)
    }

    /// Send a command immediately, bypassing the queue.
    pub fn send_now(&mut self, msg: &Message) -> std::result::Result<(), TransportError> {
        match self.transport.as_mut() {
            Some(transport) => transport.send(msg),
            None => Err(TransportError::Disconnected),
        }
    }
}

impl fmt::Debug for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceState")
            .field("lifecycle", &self.lifecycle)
            .field("identity", &self.identity)
            .field("features", &self.features)
            .field("open", &self.is_open())
            .field("active", &self.active)
            .field("poll_rate", &self.poll_rate)
            .field("fw_version", &self.fw_version)
            .field("hw_loaded", &self.hw_loaded)
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

/// Everything guarded by the input lock.
#[derive(Debug, Default)]
pub(crate) struct InputState {
    pub(crate) open: bool,
    pub(crate) serial: String,
    pub(crate) delivered: u64,
}

/// One connected keyboard.
pub struct Device {
    state: Mutex<DeviceState>,
    input: Mutex<InputState>,
}

impl Device {
    pub(crate) fn new(state: DeviceState) -> Self {
        Self {
            state: Mutex::new(state),
            input: Mutex::new(InputState::default()),
        }
    }

    /// Take the state lock.
    ///
    /// Do not hold it while calling back into the controllers in this crate;
    /// they take it themselves.
    pub fn lock_state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock()
    }

    pub(crate) fn lock_input(&self) -> MutexGuard<'_, InputState> {
        self.input.lock()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lock().lifecycle
    }

    pub fn serial(&self) -> String {
        self.state.lock().identity.serial.clone()
    }

    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// [`DeviceState::enqueue`] under the state lock.
    pub fn enqueue(&self, batch: &[Message]) -> Result<()> {
        self.state.lock().enqueue(batch)
    }

    /// [`DeviceState::dequeue`] under the state lock.
    pub fn dequeue(&self) -> Result<bool> {
        Ok(self.state.lock().dequeue()?)
    }

    /// Input path: forward a raw key report to the input subsystem.
    ///
    /// Takes only the input lock. Returns `false` once the input side has been
    /// closed by teardown (or was never opened).
    pub fn deliver_input(&self, services: &Services, report: &[u8]) -> bool {
        let mut input = self.input.lock();
        if !input.open {
            return false;
        }
        services.input.emit(&input.serial, report);
        input.delivered += 1;
        true
    }

    /// Number of input reports delivered since setup.
    pub fn delivered_inputs(&self) -> u64 {
        self.input.lock().delivered
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus::from_state(&self.state.lock())
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
