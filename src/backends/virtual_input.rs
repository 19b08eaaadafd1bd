//! In-memory keyboard and host.
//!
//! [`VirtualKeyboard`] is a [`Transport`] that records every command sent to it
//! and replays scripted reset results. [`VirtualHost`] implements every
//! process-wide collaborator trait against a [`HostScript`] and keeps a log of
//! the calls it received ([`HostCall`]).
//!
//! Clones share state, so a test can hand one handle to the device and keep
//! another to inspect or script it:
//!
//! ```
//! use kbdlink::backends::virtual_input::VirtualKeyboard;
//!
//! let kb = VirtualKeyboard::new("SIM0001");
//! let skeleton = kb.skeleton();
//! assert_eq!(skeleton.serial, "SIM0001");
//! kb.disconnect();
//! ```

use crate::backends::{
    ControlNode, Firmware, FirmwareInfo, InputSubsystem, LedUpdater, Lighting, Notifier, Services,
    Transport,
};
use crate::config::Config;
use crate::device::{DeviceSkeleton, DeviceState, PollRate};
use crate::error::{Error, Result, TransportError};
use crate::profile::Mode;
use crate::queue::Message;
use crate::store::ProfileStore;
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::io;
use std::panic::Location;
use std::sync::Arc;

#[derive(Debug)]
struct KeyboardShared {
    sent: Vec<Message>,
    replies: VecDeque<Message>,
    reset_results: VecDeque<std::result::Result<(), TransportError>>,
    resets: usize,
    connected: bool,
    closed: bool,
}

/// Scriptable in-memory transport.
#[derive(Debug, Clone)]
pub struct VirtualKeyboard {
    serial: String,
    shared: Arc<Mutex<KeyboardShared>>,
}

impl VirtualKeyboard {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            shared: Arc::new(Mutex::new(KeyboardShared {
                sent: Vec::new(),
                replies: VecDeque::new(),
                reset_results: VecDeque::new(),
                resets: 0,
                connected: true,
                closed: false,
            })),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Another handle onto the same keyboard.
    pub fn handle(&self) -> Self {
        self.clone()
    }

    /// Skeleton for setup, carrying a handle to this keyboard.
    pub fn skeleton(&self) -> DeviceSkeleton {
        DeviceSkeleton::new(self.serial.clone()).with_transport(self.handle())
    }

    /// Queue a report for the next [`Transport::receive`].
    pub fn feed(&self, reply: Message) {
        self.shared.lock().replies.push_back(reply);
    }

    /// Every command sent so far, oldest first.
    pub fn sent(&self) -> Vec<Message> {
        self.shared.lock().sent.clone()
    }

    pub fn disconnect(&self) {
        self.shared.lock().connected = false;
    }

    pub fn reconnect(&self) {
        self.shared.lock().connected = true;
    }

    /// Result for the next reset. Unscripted resets succeed.
    pub fn push_reset_result(&self, result: std::result::Result<(), TransportError>) {
        self.shared.lock().reset_results.push_back(result);
    }

    pub fn reset_count(&self) -> usize {
        self.shared.lock().resets
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl Transport for VirtualKeyboard {
    fn send(&mut self, message: &Message) -> std::result::Result<(), TransportError> {
        let mut shared = self.shared.lock();
        if !shared.connected || shared.closed {
            return Err(TransportError::Disconnected);
        }
        shared.sent.push(*message);
        Ok(())
    }

    fn receive(&mut self) -> std::result::Result<Message, TransportError> {
        let mut shared = self.shared.lock();
        if !shared.connected || shared.closed {
            return Err(TransportError::Disconnected);
        }
        shared.replies.pop_front().ok_or(TransportError::Timeout)
    }

    fn reset(
        &mut self,
        _origin: &'static Location<'static>,
    ) -> std::result::Result<(), TransportError> {
        let mut shared = self.shared.lock();
        shared.resets += 1;
        shared.reset_results.pop_front().unwrap_or(Ok(()))
    }

    fn close(&mut self) {
        self.shared.lock().closed = true;
    }
}

/// How the virtual host behaves.
#[derive(Debug, Clone)]
pub struct HostScript {
    /// Version reported by the firmware; `None` makes the query fail.
    pub fw_version: Option<u16>,
    /// Versions below this need an update.
    pub min_fw_version: u16,
    pub poll_rate: PollRate,
    pub fail_control: bool,
    pub fail_input: bool,
    pub fail_load: bool,
    pub fail_push: bool,
    pub fail_read_mode: bool,
    /// Commands queued by each `set_active` call.
    pub active_frames: usize,
}

impl Default for HostScript {
    fn default() -> Self {
        Self {
            fw_version: Some(0x0120),
            min_fw_version: 0x0100,
            poll_rate: PollRate::Millis(1),
            fail_control: false,
            fail_input: false,
            fail_load: false,
            fail_push: false,
            fail_read_mode: false,
            active_frames: 2,
        }
    }
}

/// A call received by [`VirtualHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    CreateControl(String),
    RemoveControl(String),
    OpenInput(String),
    CloseInput(String),
    Emit(String, usize),
    Indicators(String),
    ModeMarker(String),
    QueryVersion(String),
    LoadProfile { serial: String, validate: bool },
    ReadMode(usize),
    HardwareMode(bool),
    SetActive(bool),
    PushState,
}

/// Scriptable implementation of every host-side collaborator.
#[derive(Debug, Clone, Default)]
pub struct VirtualHost {
    script: Arc<Mutex<HostScript>>,
    calls: Arc<Mutex<Vec<HostCall>>>,
}

impl VirtualHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: HostScript) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            calls: Arc::default(),
        }
    }

    /// Edit the script in place.
    pub fn script(&self) -> MutexGuard<'_, HostScript> {
        self.script.lock()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&HostCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Bundle this host with a config, notifier and store.
    pub fn services(
        &self,
        config: Config,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn ProfileStore>,
    ) -> Services {
        let host = Arc::new(self.clone());
        Services {
            config,
            control: host.clone(),
            input: host.clone(),
            leds: host.clone(),
            firmware: host.clone(),
            lighting: host,
            notifier,
            store,
        }
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().push(call);
    }
}

impl ControlNode for VirtualHost {
    fn create(&self, device: &DeviceState) -> io::Result<()> {
        self.record(HostCall::CreateControl(device.serial().to_string()));
        if self.script.lock().fail_control {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "control node refused",
            ));
        }
        Ok(())
    }

    fn remove(&self, device: &DeviceState) {
        self.record(HostCall::RemoveControl(device.serial().to_string()));
    }
}

impl InputSubsystem for VirtualHost {
    fn open(&self, device: &DeviceState) -> io::Result<()> {
        self.record(HostCall::OpenInput(device.serial().to_string()));
        if self.script.lock().fail_input {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no input device"));
        }
        Ok(())
    }

    fn close(&self, device: &DeviceState) {
        self.record(HostCall::CloseInput(device.serial().to_string()));
    }

    fn emit(&self, serial: &str, report: &[u8]) {
        self.record(HostCall::Emit(serial.to_string(), report.len()));
    }
}

impl LedUpdater for VirtualHost {
    fn push_indicators(&self, device: &mut DeviceState) {
        self.record(HostCall::Indicators(device.serial().to_string()));
    }
}

impl Firmware for VirtualHost {
    fn query_version(
        &self,
        device: &mut DeviceState,
    ) -> std::result::Result<FirmwareInfo, TransportError> {
        self.record(HostCall::QueryVersion(device.serial().to_string()));
        if !device.is_open() {
            return Err(TransportError::Disconnected);
        }
        let script = self.script.lock();
        match script.fw_version {
            Some(version) => Ok(FirmwareInfo {
                version,
                poll_rate: script.poll_rate,
            }),
            None => Err(TransportError::Timeout),
        }
    }

    fn needs_update(&self, device: &DeviceState) -> bool {
        device.fw_version != 0 && device.fw_version < self.script.lock().min_fw_version
    }

    fn load_profile(
        &self,
        device: &mut DeviceState,
        validate: bool,
    ) -> std::result::Result<(), TransportError> {
        self.record(HostCall::LoadProfile {
            serial: device.serial().to_string(),
            validate,
        });
        if self.script.lock().fail_load {
            return Err(TransportError::Io("profile flash rejected".into()));
        }
        if validate && device.profile.current_mode >= device.profile.modes.len() {
            device.profile.current_mode = 0;
        }
        for index in 0..device.profile.modes.len() {
            let index = u8::try_from(index).unwrap_or(u8::MAX);
            device.send_now(&Message::from_slice(&[0x07, 0x14, index]))?;
        }
        Ok(())
    }

    fn write_mode_marker(&self, device: &DeviceState) {
        self.record(HostCall::ModeMarker(device.serial().to_string()));
    }
}

impl Lighting for VirtualHost {
    fn read_mode(
        &self,
        _device: &mut DeviceState,
        index: usize,
    ) -> std::result::Result<Mode, TransportError> {
        self.record(HostCall::ReadMode(index));
        if self.script.lock().fail_read_mode {
            return Err(TransportError::Timeout);
        }
        Ok(Mode {
            name: format!("Hardware {}", index + 1),
            lighting: vec![u8::try_from(index).unwrap_or(u8::MAX); 3],
        })
    }

    fn set_hardware_mode(
        &self,
        device: &mut DeviceState,
        on: bool,
    ) -> std::result::Result<(), TransportError> {
        self.record(HostCall::HardwareMode(on));
        let state = if on { 0x01 } else { 0x02 };
        device.send_now(&Message::from_slice(&[0x07, 0x04, state]))
    }

    fn set_active(&self, device: &mut DeviceState, active: bool) -> Result<()> {
        self.record(HostCall::SetActive(active));
        let frames = self.script.lock().active_frames;
        let batch = vec![Message::from_slice(&[0x07, 0x05, u8::from(active)]); frames];
        device.enqueue(&batch)
    }

    fn push_state(&self, device: &mut DeviceState) -> Result<()> {
        self.record(HostCall::PushState);
        if self.script.lock().fail_push {
            return Err(Error::Transport(TransportError::Io("frame rejected".into())));
        }
        device.send_now(&Message::from_slice(&[0x07, 0x27]))?;
        Ok(())
    }
}
