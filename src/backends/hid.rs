//! `hidapi` transport.
//!
//! Commands travel as 64-byte feature reports with report id 0. A reset closes
//! the handle and re-opens the device by path.

use crate::backends::Transport;
use crate::device::DeviceSkeleton;
use crate::error::TransportError;
use crate::features::{pids, VENDOR_ID};
use crate::queue::{Message, MSG_SIZE};
use hidapi::{HidApi, HidDevice, HidError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::ffi::CString;
use std::panic::Location;
use std::sync::Arc;
use tracing::{debug, warn};

fn io_error(e: HidError) -> TransportError {
    TransportError::Io(e.to_string())
}

pub struct HidTransport {
    api: Arc<Mutex<HidApi>>,
    path: CString,
    device: Option<HidDevice>,
}

impl HidTransport {
    /// Open the device at `path`.
    pub fn open(api: Arc<Mutex<HidApi>>, path: CString) -> Result<Self, TransportError> {
        let device = api.lock().open_path(&path).map_err(io_error)?;
        Ok(Self {
            api,
            path,
            device: Some(device),
        })
    }

    fn device(&self) -> Result<&HidDevice, TransportError> {
        self.device.as_ref().ok_or(TransportError::Disconnected)
    }
}

impl Transport for HidTransport {
    fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let mut report = [0u8; MSG_SIZE + 1];
        report[1..].copy_from_slice(message.as_bytes());
        self.device()?.send_feature_report(&report).map_err(io_error)
    }

    fn receive(&mut self) -> Result<Message, TransportError> {
        let mut report = [0u8; MSG_SIZE + 1];
        let len = self
            .device()?
            .get_feature_report(&mut report)
            .map_err(io_error)?;
        if len <= 1 {
            return Err(TransportError::Timeout);
        }
        Ok(Message::from_slice(&report[1..len]))
    }

    fn reset(&mut self, origin: &'static Location<'static>) -> Result<(), TransportError> {
        debug!(path = ?self.path, %origin, "Re-opening HID device");
        self.device = None;
        let device = self.api.lock().open_path(&self.path).map_err(io_error)?;
        self.device = Some(device);
        Ok(())
    }

    fn close(&mut self) {
        self.device = None;
    }
}

/// A keyboard found by [`probe_keyboards`], ready for setup.
#[derive(Debug)]
pub struct ProbedKeyboard {
    pub skeleton: DeviceSkeleton,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Open every supported keyboard currently attached.
///
/// Boards expose several HID interfaces; only the first one seen per serial
/// is opened. Devices that cannot be opened are skipped.
pub fn probe_keyboards(api: &Arc<Mutex<HidApi>>) -> Vec<ProbedKeyboard> {
    let candidates: Vec<_> = {
        let guard = api.lock();
        guard
            .device_list()
            .filter(|info| info.vendor_id() == VENDOR_ID && pids::ALL.contains(&info.product_id()))
            .map(|info| {
                (
                    info.path().to_owned(),
                    info.product_id(),
                    info.serial_number().unwrap_or_default().to_string(),
                    info.product_string().map(str::to_string),
                )
            })
            .collect()
    };

    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for (path, product_id, serial, product) in candidates {
        if !seen.insert(serial.clone()) {
            continue;
        }
        let path_text = path.to_string_lossy().into_owned();
        match HidTransport::open(api.clone(), path) {
            Ok(transport) => {
                let mut skeleton = DeviceSkeleton::new(serial)
                    .with_path(path_text)
                    .with_transport(transport);
                skeleton.name = product;
                found.push(ProbedKeyboard {
                    skeleton,
                    vendor_id: VENDOR_ID,
                    product_id,
                });
            }
            Err(e) => warn!(path = %path_text, error = %e, "Failed to open keyboard"),
        }
    }
    found
}
