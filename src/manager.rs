//! Slot table of connected keyboards.
//!
//! [`DeviceManager`] runs setup on connect, teardown on disconnect and the
//! reset sequence on [`DeviceManager::recover`]. Devices are handed out as
//! `Arc<Device>` so the input path can hold one while the manager works on it.
//! Dropping the manager disconnects every device.

use crate::backends::Services;
use crate::device::{Device, DeviceSkeleton};
use crate::error::{Error, Result};
use crate::reset;
use crate::setup::setup;
use crate::snapshot::Snapshot;
use crate::teardown;
use std::sync::Arc;
use tracing::{info, warn};

/// Fixed set of device slots plus the services every device shares.
pub struct DeviceManager {
    services: Services,
    slots: Vec<Option<Arc<Device>>>,
}

impl DeviceManager {
    /// Empty manager with `services.config.max_devices` slots.
    pub fn new(services: Services) -> Self {
        let slots = vec![None; services.config.max_devices];
        Self { services, slots }
    }

    /// Enumerate attached keyboards over HID and connect each of them.
    ///
    /// Keyboards that fail setup are logged and skipped.
    #[cfg(feature = "hid")]
    #[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
    pub fn discover(services: Services) -> Result<Self> {
        use crate::backends::hid::probe_keyboards;
        use crate::error::TransportError;

        let api = hidapi::HidApi::new().map_err(|e| TransportError::Io(e.to_string()))?;
        let api = Arc::new(parking_lot::Mutex::new(api));
        let mut manager = Self::new(services);

        let found = probe_keyboards(&api);
        info!("Discovered {} keyboard(s)", found.len());
        for probe in found {
            let serial = probe.skeleton.serial.clone();
            if let Err(e) = manager.connect(probe.skeleton, probe.vendor_id, probe.product_id) {
                warn!(%serial, error = %e, "Keyboard setup failed");
            }
        }
        Ok(manager)
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Set up a keyboard and put it in the first free slot. Returns the slot.
    pub fn connect(&mut self, skeleton: DeviceSkeleton, vendor: u16, product: u16) -> Result<usize> {
        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            if let Some(mut transport) = skeleton.transport {
                transport.close();
            }
            return Err(Error::NoFreeSlot(self.slots.len()));
        };

        let device = Arc::new(setup(skeleton, vendor, product, &self.services)?);
        {
            let state = device.lock_state();
            info!(
                slot,
                name = %state.identity.name,
                serial = %state.identity.serial,
                lifecycle = ?state.lifecycle,
                "Keyboard set up"
            );
            self.services.notifier.connectivity_changed();
            self.services.notifier.connect_state(&state, true);
        }
        self.slots[slot] = Some(device);
        Ok(slot)
    }

    /// Tear down the device in `slot` and free the slot. Empty slots are ignored.
    pub fn disconnect(&mut self, slot: usize) {
        if let Some(device) = self.slots.get_mut(slot).and_then(Option::take) {
            teardown::close(&device, &self.services);
        }
    }

    /// Reset the device in `slot`, disconnecting it if the reset fails.
    pub fn recover(&mut self, slot: usize) -> Result<()> {
        let device = self.device(slot).ok_or(Error::NotInitialized)?;

        if let Err(e) = reset::prepare_for_reset(&device, &self.services) {
            warn!(slot, error = %e, "Reset preparation failed");
        }
        if let Err(e) = reset::try_reset(&device, &self.services) {
            self.disconnect(slot);
            return Err(e);
        }
        Ok(())
    }

    pub fn disconnect_all(&mut self) {
        for slot in 0..self.slots.len() {
            self.disconnect(slot);
        }
    }

    pub fn device(&self, slot: usize) -> Option<Arc<Device>> {
        self.slots.get(slot).and_then(Clone::clone)
    }

    /// Occupied slots and their devices.
    pub fn devices(&self) -> impl Iterator<Item = (usize, &Arc<Device>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, device)| device.as_ref().map(|d| (slot, d)))
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut map = std::collections::HashMap::new();
        for (_, device) in self.devices() {
            let status = device.status();
            map.insert(status.identity.serial.clone(), status);
        }
        Snapshot(map)
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}
