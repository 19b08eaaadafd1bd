//! Setup controller.
//!
//! [`setup`] turns a freshly enumerated keyboard into an initialized
//! [`Device`]. The path taken depends on the board:
//!
//! - **No RGB**: the board is put in software mode and given placeholder
//!   lighting modes. No queue, no profile store.
//! - **RGB, firmware too old**: features are narrowed to
//!   [`FeatureSet::UPDATE_ONLY`] and the device is parked in
//!   [`Lifecycle::NeedsUpdate`]. No queue, no profile store, nothing flashed.
//! - **RGB**: the queue is allocated and the profile is restored from the
//!   store (trusted) or read off the hardware (validated), then loaded onto the
//!   board.
//!
//! On error nothing survives: the control node, input side and transport are
//! released before returning.

use crate::backends::Services;
use crate::config::Settle;
use crate::device::{Device, DeviceSkeleton, DeviceState, Lifecycle, PollRate};
use crate::error::{Error, Result};
use crate::features::{derive_features, FeatureSet, ModelClass};
use crate::metadata::DeviceIdentity;
use crate::profile::{Keymap, Mode, Profile};
use crate::teardown;
use tracing::{debug, info, warn};

/// Modes every board waiting for a firmware update is given.
const UPDATE_MODES: usize = 3;

/// Initialize a keyboard with the given vendor/product ids.
pub fn setup(
    skeleton: DeviceSkeleton,
    vendor: u16,
    product: u16,
    services: &Services,
) -> Result<Device> {
    let model = ModelClass::from_product(product);
    let features = derive_features(vendor, product, services.config.feature_mask);
    let name = skeleton
        .name
        .unwrap_or_else(|| model.default_name(features));

    let mut record = DeviceState::empty(Lifecycle::Uninitialized);
    record.identity = DeviceIdentity {
        vendor_id: vendor,
        product_id: product,
        model: Some(model),
        name,
        serial: skeleton.serial.clone(),
        path: skeleton.path,
    };
    record.features = features;
    record.transport = skeleton.transport;
    record.profile = Profile::new(skeleton.serial);

    let device = Device::new(record);
    {
        let mut state = device.lock_state();
        initialize(&device, &mut state, model, services)?;
    }
    Ok(device)
}

fn initialize(
    device: &Device,
    state: &mut DeviceState,
    model: ModelClass,
    services: &Services,
) -> Result<()> {
    if let Err(e) = services.control.create(state) {
        release_transport(state);
        return Err(Error::DevNodeFailed(e));
    }

    if let Err(e) = services.input.open(state) {
        services.control.remove(state);
        release_transport(state);
        return Err(Error::InputOpenFailed(e));
    }

    state.lifecycle = Lifecycle::Active;
    {
        let mut input = device.lock_input();
        input.open = true;
        input.serial = state.identity.serial.clone();
    }

    services.leds.push_indicators(state);

    if !state.has(FeatureSet::RGB) {
        setup_plain(state, model, services);
        return Ok(());
    }

    if let Err(e) = setup_rgb(state, model, services) {
        let mut input = device.lock_input();
        teardown::close_locked(state, &mut input, services);
        return Err(e);
    }
    Ok(())
}

fn release_transport(state: &mut DeviceState) {
    if let Some(mut transport) = state.transport.take() {
        transport.close();
    }
}

/// Board without RGB lighting.
fn setup_plain(state: &mut DeviceState, model: ModelClass, services: &Services) {
    if let Err(e) = services.lighting.set_hardware_mode(state, false) {
        warn!(serial = %state.identity.serial, error = %e, "Failed to switch to software mode");
    }
    state.active = true;
    services.firmware.write_mode_marker(state);
    state.profile.keymap = Some(Keymap::System);
    state.poll_rate = PollRate::Disabled;
    read_modes(state, model.default_modes(), services);
    state.profile.current_mode = 0;
}

fn setup_rgb(state: &mut DeviceState, model: ModelClass, services: &Services) -> Result<()> {
    let fw_known = match services.firmware.query_version(state) {
        Ok(info) => {
            state.fw_version = info.version;
            state.poll_rate = info.poll_rate;
            true
        }
        Err(e) => {
            warn!(serial = %state.identity.serial, error = %e, "Firmware version query failed");
            false
        }
    };

    if fw_known && services.firmware.needs_update(state) {
        info!(
            serial = %state.identity.serial,
            fw_version = state.fw_version,
            "Device needs a firmware update. Please issue a firmware update command."
        );
        state.features = FeatureSet::UPDATE_ONLY;
        state.active = true;
        state.lifecycle = Lifecycle::NeedsUpdate;
        state.profile.keymap = Some(Keymap::System);
        read_modes(state, UPDATE_MODES, services);
        state.profile.current_mode = 0;
        return Ok(());
    }

    state.queue.allocate(services.config.queue_capacity);

    services.config.settle(Settle::Long);
    let stored = match services.store.find(&state.identity.serial) {
        Ok(stored) => stored,
        Err(e) => {
            warn!(serial = %state.identity.serial, error = %e, "Profile lookup failed");
            None
        }
    };

    let validate = match stored {
        Some(profile) => {
            debug!(serial = %state.identity.serial, "Restoring stored profile");
            state.profile = profile;
            state.profile.keymap.get_or_insert(Keymap::System);
            if model == ModelClass::FullSize {
                read_modes(state, ModelClass::FullSize.default_modes(), services);
            }
            false
        }
        None => {
            state.profile.keymap = Some(Keymap::System);
            read_modes(state, model.default_modes(), services);
            state.profile.current_mode = 0;
            true
        }
    };

    if !fw_known {
        return Err(Error::RestoreFailed);
    }
    if let Err(e) = services.firmware.load_profile(state, validate) {
        warn!(serial = %state.identity.serial, error = %e, "Profile load failed");
        return Err(Error::RestoreFailed);
    }
    state.hw_loaded = true;

    services.config.settle(Settle::Short);
    Ok(())
}

/// Fill the profile up to `count` modes, reading each missing one off the hardware.
fn read_modes(state: &mut DeviceState, count: usize, services: &Services) {
    for index in state.profile.modes.len()..count {
        let mode = services
            .lighting
            .read_mode(state, index)
            .unwrap_or_else(|e| {
                debug!(index, error = %e, "Mode read failed, using blank mode");
                Mode::blank(index)
            });
        state.profile.modes.push(mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::{HostCall, VirtualHost, VirtualKeyboard};
    use crate::config::Config;
    use crate::eventbus::EventBus;
    use crate::features::{pids, VENDOR_ID};
    use crate::store::{MemoryProfileStore, ProfileStore};
    use std::sync::Arc;

    fn rig() -> (VirtualHost, Arc<MemoryProfileStore>, Services) {
        let host = VirtualHost::new();
        let store = Arc::new(MemoryProfileStore::new());
        let services = host.services(Config::immediate(), Arc::new(EventBus::new()), store.clone());
        (host, store, services)
    }

    #[test]
    fn rgb_full_size_without_stored_profile() {
        let (host, _store, services) = rig();
        let kb = VirtualKeyboard::new("FULL1");
        let dev = setup(kb.skeleton(), VENDOR_ID, pids::FULL_SIZE_RGB, &services).unwrap();

        let state = dev.lock_state();
        assert_eq!(state.lifecycle, Lifecycle::Active);
        assert_eq!(state.identity.name, "Corsair K95 RGB");
        assert_eq!(state.features, FeatureSet::STANDARD_RGB);
        assert_eq!(state.queue.len(), 0);
        assert_eq!(state.queue.capacity(), services.config.queue_capacity);
        assert_eq!(state.profile.keymap, Some(Keymap::System));
        assert!(state.profile.modes.len() >= 3);
        assert_eq!(state.profile.current_mode, 0);
        assert_eq!(state.profile.modes[0].name, "Hardware 1");
        assert_eq!(state.fw_version, 0x0120);
        assert!(state.hw_loaded);
        assert!(host.calls().contains(&HostCall::LoadProfile {
            serial: "FULL1".into(),
            validate: true
        }));
    }

    #[test]
    fn caller_supplied_name_is_kept() {
        let (_host, _store, services) = rig();
        let kb = VirtualKeyboard::new("N1");
        let dev = setup(
            kb.skeleton().with_name("Desk keyboard"),
            VENDOR_ID,
            pids::STANDARD_RGB,
            &services,
        )
        .unwrap();
        assert_eq!(dev.lock_state().identity.name, "Desk keyboard");
        assert_eq!(dev.lock_state().profile.modes.len(), 1);
    }

    #[test]
    fn stored_profile_is_trusted() {
        let (host, store, services) = rig();
        let mut stored = Profile::new("S9");
        stored.keymap = Some(Keymap::Named("colemak".into()));
        stored.modes = vec![Mode::blank(0)];
        store.upsert("S9", stored.clone()).unwrap();

        let kb = VirtualKeyboard::new("S9");
        let dev = setup(kb.skeleton(), VENDOR_ID, pids::STANDARD_RGB, &services).unwrap();
        assert_eq!(dev.lock_state().profile, stored);
        assert!(host.calls().contains(&HostCall::LoadProfile {
            serial: "S9".into(),
            validate: false
        }));
    }

    #[test]
    fn stored_profile_on_full_size_gets_three_modes() {
        let (_host, store, services) = rig();
        let mut stored = Profile::new("S10");
        stored.keymap = Some(Keymap::System);
        stored.modes = vec![Mode::blank(0)];
        store.upsert("S10", stored).unwrap();

        let kb = VirtualKeyboard::new("S10");
        let dev = setup(kb.skeleton(), VENDOR_ID, pids::FULL_SIZE_RGB, &services).unwrap();
        let state = dev.lock_state();
        assert_eq!(state.profile.modes.len(), 3);
        assert_eq!(state.profile.modes[0], Mode::blank(0));
        assert_eq!(state.profile.modes[1].name, "Hardware 2");
    }

    #[test]
    fn control_node_failure_leaves_nothing_behind() {
        let (host, _store, services) = rig();
        host.script().fail_control = true;
        let kb = VirtualKeyboard::new("C1");
        let err = setup(kb.skeleton(), VENDOR_ID, pids::STANDARD_RGB, &services).unwrap_err();
        assert!(matches!(err, Error::DevNodeFailed(_)));
        assert!(kb.is_closed());
        assert_eq!(host.count(|c| matches!(c, HostCall::OpenInput(_))), 0);
    }

    #[test]
    fn input_failure_removes_control_node() {
        let (host, _store, services) = rig();
        host.script().fail_input = true;
        let kb = VirtualKeyboard::new("I1");
        let err = setup(kb.skeleton(), VENDOR_ID, pids::STANDARD_RGB, &services).unwrap_err();
        assert!(matches!(err, Error::InputOpenFailed(_)));
        assert_eq!(host.count(|c| matches!(c, HostCall::RemoveControl(_))), 1);
        assert!(kb.is_closed());
    }

    #[test]
    fn unreadable_firmware_fails_restore_and_tears_down() {
        let (host, store, services) = rig();
        host.script().fw_version = None;
        let kb = VirtualKeyboard::new("F1");
        let err = setup(kb.skeleton(), VENDOR_ID, pids::STANDARD_RGB, &services).unwrap_err();
        assert!(matches!(err, Error::RestoreFailed));
        assert!(kb.is_closed());
        assert_eq!(host.count(|c| matches!(c, HostCall::RemoveControl(_))), 1);
        assert_eq!(host.count(|c| matches!(c, HostCall::LoadProfile { .. })), 0);
        // fw_version stayed 0, so nothing was stored.
        assert!(store.is_empty());
    }

    #[test]
    fn failed_load_is_restore_failure() {
        let (host, _store, services) = rig();
        host.script().fail_load = true;
        let kb = VirtualKeyboard::new("L1");
        let err = setup(kb.skeleton(), VENDOR_ID, pids::COMPACT_RGB, &services).unwrap_err();
        assert!(matches!(err, Error::RestoreFailed));
        assert!(kb.is_closed());
    }

    #[test]
    fn masked_rgb_takes_plain_path() {
        let host = VirtualHost::new();
        let config = Config::immediate().without(FeatureSet::RGB);
        let services = host.services(
            config,
            Arc::new(EventBus::new()),
            Arc::new(MemoryProfileStore::new()),
        );
        let kb = VirtualKeyboard::new("M1");
        let dev = setup(kb.skeleton(), VENDOR_ID, pids::STANDARD_RGB, &services).unwrap();
        let state = dev.lock_state();
        assert_eq!(state.identity.name, "Corsair K70");
        assert_eq!(state.poll_rate, PollRate::Disabled);
        assert!(!state.queue.is_allocated());
        assert!(host.calls().contains(&HostCall::HardwareMode(false)));
    }

    #[test]
    fn unreadable_modes_fall_back_to_blank() {
        let (host, _store, services) = rig();
        host.script().fail_read_mode = true;
        let kb = VirtualKeyboard::new("R1");
        let dev = setup(kb.skeleton(), VENDOR_ID, pids::FULL_SIZE_RGB, &services).unwrap();
        let state = dev.lock_state();
        assert_eq!(
            state.profile.modes,
            vec![Mode::blank(0), Mode::blank(1), Mode::blank(2)]
        );
    }
}
