//! Reset controller.
//!
//! A physical reset is a three step affair:
//! 1. [`prepare_for_reset`] flushes queued commands and hands lighting back to
//!    the keyboard;
//! 2. [`reset`] resets the transport and re-initializes the device;
//! 3. [`try_reset`] repeats [`reset`] until it succeeds or fails fatally
//!    (see [`Error::reset_severity`]).
//!
//! All three hold the device's state lock for their whole duration.

use crate::backends::Services;
use crate::config::Settle;
use crate::device::{Device, DeviceState, Lifecycle};
use crate::error::{Error, ResetSeverity, Result, TransportError};
use crate::features::{derive_features, FeatureSet};
use crate::profile::Keymap;
use std::panic::Location;
use tracing::{debug, error, info, warn};

fn ensure_initialized(state: &DeviceState) -> Result<()> {
    if state.lifecycle.has_control_node() {
        Ok(())
    } else {
        Err(Error::NotInitialized)
    }
}

/// Send every queued command, waiting `pause` before each one.
fn drain(state: &mut DeviceState, services: &Services, pause: Settle) -> Result<()> {
    while !state.queue.is_empty() {
        services.config.settle(pause);
        state.dequeue().map_err(Error::QueueDrainFailed)?;
    }
    Ok(())
}

/// Hand the device back to its firmware before a physical reset.
pub fn prepare_for_reset(device: &Device, services: &Services) -> Result<()> {
    let mut guard = device.lock_state();
    let state = &mut *guard;
    ensure_initialized(state)?;

    if state.lifecycle == Lifecycle::NeedsUpdate || services.firmware.needs_update(state) {
        return Ok(());
    }

    if !state.has(FeatureSet::RGB) {
        services.lighting.set_hardware_mode(state, true)?;
        return Ok(());
    }

    drain(state, services, Settle::Short)?;

    services.config.settle(Settle::Medium);
    match services.lighting.set_active(state, false) {
        Ok(()) => state.active = false,
        Err(e) => warn!(serial = %state.identity.serial, error = %e, "Failed to release lighting control"),
    }

    drain(state, services, Settle::Medium)
}

/// Reset the transport and bring the device back to where it was.
#[track_caller]
pub fn reset(device: &Device, services: &Services) -> Result<()> {
    reset_from(device, services, Location::caller())
}

fn reset_from(
    device: &Device,
    services: &Services,
    origin: &'static Location<'static>,
) -> Result<()> {
    let mut guard = device.lock_state();
    let state = &mut *guard;
    ensure_initialized(state)?;

    services.config.settle(Settle::Long);
    let transport = state
        .transport
        .as_mut()
        .ok_or(TransportError::Disconnected)?;
    transport.reset(origin)?;
    services.config.settle(Settle::Long);

    // Anything still queued was meant for the pre-reset device.
    state.queue.clear();

    if !state.has(FeatureSet::RGB) {
        return Ok(());
    }

    let info = services.firmware.query_version(state).map_err(|e| {
        debug!(serial = %state.identity.serial, error = %e, "Firmware query failed after reset");
        Error::FirmwareUnreadable
    })?;
    state.fw_version = info.version;
    state.poll_rate = info.poll_rate;

    if services.firmware.needs_update(state) {
        info!(
            serial = %state.identity.serial,
            fw_version = state.fw_version,
            "Device needs a firmware update. Please issue a firmware update command."
        );
        state.lifecycle = Lifecycle::NeedsUpdate;
        return Ok(());
    }
    if state.lifecycle == Lifecycle::NeedsUpdate {
        info!(serial = %state.identity.serial, fw_version = state.fw_version, "Firmware is up to date");
        let id = &state.identity;
        state.features = derive_features(id.vendor_id, id.product_id, services.config.feature_mask);
        if !state.queue.is_allocated() {
            state.queue.allocate(services.config.queue_capacity);
        }
        state.lifecycle = Lifecycle::Active;
    }

    let active = state.active;
    if let Err(e) = services.lighting.set_active(state, active) {
        warn!(serial = %state.identity.serial, error = %e, "Failed to restore lighting control");
    }

    let mut complete = true;
    if !state.hw_loaded {
        // Never pushed this session: the stored profile, if any, wins.
        let trusted = match services.store.find(&state.identity.serial) {
            Ok(Some(mut stored)) => {
                stored.keymap.get_or_insert(Keymap::System);
                state.profile = stored;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(serial = %state.identity.serial, error = %e, "Profile lookup failed");
                false
            }
        };
        match services.firmware.load_profile(state, !trusted) {
            Ok(()) => state.hw_loaded = true,
            Err(e) => {
                warn!(serial = %state.identity.serial, error = %e, "Profile load failed after reset");
                complete = false;
            }
        }
    }
    if let Err(e) = services.lighting.push_state(state) {
        warn!(serial = %state.identity.serial, error = %e, "Lighting push failed after reset");
        complete = false;
    }

    if complete {
        Ok(())
    } else {
        Err(Error::ResetIncomplete)
    }
}

/// Call [`reset`] until it succeeds or fails fatally.
///
/// A fatal error is returned as-is; the caller must disconnect the device.
/// There is no attempt limit.
#[track_caller]
pub fn try_reset(device: &Device, services: &Services) -> Result<()> {
    let origin = Location::caller();
    let serial = device.serial();
    info!(%serial, "Attempting reset");

    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        services.config.settle(Settle::Long);
        match reset_from(device, services, origin) {
            Ok(()) => {
                info!(%serial, attempt, "Reset success");
                return Ok(());
            }
            Err(e) => match e.reset_severity() {
                ResetSeverity::Fatal => {
                    error!(%serial, attempt, error = %e, "Reset failed. Disconnecting.");
                    return Err(e);
                }
                ResetSeverity::Transient => {
                    warn!(%serial, attempt, error = %e, "Reset attempt failed, retrying");
                }
            },
        }
    }
}
