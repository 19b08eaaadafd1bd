//! Teardown controller.
//!
//! [`close`] returns a device record to its closed state: input side shut,
//! queue storage freed, profile persisted (or discarded), transport closed,
//! control node removed, listeners notified. It is idempotent: a record that
//! never got a control node, or was already closed, is left alone.

use crate::backends::Services;
use crate::device::{Device, DeviceState, InputState, Lifecycle};
use tracing::{debug, info, warn};

/// Tear `device` down.
///
/// Takes the state lock, then the input lock, and holds both until the record
/// is closed.
pub fn close(device: &Device, services: &Services) {
    let mut state = device.lock_state();
    if !state.lifecycle.has_control_node() {
        return;
    }
    let mut input = device.lock_input();
    close_locked(&mut state, &mut input, services);
}

/// Body of [`close`], for callers already holding both locks.
pub(crate) fn close_locked(state: &mut DeviceState, input: &mut InputState, services: &Services) {
    if let Some(mut transport) = state.transport.take() {
        info!(
            name = %state.identity.name,
            serial = %state.identity.serial,
            "Disconnecting keyboard"
        );
        services.input.close(state);
        input.open = false;
        services.notifier.connectivity_changed();

        state.queue.release();

        // Unidentified devices and update-pending placeholders have nothing worth keeping.
        let placeholder = state.lifecycle == Lifecycle::NeedsUpdate && !state.hw_loaded;
        if state.fw_version == 0 || placeholder {
            debug!(serial = %state.identity.serial, "Discarding profile");
        } else if let Err(e) = services
            .store
            .upsert(&state.identity.serial, state.profile.clone())
        {
            warn!(serial = %state.identity.serial, error = %e, "Failed to store profile");
        }

        transport.close();
        services.notifier.connect_state(state, false);
    } else {
        services.notifier.connectivity_changed();
    }

    services.control.remove(state);

    *state = DeviceState::empty(Lifecycle::Closed);
    *input = InputState::default();
}
