use crate::event::{DeviceEvent, EventKind};
use crate::eventbus::EventListener;
use tracing::info;

/// A simple listener that logs every notification through `tracing`.
#[derive(Debug, Default)]
pub struct Logger;

impl Logger {
    pub fn new() -> Self {
        Logger
    }
}

impl EventListener for Logger {
    fn on_event(&mut self, event: &DeviceEvent) {
        match &event.kind {
            EventKind::ConnectivityChanged => info!("Connected keyboards changed"),
            EventKind::Connected { serial, name } => {
                info!(%serial, %name, "Keyboard connected")
            }
            EventKind::Disconnected { serial, name } => {
                info!(%serial, %name, "Keyboard disconnected")
            }
        }
    }
}
