use crate::backends::Notifier;
use crate::device::DeviceState;
use crate::event::{DeviceEvent, EventKind};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Trait for reacting to connectivity notifications.
pub trait EventListener: Send {
    fn on_event(&mut self, event: &DeviceEvent);
}

/// Determines which kinds of events a listener wants to receive.
#[derive(Debug, Clone, Copy)]
pub enum EventFilter {
    All,
    ConnectivityOnly,
    ConnectionsOnly,
    Custom(fn(&DeviceEvent) -> bool),
}

/// Metadata-wrapped listener with filters and control flags.
struct ListenerEntry {
    listener: Box<dyn EventListener>,
    enabled: bool,
    filter: EventFilter,
    tag: Option<String>, // Optional serial number
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: HashMap<u64, ListenerEntry>,
}

/// Fan-out of device notifications to registered listeners.
///
/// Listeners run on the thread that triggered the notification, with the bus
/// locked; they must not register or remove listeners from inside `on_event`.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<Listeners>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener with optional filtering and serial tag.
    pub fn add_listener(
        &self,
        listener: impl EventListener + 'static,
        filter: EventFilter,
        tag: Option<String>,
    ) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.entries.insert(
            id,
            ListenerEntry {
                listener: Box::new(listener),
                enabled: true,
                filter,
                tag,
            },
        );
        inner.next_id += 1;
        id
    }

    /// Enables a previously registered listener.
    pub fn enable(&self, id: u64) {
        if let Some(entry) = self.inner.lock().entries.get_mut(&id) {
            entry.enabled = true;
        }
    }

    /// Disables (mutes) a listener without removing it.
    pub fn disable(&self, id: u64) {
        if let Some(entry) = self.inner.lock().entries.get_mut(&id) {
            entry.enabled = false;
        }
    }

    /// Unregisters a listener entirely.
    pub fn remove_listener(&self, id: u64) {
        self.inner.lock().entries.remove(&id);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Emits one event to all active and matching listeners.
    pub fn emit(&self, event: &DeviceEvent) {
        let mut inner = self.inner.lock();
        for entry in inner.entries.values_mut() {
            if !entry.enabled {
                continue;
            }

            // Tagged listeners only hear about their own keyboard, plus global events.
            if let (Some(wanted), Some(serial)) = (entry.tag.as_deref(), event.kind.serial()) {
                if wanted != serial {
                    continue;
                }
            }

            let passes_filter = match entry.filter {
                EventFilter::All => true,
                EventFilter::ConnectivityOnly => {
                    matches!(event.kind, EventKind::ConnectivityChanged)
                }
                EventFilter::ConnectionsOnly => matches!(
                    event.kind,
                    EventKind::Connected { .. } | EventKind::Disconnected { .. }
                ),
                EventFilter::Custom(f) => f(event),
            };

            if passes_filter {
                entry.listener.on_event(event);
            }
        }
    }
}

impl Notifier for EventBus {
    fn connectivity_changed(&self) {
        self.emit(&DeviceEvent::now(EventKind::ConnectivityChanged));
    }

    fn connect_state(&self, device: &DeviceState, connected: bool) {
        let serial = device.identity.serial.clone();
        let name = device.identity.name.clone();
        let kind = if connected {
            EventKind::Connected { serial, name }
        } else {
            EventKind::Disconnected { serial, name }
        };
        self.emit(&DeviceEvent::now(kind));
    }
}
