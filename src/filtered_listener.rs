use crate::event::{DeviceEvent, EventKind};
use crate::eventbus::EventListener;

/// Forwards to `inner` only the events whose kind matches a predicate.
///
/// Unlike a bus-level [`EventFilter`](crate::eventbus::EventFilter), the
/// predicate may capture state, e.g. a set of serials that changes over time.
pub struct FilteredListener<L> {
    accepts: Box<dyn Fn(&EventKind) -> bool + Send>,
    inner: L,
    forwarded: u64,
}

impl<L: EventListener> FilteredListener<L> {
    pub fn new(accepts: impl Fn(&EventKind) -> bool + Send + 'static, inner: L) -> Self {
        Self {
            accepts: Box::new(accepts),
            inner,
            forwarded: 0,
        }
    }

    /// Events about one keyboard only. Global notifications are dropped.
    pub fn for_serial(serial: impl Into<String>, inner: L) -> Self {
        let serial = serial.into();
        Self::new(move |kind| kind.serial() == Some(serial.as_str()), inner)
    }

    /// Number of events passed to the inner listener.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<L: EventListener> EventListener for FilteredListener<L> {
    fn on_event(&mut self, event: &DeviceEvent) {
        if (self.accepts)(&event.kind) {
            self.forwarded += 1;
            self.inner.on_event(event);
        }
    }
}
