use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

use super::wire::InboundEvent;

/// Callback for one event name
pub type EventHandler = Box<dyn FnMut(&InboundEvent) + Send + 'static>;

/// Event-name to handler table. One handler per name; registering again
/// replaces the previous handler.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, EventHandler>,
    // Names whose handler is taken out and running
    in_flight: HashSet<String>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`, returning true if it replaced one
    pub fn on<F>(&mut self, event: impl Into<String>, handler: F) -> bool
    where
        F: FnMut(&InboundEvent) + Send + 'static,
    {
        self.handlers
            .insert(event.into(), Box::new(handler))
            .is_some()
    }

    /// Remove the handler for `event`, returning true if one was registered.
    ///
    /// A handler removed while it runs is not put back afterwards.
    pub fn off(&mut self, event: &str) -> bool {
        let removed = self.handlers.remove(event).is_some();
        self.in_flight.remove(event) || removed
    }

    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers.contains_key(event) || self.in_flight.contains(event)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke the handler registered for the event's name
    pub fn dispatch(&mut self, event: &InboundEvent) -> bool {
        match self.handlers.get_mut(&event.name) {
            Some(handler) => {
                handler(event);
                true
            }
            None => {
                debug!(event = %event.name, "No handler registered");
                false
            }
        }
    }

    /// Take a handler out so it can run without the table borrowed.
    pub(crate) fn take(&mut self, event: &str) -> Option<EventHandler> {
        let handler = self.handlers.remove(event)?;
        self.in_flight.insert(event.to_string());
        Some(handler)
    }

    /// Put back a handler taken with [`Dispatcher::take`], unless it was
    /// removed with `off` or replaced while it ran.
    pub(crate) fn restore(&mut self, event: &str, handler: EventHandler) {
        if self.in_flight.remove(event) {
            self.handlers.entry(event.to_string()).or_insert(handler);
        } else {
            debug!(event = %event, "Handler removed while running");
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("Dispatcher").field("events", &names).finish()
    }
}
