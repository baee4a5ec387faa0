use super::BusEvent;
use crate::types::constants::LISTENER_BUFFER_SIZE;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Callback invoked with the `data` of a matching event
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync + 'static>;

struct RegistryInner {
    handlers: HashMap<BusEvent, EventHandler>,
    /// Whether logical connectivity is currently up, for late `connect` subscribers
    connected: bool,
}

/// Maps event names to exactly one handler each.
///
/// Registration replaces any previous handler for the same name. Handlers are
/// always invoked outside the lock, so a handler may register others.
pub struct EventRegistry {
    inner: Mutex<RegistryInner>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                handlers: HashMap::new(),
                connected: false,
            }),
        }
    }

    /// Registers (or replaces) the handler for `event`.
    ///
    /// A `connect` handler registered while connectivity is already up is
    /// invoked immediately, in addition to being stored.
    pub fn on(&self, event: BusEvent, handler: EventHandler) {
        let fire_now = {
            let mut inner = self.inner.lock();
            let fire_now = event.is_connect() && inner.connected;
            inner.handlers.insert(event, Arc::clone(&handler));
            fire_now
        };

        if fire_now {
            handler(Value::Null);
        }
    }

    /// Registers a handler that forwards payloads into a bounded channel
    pub fn listen(&self, event: BusEvent) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(LISTENER_BUFFER_SIZE);
        let name = event.to_string();

        self.on(
            event,
            Arc::new(move |data| {
                if let Err(e) = tx.try_send(data) {
                    tracing::warn!(
                        "Failed to deliver event '{}' to listener: {}. Receiver may be closed or full.",
                        name,
                        e
                    );
                }
            }),
        );

        rx
    }

    /// Routes an inbound event to its handler.
    ///
    /// Returns `false` if nothing was invoked. Unknown names are dropped, and
    /// the reserved `connect` name is never dispatched from the wire.
    pub fn dispatch(&self, event: &str, data: Value) -> bool {
        let event = BusEvent::parse(event);
        if event.is_connect() {
            tracing::warn!("Ignoring inbound event using the reserved name '{}'", event);
            return false;
        }

        let handler = self.inner.lock().handlers.get(&event).cloned();
        match handler {
            Some(handler) => {
                tracing::debug!("Dispatching event {}", event);
                handler(data);
                true
            }
            None => {
                tracing::debug!("No handler registered for event {}, dropping", event);
                false
            }
        }
    }

    /// Marks connectivity as up and invokes the `connect` handler, if any.
    pub fn fire_connect(&self) -> bool {
        let handler = {
            let mut inner = self.inner.lock();
            inner.connected = true;
            inner.handlers.get(&BusEvent::Connect).cloned()
        };

        match handler {
            Some(handler) => {
                handler(Value::Null);
                true
            }
            None => false,
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().connected = connected;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
