use super::connection::ConnectionState;
use crate::messaging::EventRegistry;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// State shared between client handles and the driver task
pub struct ClientState {
    /// Application handlers, keyed by event name
    pub registry: EventRegistry,

    /// Latest connection state, published by the driver
    pub state_tx: watch::Sender<ConnectionState>,

    /// Driver task, taken by the first `close`
    pub driver: Mutex<Option<JoinHandle<()>>>,
}

impl ClientState {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            registry: EventRegistry::new(),
            state_tx,
            driver: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Notify state change watchers; only actual transitions wake them
    pub fn notify_state_change(&self, state: ConnectionState, connected: bool) {
        self.registry.set_connected(connected);

        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            tracing::debug!("Published connection state {:?}", state);
        }
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}
