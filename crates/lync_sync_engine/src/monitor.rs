//! Connectivity circuit breaker.

use crate::transport::RemoteTransport;
use lync_protocol::{ConnectionState, RemoteCommand};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

type Listener = Arc<dyn Fn(ConnectionState) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

struct Breaker {
    failure_count: u32,
    state: ConnectionState,
}

/// Tracks consecutive remote failures and classifies the link.
///
/// Every component that talks to the core reports outcomes here. Listeners
/// registered through [`ConnectionMonitor::on_change`] and receivers from
/// [`ConnectionMonitor::watch`] observe each state change.
///
/// Listeners are always invoked after the internal lock is released, so a
/// listener may call back into the monitor.
pub struct ConnectionMonitor {
    max_failures: u32,
    breaker: Mutex<Breaker>,
    registry: Arc<Mutex<Registry>>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionMonitor {
    /// Creates a monitor that disconnects after `max_failures` consecutive
    /// failures. A threshold of zero behaves like one.
    pub fn new(max_failures: u32) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        Self {
            max_failures: max_failures.max(1),
            breaker: Mutex::new(Breaker {
                failure_count: 0,
                state: ConnectionState::Connected,
            }),
            registry: Arc::new(Mutex::new(Registry::default())),
            state_tx,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        self.breaker.lock().state
    }

    /// Returns the number of consecutive failures.
    pub fn failure_count(&self) -> u32 {
        self.breaker.lock().failure_count
    }

    /// Returns the failure threshold.
    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    /// Returns true if the breaker considers the link down.
    pub fn is_disconnected(&self) -> bool {
        self.state() == ConnectionState::Disconnected
    }

    /// Counts one failed remote call.
    pub fn record_failure(&self) {
        let max_failures = self.max_failures;
        self.transition(|breaker| {
            breaker.failure_count = breaker.failure_count.saturating_add(1);
            breaker.state = ConnectionState::from_failures(breaker.failure_count, max_failures);
        });
    }

    /// Records a successful remote call, closing the breaker.
    pub fn record_success(&self) {
        self.transition(|breaker| {
            breaker.failure_count = 0;
            breaker.state = ConnectionState::Connected;
        });
    }

    /// Forces the breaker open regardless of the current failure count.
    pub fn force_disconnected(&self) {
        let max_failures = self.max_failures;
        self.transition(|breaker| {
            breaker.failure_count = breaker.failure_count.max(max_failures);
            breaker.state = ConnectionState::Disconnected;
        });
    }

    /// Manually retries the link with one lightweight call.
    ///
    /// The state is optimistically set to `Degraded` while the call is in
    /// flight. Success closes the breaker; any failure opens it completely.
    /// Returns true if the core answered `ok`.
    pub async fn probe<T>(&self, transport: &T, command: &RemoteCommand) -> bool
    where
        T: RemoteTransport + ?Sized,
    {
        self.transition(|breaker| breaker.state = ConnectionState::Degraded);

        let reachable = match transport.call(command).await {
            Ok(response) if response.ok => true,
            Ok(response) => {
                debug!(error = ?response.error, "probe rejected");
                false
            }
            Err(e) => {
                debug!(error = %e, "probe failed");
                false
            }
        };

        if reachable {
            self.record_success();
        } else {
            self.force_disconnected();
        }
        reachable
    }

    /// Registers a listener invoked with every new state.
    ///
    /// The listener stays registered until [`ListenerHandle::unsubscribe`]
    /// is called; dropping the handle keeps it registered.
    pub fn on_change<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.insert(id, Arc::new(listener));

        ListenerHandle {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }

    /// Returns a channel view of the state.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn transition(&self, apply: impl FnOnce(&mut Breaker)) {
        let (previous, current, failures) = {
            let mut breaker = self.breaker.lock();
            let previous = breaker.state;
            apply(&mut breaker);
            if previous != breaker.state {
                // Published under the breaker lock so the channel sees
                // transitions in the order they happened.
                self.state_tx.send_replace(breaker.state);
            }
            (previous, breaker.state, breaker.failure_count)
        };

        if previous == current {
            return;
        }

        match current {
            ConnectionState::Disconnected => {
                warn!(failures, "connection to core lost");
            }
            ConnectionState::Connected => info!("connection to core restored"),
            ConnectionState::Degraded => debug!(failures, "connection to core degraded"),
        }

        let listeners: Vec<Listener> = self.registry.lock().listeners.values().cloned().collect();
        for listener in listeners {
            listener(current);
        }
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new(3)
    }
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let breaker = self.breaker.lock();
        f.debug_struct("ConnectionMonitor")
            .field("state", &breaker.state)
            .field("failure_count", &breaker.failure_count)
            .field("max_failures", &self.max_failures)
            .finish()
    }
}

/// Deregistration handle returned by [`ConnectionMonitor::on_change`].
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl ListenerHandle {
    /// Removes the listener. Calling this more than once is harmless.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().listeners.remove(&self.id);
        }
    }

    /// Returns true while the listener is registered.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.lock().listeners.contains_key(&self.id))
    }
}
