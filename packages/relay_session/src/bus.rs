//! Shared event bus between the session and the host application.
//!
//! - `EventBus`: broadcast fan-out the host subscribes to and publishes
//!   send requests on
//! - `AttemptGate`: per-attempt guard sealed by `ConnectionLost`
//!
//! Send requests are announced like every other event and are also routed
//! to a separate queue owned by the active attempt, so a burst of
//! announcements can never evict them from the broadcast ring.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use crate::event::{Payload, SessionEvent};

/// Default number of events a lagging subscriber may fall behind by.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    requests: Arc<Mutex<Option<mpsc::UnboundedSender<Payload>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            requests: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribe to every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    ///
    /// A `SendRequested` is also queued for the active attempt, after the
    /// announcement so observers see it before the matching `MessageSent`.
    pub fn announce(&self, event: SessionEvent) {
        trace!(event = event.name(), "announce");
        let requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let queued = match (&event, requests.as_ref()) {
            (SessionEvent::SendRequested(payload), Some(queue)) => {
                Some((queue, payload.clone()))
            }
            _ => None,
        };
        let _ = self.tx.send(event);
        if let Some((queue, payload)) = queued {
            let _ = queue.send(payload);
        }
    }

    /// Ask the active session to write `payload`.
    ///
    /// Dropped if no attempt is active (during Connecting or Backoff).
    pub fn request_send(&self, payload: impl Into<Payload>) {
        self.announce(SessionEvent::SendRequested(payload.into()));
    }

    /// Route send requests to a fresh queue, replacing any previous one.
    pub(crate) fn open_requests(&self) -> mpsc::UnboundedReceiver<Payload> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.requests.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    /// Stop routing send requests. Later requests are only announced.
    pub(crate) fn close_requests(&self) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Announcement guard for a single session attempt.
///
/// The controller's relay and the forwarder both publish through the gate.
/// Sealing happens under the same lock as publishing, so once the terminal
/// event is out nothing else from this attempt can follow it.
pub(crate) struct AttemptGate {
    bus: EventBus,
    open: Mutex<bool>,
}

impl AttemptGate {
    pub(crate) fn new(bus: EventBus) -> Self {
        Self {
            bus,
            open: Mutex::new(true),
        }
    }

    /// Publish `event` if the attempt is still live. Returns whether it was.
    pub(crate) fn announce(&self, event: SessionEvent) -> bool {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return false;
        }
        self.bus.announce(event);
        true
    }

    /// Close the gate, publishing `terminal` first if it was still open.
    pub(crate) fn seal(&self, terminal: Option<SessionEvent>) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return;
        }
        if let Some(event) = terminal {
            self.bus.announce(event);
        }
        *open = false;
    }
}
