//! SessionController: owns the connection and drives the reconnect loop.
//!
//! Each attempt walks `Connecting → Active → Draining → Backoff` and then
//! starts over. There is no terminal failure state; the loop only ends when
//! its shutdown token is canceled, and even then the active attempt is
//! drained before `run` returns.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{AttemptGate, EventBus};
use crate::channel::EventChannel;
use crate::config::SessionSettings;
use crate::event::SessionEvent;
use crate::forwarder::ForwarderTask;
use crate::transport::Connector;

/// Where the controller is in its lifecycle.
///
/// `attempt` counts opens since start, beginning at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting { attempt: u64 },
    Active { attempt: u64 },
    Draining { attempt: u64 },
    Backoff { attempt: u64 },
    Stopped,
}

enum AttemptEnd {
    /// Transport closed, errored, or never opened.
    Lost,
    /// The shutdown token fired.
    Shutdown,
}

pub struct SessionController<C: Connector> {
    connector: C,
    settings: SessionSettings,
    bus: EventBus,
    state: watch::Sender<SessionState>,
}

impl<C: Connector> SessionController<C> {
    /// Create a controller with its own event bus.
    pub fn new(connector: C, settings: SessionSettings) -> Self {
        let bus = EventBus::new(settings.bus_capacity);
        Self::with_bus(connector, settings, bus)
    }

    /// Create a controller that publishes on an existing bus.
    ///
    /// Only one running controller may use a bus; send requests are routed
    /// to whichever attempt opened the bus's request queue last.
    pub fn with_bus(connector: C, settings: SessionSettings, bus: EventBus) -> Self {
        let (state, _) = watch::channel(SessionState::Stopped);
        Self {
            connector,
            settings,
            bus,
            state,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Spawn the controller on the tokio runtime.
    pub fn start(self) -> SessionHandle {
        let shutdown = CancellationToken::new();
        let bus = self.bus.clone();
        let state = self.state.subscribe();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        SessionHandle {
            shutdown,
            task,
            bus,
            state,
        }
    }

    /// Run attempts until `shutdown` is canceled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(address = %self.settings.address, "session controller started");

        let mut attempt = 0u64;
        loop {
            attempt += 1;
            if let AttemptEnd::Shutdown = self.run_attempt(attempt, &shutdown).await {
                break;
            }

            self.set_state(SessionState::Backoff { attempt });
            debug!(
                attempt,
                backoff_ms = self.settings.reconnect_backoff.as_millis() as u64,
                "waiting before reconnect"
            );
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.reconnect_backoff) => {}
            }
        }

        self.set_state(SessionState::Stopped);
        info!("session controller stopped");
    }

    async fn run_attempt(&self, attempt: u64, shutdown: &CancellationToken) -> AttemptEnd {
        self.set_state(SessionState::Connecting { attempt });
        debug!(attempt, address = %self.settings.address, "opening transport");

        let opened = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return AttemptEnd::Shutdown,
            opened = self.connector.open(&self.settings.address) => opened,
        };
        let handle = match opened {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                warn!(attempt, error = %e, kind = e.kind(), "failed to open transport");
                self.bus.announce(SessionEvent::ConnectionLost);
                return AttemptEnd::Lost;
            }
        };

        let mut channel = EventChannel::new(handle.clone());
        let gate = Arc::new(AttemptGate::new(self.bus.clone()));
        // Open the queue before `Connected` goes out so a request issued in
        // reaction to it is not missed.
        let requests = self.bus.open_requests();

        self.set_state(SessionState::Active { attempt });
        gate.announce(SessionEvent::Connected);
        info!(attempt, "session connected");
        let forwarder = ForwarderTask::spawn(handle.clone(), requests, gate.clone());

        let end = loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break AttemptEnd::Shutdown,
                event = channel.next() => event,
            };
            match event {
                Some(SessionEvent::ConnectionLost) => gate.seal(Some(SessionEvent::ConnectionLost)),
                Some(event) => {
                    gate.announce(event);
                }
                None => break AttemptEnd::Lost,
            }
        };

        self.set_state(SessionState::Draining { attempt });
        gate.seal(None);
        self.bus.close_requests();
        forwarder.cancel().await;
        channel.close();
        drop(handle);

        match end {
            AttemptEnd::Lost => info!(attempt, "connection lost"),
            AttemptEnd::Shutdown => debug!(attempt, "attempt drained for shutdown"),
        }
        end
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }
}

/// A running controller spawned by [`SessionController::start`].
pub struct SessionHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
    bus: EventBus,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn current_state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the controller and wait for the active attempt to drain.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!("session controller panicked");
            }
        }
    }
}
