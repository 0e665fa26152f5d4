//! Outbound forwarder: drains queued send requests onto the transport.
//!
//! One forwarder runs per session attempt and owns that attempt's request
//! queue (see `EventBus::open_requests`). It announces `MessageSent` before
//! calling `send`, so observers see the intent even if the write later fails.
//! Write failures are only logged here; the transport reports them through
//! its own error callback.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::bus::AttemptGate;
use crate::event::{Payload, SessionEvent};
use crate::transport::TransportHandle;

pub(crate) struct ForwarderTask {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ForwarderTask {
    /// Start forwarding requests from `requests`, which the caller must have
    /// opened before announcing `Connected`.
    pub(crate) fn spawn<H: TransportHandle>(
        handle: Arc<H>,
        requests: mpsc::UnboundedReceiver<Payload>,
        gate: Arc<AttemptGate>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(forward(handle, requests, gate, cancel.clone()));
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Cancel and wait until the task has stopped.
    ///
    /// A write already in progress completes first; no new request is taken.
    pub(crate) async fn cancel(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("forwarder task panicked");
                }
            }
        }
    }
}

impl Drop for ForwarderTask {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn forward<H: TransportHandle>(
    handle: Arc<H>,
    mut requests: mpsc::UnboundedReceiver<Payload>,
    gate: Arc<AttemptGate>,
    cancel: CancellationToken,
) {
    loop {
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(payload) => payload,
                None => break,
            },
        };

        if !gate.announce(SessionEvent::MessageSent(payload.clone())) {
            debug!("attempt already ended, dropping send request");
            break;
        }
        if let Err(e) = handle.send(payload).await {
            debug!(error = %e, kind = e.kind(), "send failed");
        }
    }
    debug!("forwarder stopped");
}
