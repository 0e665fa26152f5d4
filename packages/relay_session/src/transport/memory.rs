//! Scripted in-process transport.
//!
//! `MemoryConnector` hands out `MemoryHandle`s to the session and the
//! matching `MemoryPeer`s to the test through `MemoryRemote`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{Connector, EventSink, TransportEvent, TransportHandle};
use crate::error::SessionError;
use crate::event::Payload;

struct Shared {
    failing_opens: AtomicUsize,
    hang_opens: AtomicBool,
    opens: Mutex<Vec<Instant>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

pub(crate) struct MemoryConnector {
    shared: Arc<Shared>,
}

/// Test-side control over a `MemoryConnector`.
pub(crate) struct MemoryRemote {
    shared: Arc<Shared>,
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

pub(crate) fn memory_transport() -> (MemoryConnector, MemoryRemote) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        failing_opens: AtomicUsize::new(0),
        hang_opens: AtomicBool::new(false),
        opens: Mutex::new(Vec::new()),
        peers: tx,
    });
    (
        MemoryConnector {
            shared: shared.clone(),
        },
        MemoryRemote { shared, peers: rx },
    )
}

impl MemoryRemote {
    /// Make the next `count` opens fail.
    pub(crate) fn fail_opens(&self, count: usize) {
        self.shared.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Make every open hang until the caller gives up on it.
    pub(crate) fn hang_opens(&self) {
        self.shared.hang_opens.store(true, Ordering::SeqCst);
    }

    /// Wait for the next successful open.
    pub(crate) async fn next_peer(&mut self) -> MemoryPeer {
        self.peers.recv().await.expect("connector dropped")
    }

    /// Times at which `open` was called, successful or not.
    pub(crate) fn open_times(&self) -> Vec<Instant> {
        self.shared
            .opens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.open_times().len()
    }
}

impl Connector for MemoryConnector {
    type Handle = MemoryHandle;

    async fn open(&self, address: &str) -> Result<MemoryHandle, SessionError> {
        self.shared
            .opens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Instant::now());

        if self.shared.hang_opens.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let fail = self
            .shared
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(SessionError::OpenFailure(format!("{address} refused")));
        }

        let (handle, peer) = link();
        let _ = self.shared.peers.send(peer);
        Ok(handle)
    }
}

struct Link {
    sink: Mutex<Option<EventSink>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    fail_sends: AtomicBool,
    send_delay: Mutex<Option<Duration>>,
    sent: mpsc::UnboundedSender<Payload>,
}

fn link() -> (MemoryHandle, MemoryPeer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let link = Arc::new(Link {
        sink: Mutex::new(None),
        closed: AtomicBool::new(false),
        close_calls: AtomicUsize::new(0),
        fail_sends: AtomicBool::new(false),
        send_delay: Mutex::new(None),
        sent: tx,
    });
    (
        MemoryHandle { link: link.clone() },
        MemoryPeer { link, sent: rx },
    )
}

pub(crate) struct MemoryHandle {
    link: Arc<Link>,
}

impl TransportHandle for MemoryHandle {
    fn subscribe(&self, sink: EventSink) {
        *self.link.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    fn unsubscribe(&self) {
        self.link
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    async fn send(&self, payload: Payload) -> Result<(), SessionError> {
        if self.link.closed.load(Ordering::SeqCst) {
            return Err(SessionError::SendFailure("handle closed".into()));
        }
        if self.link.fail_sends.load(Ordering::SeqCst) {
            return Err(SessionError::SendFailure("write rejected".into()));
        }
        let delay = *self
            .link
            .send_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.link
            .sent
            .send(payload)
            .map_err(|_| SessionError::SendFailure("peer gone".into()))
    }

    fn close(&self) {
        self.link.close_calls.fetch_add(1, Ordering::SeqCst);
        self.link.closed.store(true, Ordering::SeqCst);
    }
}

/// Far end of one memory connection.
pub(crate) struct MemoryPeer {
    link: Arc<Link>,
    sent: mpsc::UnboundedReceiver<Payload>,
}

impl MemoryPeer {
    /// Invoke the registered callback, if any.
    pub(crate) fn fire(&self, event: TransportEvent) {
        let sink = self
            .link
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }

    pub(crate) fn deliver(&self, payload: impl Into<Payload>) {
        self.fire(TransportEvent::Message(payload.into()));
    }

    pub(crate) fn close(&self) {
        self.fire(TransportEvent::Closed);
    }

    pub(crate) fn error(&self, reason: &str) {
        self.fire(TransportEvent::Error(SessionError::TransportFault(
            reason.to_string(),
        )));
    }

    pub(crate) fn fail_sends(&self) {
        self.link.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Make every write take `delay` before it lands.
    pub(crate) fn delay_sends(&self, delay: Duration) {
        *self
            .link
            .send_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }

    /// Wait for the next payload the session wrote.
    pub(crate) async fn next_sent(&mut self) -> Payload {
        self.sent.recv().await.expect("link holds a sender")
    }

    pub(crate) fn try_sent(&mut self) -> Option<Payload> {
        self.sent.try_recv().ok()
    }

    /// Whether the session called `close()` on its handle.
    pub(crate) fn is_closed(&self) -> bool {
        self.link.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.link.close_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        self.link
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
