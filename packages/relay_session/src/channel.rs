//! Event channel: push callbacks in, pull-based session events out.
//!
//! The transport callback feeds an unbounded queue. A close or error pushes
//! `ConnectionLost` and drops the queue's sender, which is the end-of-stream
//! signal. Callbacks that fire after that are ignored.

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::event::SessionEvent;
use crate::transport::{EventSink, TransportEvent, TransportHandle};

pub struct EventChannel<H: TransportHandle> {
    handle: Arc<H>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    closed: bool,
}

impl<H: TransportHandle> EventChannel<H> {
    /// Register on `handle` and start queueing its events.
    pub fn new(handle: Arc<H>) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let slot = Mutex::new(Some(tx));

        let sink: EventSink = Arc::new(move |event| {
            let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            match event {
                TransportEvent::Message(payload) => {
                    if let Some(tx) = slot.as_ref() {
                        let _ = tx.send(SessionEvent::MessageReceived(payload));
                    }
                }
                TransportEvent::Closed => {
                    if let Some(tx) = slot.take() {
                        debug!("transport closed");
                        let _ = tx.send(SessionEvent::ConnectionLost);
                    }
                }
                TransportEvent::Error(err) => {
                    if let Some(tx) = slot.take() {
                        debug!(error = %err, kind = err.kind(), "transport errored");
                        let _ = tx.send(SessionEvent::ConnectionLost);
                    }
                }
            }
        });
        handle.subscribe(sink);

        Self {
            handle,
            events,
            closed: false,
        }
    }

    /// Next event, or `None` at end-of-stream or after `close`.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        if self.closed {
            return None;
        }
        self.events.recv().await
    }

    /// Unregister from the transport and close it. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.handle.unsubscribe();
        self.events.close();
        self.handle.close();
    }
}

impl<H: TransportHandle> Stream for EventChannel<H> {
    type Item = SessionEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(None);
        }
        this.events.poll_recv(cx)
    }
}

impl<H: TransportHandle> Drop for EventChannel<H> {
    fn drop(&mut self) {
        self.close();
    }
}
