//! WebSocket transport over tokio-tungstenite.
//!
//! The stream is split in two. A writer task owns the sink and drains the
//! frames `send` queues for it; a failed write is reported through the
//! `Error` callback. A reader task is started on `subscribe` so no frame
//! arrives before a callback is registered. `close` cancels both, even in
//! the middle of a write to a peer that stopped reading; an idle writer
//! makes a best-effort close frame.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Connector, EventSink, TransportEvent, TransportHandle};
use crate::error::SessionError;
use crate::event::Payload;

type SinkSlot = Arc<Mutex<Option<EventSink>>>;

/// Upper bound on the close handshake once the handle is closed.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens `ws://` and `wss://` connections with `connect_async`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    type Handle = WebSocketHandle;

    async fn open(&self, address: &str) -> Result<WebSocketHandle, SessionError> {
        let (stream, response) = tokio_tungstenite::connect_async(address)
            .await
            .map_err(SessionError::from_tungstenite_open)?;
        debug!(address, status = %response.status(), "websocket handshake complete");
        Ok(WebSocketHandle::new(stream))
    }
}

pub struct WebSocketHandle<S = MaybeTlsStream<TcpStream>> {
    sink: SinkSlot,
    reader: Mutex<Option<SplitStream<WebSocketStream<S>>>>,
    outbound: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
}

impl<S> WebSocketHandle<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an established stream. Must be called inside a tokio runtime.
    pub fn new(stream: WebSocketStream<S>) -> Self {
        let (write, read) = stream.split();
        let (outbound, requests) = mpsc::unbounded_channel();
        let sink: SinkSlot = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        tokio::spawn(write_loop(write, requests, sink.clone(), cancel.clone()));

        Self {
            sink,
            reader: Mutex::new(Some(read)),
            outbound,
            cancel,
        }
    }
}

impl<S> TransportHandle for WebSocketHandle<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn subscribe(&self, sink: EventSink) {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);

        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(read) = reader {
            tokio::spawn(read_loop(read, self.sink.clone(), self.cancel.clone()));
        }
    }

    fn unsubscribe(&self) {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Queue `payload` for the writer. Resolves without waiting for the
    /// peer; only a writer that has already stopped is reported here.
    async fn send(&self, payload: Payload) -> Result<(), SessionError> {
        let message = match payload {
            Payload::Text(text) => Message::Text(text.into()),
            Payload::Binary(bytes) => Message::Binary(bytes.into()),
        };
        self.outbound
            .send(message)
            .map_err(|_| SessionError::SendFailure("connection closed".into()))
    }

    fn close(&self) {
        self.cancel.cancel();
        self.reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl<S> Drop for WebSocketHandle<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn emit(slot: &SinkSlot, event: TransportEvent) {
    let sink = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
    if let Some(sink) = sink {
        sink(event);
    }
}

async fn read_loop<S>(
    mut read: SplitStream<WebSocketStream<S>>,
    sink: SinkSlot,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = read.next() => message,
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                emit(&sink, TransportEvent::Message(Payload::Text(text.to_string())));
            }
            Some(Ok(Message::Binary(bytes))) => {
                emit(&sink, TransportEvent::Message(Payload::Binary(bytes.to_vec())));
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "websocket close frame received");
                emit(&sink, TransportEvent::Closed);
                break;
            }
            // Ping/pong are answered by tungstenite itself.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "websocket read error");
                emit(
                    &sink,
                    TransportEvent::Error(SessionError::TransportFault(e.to_string())),
                );
                break;
            }
            None => {
                debug!("websocket stream ended");
                emit(&sink, TransportEvent::Closed);
                break;
            }
        }
    }
}

async fn write_loop<S>(
    mut write: SplitSink<WebSocketStream<S>, Message>,
    mut requests: mpsc::UnboundedReceiver<Message>,
    sink: SinkSlot,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if timeout(CLOSE_TIMEOUT, write.close()).await.is_err() {
                    debug!("websocket close frame timed out");
                }
                break;
            }
            request = requests.recv() => match request {
                Some(message) => message,
                None => break,
            },
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("websocket write abandoned on close");
                break;
            }
            result = write.send(message) => result,
        };
        if let Err(e) = result {
            let err = SessionError::from_tungstenite_send(e);
            warn!(error = %err, kind = err.kind(), "websocket write error");
            emit(&sink, TransportEvent::Error(err));
            break;
        }
    }
}
