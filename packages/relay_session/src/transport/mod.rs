//! Transport contract consumed by the session.
//!
//! - `websocket`: tokio-tungstenite implementation
//! - `memory`: scripted in-process transport for tests

use std::future::Future;
use std::sync::Arc;

use crate::error::SessionError;
use crate::event::Payload;

#[cfg(test)]
pub(crate) mod memory;
pub mod websocket;

/// Push-style notification from a live transport.
///
/// A transport fires zero or more `Message`s followed by exactly one of
/// `Closed` or `Error`.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Message(Payload),
    Closed,
    Error(SessionError),
}

/// Callback registered on a transport handle.
pub type EventSink = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Opens transport handles for an address.
pub trait Connector: Send + Sync + 'static {
    type Handle: TransportHandle;

    fn open(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Self::Handle, SessionError>> + Send;
}

/// A single open connection.
///
/// Reads are delivered through the registered sink; writes go through `send`.
pub trait TransportHandle: Send + Sync + 'static {
    /// Register the callback for inbound events, replacing any previous one.
    fn subscribe(&self, sink: EventSink);

    /// Drop the registered callback. Later events are discarded.
    fn unsubscribe(&self);

    fn send(&self, payload: Payload) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Release the connection. Must be idempotent.
    fn close(&self);
}
