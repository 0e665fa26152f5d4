use serde::Serialize;

/// Opaque message body carried over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Text(text) => f.write_str(text),
            Payload::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// Everything that travels over the shared event bus.
///
/// The controller and forwarder produce every variant except
/// `SendRequested`, which only the host application publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session attempt opened its transport.
    Connected,
    /// The current attempt ended (close, error, or failed open).
    ConnectionLost,
    MessageReceived(Payload),
    /// Announced before the payload is handed to the transport.
    MessageSent(Payload),
    /// Host request to write a payload on the current connection.
    SendRequested(Payload),
}

impl SessionEvent {
    /// Short name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Connected => "connected",
            SessionEvent::ConnectionLost => "connection_lost",
            SessionEvent::MessageReceived(_) => "message_received",
            SessionEvent::MessageSent(_) => "message_sent",
            SessionEvent::SendRequested(_) => "send_requested",
        }
    }
}
