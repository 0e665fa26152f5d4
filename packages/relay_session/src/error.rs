//! Error taxonomy for a session attempt.
//!
//! Every variant ends the current attempt and sends the controller through
//! draining, backoff and reconnect. None of them reach the host application.

use tokio_tungstenite::tungstenite;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The transport could not be established.
    #[error("failed to open transport: {0}")]
    OpenFailure(String),

    /// The transport closed or errored while the session was active.
    #[error("transport fault: {0}")]
    TransportFault(String),

    /// A write failed after the session was already active.
    #[error("send failed: {0}")]
    SendFailure(String),
}

impl SessionError {
    /// Stable machine-readable code, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OpenFailure(_) => "open_failure",
            Self::TransportFault(_) => "transport_fault",
            Self::SendFailure(_) => "send_failure",
        }
    }

    /// Classify a tungstenite error raised while connecting.
    ///
    /// Handshake and I/O errors before the socket is up are open failures.
    /// A connection that was already closed is reported as a transport fault.
    pub fn from_tungstenite_open(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::TransportFault(err.to_string())
            }
            other => Self::OpenFailure(other.to_string()),
        }
    }

    /// Classify a tungstenite error raised by a write on a live socket.
    pub fn from_tungstenite_send(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::TransportFault(err.to_string())
            }
            other => Self::SendFailure(other.to_string()),
        }
    }
}
