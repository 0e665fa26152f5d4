//! relay_session - self-healing client session over a single socket
//!
//! A [`SessionController`] owns one connection at a time. Inbound frames are
//! adapted from transport callbacks into a pull-based [`EventChannel`] and
//! relayed onto a shared [`EventBus`]; send requests published on the same
//! bus are written by a per-attempt forwarder task. When the connection is
//! lost the controller drains the attempt, waits a fixed backoff and opens a
//! fresh connection, forever, until it is stopped.
//!
//! # Example
//!
//! ```no_run
//! use relay_session::{SessionController, SessionEvent, SessionSettings, WebSocketConnector};
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = SessionSettings::new("ws://localhost:8080");
//!     let controller = SessionController::new(WebSocketConnector, settings);
//!     let mut events = controller.bus().subscribe();
//!     let session = controller.start();
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             SessionEvent::Connected => session.bus().request_send("hello"),
//!             SessionEvent::MessageReceived(payload) => println!("< {payload}"),
//!             SessionEvent::ConnectionLost => break,
//!             _ => {}
//!         }
//!     }
//!
//!     session.stop().await;
//! }
//! ```

pub mod bus;
pub mod channel;
pub mod config;
pub mod controller;
mod error;
pub mod event;
mod forwarder;
pub mod transport;


pub use bus::EventBus;
pub use channel::EventChannel;
pub use config::{ConfigOverrides, SessionFileConfig, SessionSettings, load_config};
pub use controller::{SessionController, SessionHandle, SessionState};
pub use error::SessionError;
pub use event::{Payload, SessionEvent};
pub use transport::websocket::{WebSocketConnector, WebSocketHandle};
pub use transport::{Connector, EventSink, TransportEvent, TransportHandle};
