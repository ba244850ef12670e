//! Room-based WebSocket chat relay
//!
//! Clients connect over a persistent WebSocket, join named rooms, and
//! exchange broadcast text messages with the other occupants. Rooms are
//! ephemeral: created on first use, deleted when the last member leaves.
//!
//! # Architecture
//! The server uses the Actor pattern with `mpsc` channels:
//! - `Registry` is the central actor owning all rooms and peers
//! - Each connection has a `handler` task communicating with the registry
//! - No locks needed - all state access goes through message passing
//! - A periodic liveness sweep drops peers that stop answering pings
//!
//! The client side is a `Session` controller: one channel at a time,
//! reconnect with exponential backoff and a one-way fallback endpoint,
//! and an outbound FIFO queue that survives disconnections.
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use chat_relay::{Registry, handle_connection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(Registry::new(cmd_rx).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let cmd_tx = cmd_tx.clone();
//!         tokio::spawn(handle_connection(stream, cmd_tx));
//!     }
//! }
//! ```

pub mod error;
pub mod handler;
pub mod message;
pub mod peer;
pub mod registry;
pub mod room;
pub mod session;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use error::{RelayError, SendError};
pub use handler::handle_connection;
pub use message::{ClientMessage, RoomInfo, ServerMessage};
pub use peer::{Outbound, Peer};
pub use registry::{Registry, RegistryCommand};
pub use room::Room;
pub use session::{Session, SessionConfig, SessionEvent, SessionHandle};
pub use transport::{Channel, Connector, TransportError, WsConnector};
pub use types::{ClientId, RoomName};
