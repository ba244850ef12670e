//! Connected peer handle
//!
//! Represents one connected client on the server side: its identity,
//! outbound channel, and liveness flag for the probe sweep.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ClientId;

/// Frames queued for a peer's write task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A protocol message to serialize and send as a text frame
    Frame(ServerMessage),
    /// WebSocket-level liveness probe
    Ping,
    /// Close the connection from the server side
    Close,
}

/// Connected peer information
///
/// Holds the outbound channel to the peer's write task and the liveness
/// flag consulted by the probe sweep. Room membership is tracked by the
/// registry, not here.
#[derive(Debug)]
pub struct Peer {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Registry → write-task channel
    sender: mpsc::Sender<Outbound>,
    /// Cleared by each sweep, set again by the peer's pong
    alive: bool,
}

impl Peer {
    /// Create a new peer with the given ID and outbound channel
    pub fn new(id: ClientId, sender: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            sender,
            alive: true,
        }
    }

    /// Send a frame to this peer, waiting for channel capacity
    ///
    /// Used for direct replies to the requester. Returns an error if the
    /// channel is closed (peer disconnected).
    pub async fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender
            .send(Outbound::Frame(msg))
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Best-effort, non-blocking send used by broadcasts
    ///
    /// A full or closed channel fails immediately instead of stalling
    /// delivery to other recipients.
    pub fn try_send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender
            .try_send(Outbound::Frame(msg))
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Queue a liveness probe
    pub fn probe(&self) -> Result<(), SendError> {
        self.sender
            .try_send(Outbound::Ping)
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Ask the write task to close the connection
    pub fn close(&self) -> Result<(), SendError> {
        self.sender
            .try_send(Outbound::Close)
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Did this peer confirm liveness since the last sweep?
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Mark unconfirmed; the next pong must set it again
    pub fn mark_unconfirmed(&mut self) {
        self.alive = false;
    }

    /// Record a pong from this peer
    pub fn confirm_alive(&mut self) {
        self.alive = true;
    }
}
