//! Error types for the chat relay
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// business errors (send error message to client). None of the
/// business errors are ever fatal to the server process.
#[derive(Debug, Error)]
pub enum RelayError {
    /// WebSocket protocol error (fatal for the one connection)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal for the one connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Username already present in the target room
    #[error("Username already in use in this room")]
    NameTaken,

    /// Connection already holds a room binding
    #[error("Already in a room; leave first")]
    AlreadyJoined,

    /// Message sent without an active room binding
    #[error("You are not in a room")]
    NotInRoom,

    /// Message text is empty after trimming whitespace
    #[error("Empty message")]
    EmptyMessage,

    /// Room name missing or empty
    #[error("Invalid room name")]
    InvalidRoomName,
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
