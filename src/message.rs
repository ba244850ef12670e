//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization. Frame shapes match the
//! wire protocol exactly: ISO-8601 string timestamps, `createdAt` key
//! in room listings.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Client → Server message
///
/// All messages from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request the current room list
    ListRooms,
    /// Create a room if it does not exist (idempotent)
    CreateRoom { room: String },
    /// Join a room under a username (creates the room if absent)
    Join { room: String, username: String },
    /// Leave a room
    Leave { room: String, username: String },
    /// Send a chat message to the currently joined room
    Message { text: String },
}

/// Public view of one room, as reported by `rooms`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub name: String,
    /// Current member count
    pub users: usize,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// Server → Client message
///
/// All messages from server to client. Uses tagged enum with snake_case naming.
/// `time` fields are ISO-8601 strings assigned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full room list (sent on request and broadcast on any change)
    Rooms { rooms: Vec<RoomInfo> },
    /// Room creation acknowledged (also sent when the room already existed)
    CreatedRoom { room: String },
    /// Join rejected (duplicate username, or already bound elsewhere)
    JoinFailed { message: String },
    /// Join succeeded; `users` is the full member list including the joiner
    JoinSuccess {
        room: String,
        username: String,
        users: Vec<String>,
    },
    /// A user joined the room the recipient is in
    UserJoined {
        username: String,
        users: Vec<String>,
        time: String,
    },
    /// A user left the room the recipient is in
    UserLeft {
        username: String,
        users: Vec<String>,
        time: String,
    },
    /// Chat message broadcast to a room, sender included
    Message {
        username: String,
        text: String,
        time: String,
    },
    /// Non-fatal error reported to the requester only
    Error { message: String },
}

/// Convert RelayError to ServerMessage for client notification
///
/// Join rejections map to `join_failed`; other business errors map to
/// `error`. Fatal errors are not converted (the connection closes).
impl From<RelayError> for ServerMessage {
    fn from(err: RelayError) -> Self {
        match &err {
            RelayError::NameTaken => ServerMessage::JoinFailed {
                message: err.to_string(),
            },
            RelayError::AlreadyJoined
            | RelayError::NotInRoom
            | RelayError::EmptyMessage
            | RelayError::InvalidRoomName => ServerMessage::Error {
                message: err.to_string(),
            },
            _ => ServerMessage::Error {
                message: "Internal error".to_string(),
            },
        }
    }
}
