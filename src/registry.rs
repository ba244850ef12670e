//! Room registry actor
//!
//! The central actor owning all mutable server state: connected peers,
//! rooms, and connection-to-room bindings. All mutations arrive as
//! commands over an mpsc channel and are processed one at a time, so
//! Join/Leave/Message/CreateRoom on the same room never interleave.
//!
//! Broadcasts are best-effort: a recipient whose outbound channel is
//! full or closed is skipped, never stalling delivery to the rest.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::message::{RoomInfo, ServerMessage};
use crate::peer::{Outbound, Peer};
use crate::room::Room;
use crate::types::{ClientId, RoomName};

/// Commands sent from connection handlers to the registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    /// New peer connected
    Connect {
        client_id: ClientId,
        sender: mpsc::Sender<Outbound>,
    },
    /// Peer disconnected (graceful or not - same cleanup)
    Disconnect { client_id: ClientId },
    /// Peer answered a liveness probe
    Pong { client_id: ClientId },
    /// Request the current room list
    ListRooms { client_id: ClientId },
    /// Create a room if it does not exist
    CreateRoom { client_id: ClientId, room: String },
    /// Join a room under a username
    Join {
        client_id: ClientId,
        room: String,
        username: String,
    },
    /// Leave a room
    Leave {
        client_id: ClientId,
        room: String,
        username: String,
    },
    /// Broadcast a chat message to the sender's room
    Message { client_id: ClientId, text: String },
    /// Liveness sweep tick: drop peers that never answered the last probe
    SweepLiveness,
}

/// The room registry actor
///
/// Owns every room and peer. Processes commands from connection handlers
/// and the liveness interval, serializing all state mutations.
pub struct Registry {
    /// All connected peers: ClientId -> Peer
    peers: HashMap<ClientId, Peer>,
    /// All active rooms: RoomName -> Room
    rooms: HashMap<RoomName, Room>,
    /// Connection to membership binding: ClientId -> (room, username)
    bindings: HashMap<ClientId, (RoomName, String)>,
    /// Command receiver channel
    receiver: mpsc::Receiver<RegistryCommand>,
}

impl Registry {
    /// Create a new registry with the given command receiver
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            peers: HashMap::new(),
            rooms: HashMap::new(),
            bindings: HashMap::new(),
            receiver,
        }
    }

    /// Run the registry event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("Registry started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("Registry shutting down");
    }

    /// Process a single command
    pub async fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Connect { client_id, sender } => {
                self.handle_connect(client_id, sender);
            }
            RegistryCommand::Disconnect { client_id } => {
                self.handle_disconnect(client_id);
            }
            RegistryCommand::Pong { client_id } => {
                if let Some(peer) = self.peers.get_mut(&client_id) {
                    peer.confirm_alive();
                }
            }
            RegistryCommand::ListRooms { client_id } => {
                self.handle_list_rooms(client_id).await;
            }
            RegistryCommand::CreateRoom { client_id, room } => {
                self.handle_create_room(client_id, room).await;
            }
            RegistryCommand::Join {
                client_id,
                room,
                username,
            } => {
                self.handle_join(client_id, room, username).await;
            }
            RegistryCommand::Leave {
                client_id,
                room,
                username,
            } => {
                self.handle_leave(client_id, room, username);
            }
            RegistryCommand::Message { client_id, text } => {
                self.handle_message(client_id, text).await;
            }
            RegistryCommand::SweepLiveness => {
                self.handle_sweep();
            }
        }
    }

    /// Handle new peer connection
    fn handle_connect(&mut self, client_id: ClientId, sender: mpsc::Sender<Outbound>) {
        info!("Peer {} connected", client_id);
        self.peers.insert(client_id, Peer::new(client_id, sender));
        debug!(
            "Total peers: {}, Total rooms: {}",
            self.peers.len(),
            self.rooms.len()
        );
    }

    /// Handle peer disconnection
    ///
    /// Ungraceful closure takes the same path as an explicit leave: the
    /// binding is removed, the room notified, and an empty room deleted.
    fn handle_disconnect(&mut self, client_id: ClientId) {
        info!("Peer {} disconnected", client_id);

        self.peers.remove(&client_id);

        if let Some((room_name, username)) = self.bindings.remove(&client_id) {
            self.remove_from_room(&room_name, &username);
        }

        debug!(
            "Total peers: {}, Total rooms: {}",
            self.peers.len(),
            self.rooms.len()
        );
    }

    /// Direct reply to one peer, ignored if it is already gone
    async fn send_to(&self, client_id: ClientId, msg: ServerMessage) {
        if let Some(peer) = self.peers.get(&client_id) {
            let _ = peer.send(msg).await;
        }
    }

    /// Handle room list request
    async fn handle_list_rooms(&self, client_id: ClientId) {
        self.send_to(
            client_id,
            ServerMessage::Rooms {
                rooms: self.room_list(),
            },
        )
        .await;
    }

    /// Handle room creation
    ///
    /// Idempotent: creating an existing room is a no-op that still answers
    /// `created_room`. Room existence is globally visible, so the room list
    /// goes out to every connected peer.
    async fn handle_create_room(&mut self, client_id: ClientId, room: String) {
        if !self.peers.contains_key(&client_id) {
            return;
        }

        let name = RoomName::new(room);
        if !name.is_valid() {
            self.send_to(client_id, RelayError::InvalidRoomName.into())
                .await;
            return;
        }

        if !self.rooms.contains_key(&name) {
            self.rooms.insert(name.clone(), Room::new());
            info!("Peer {} created room '{}'", client_id, name);
        }

        self.send_to(
            client_id,
            ServerMessage::CreatedRoom {
                room: name.to_string(),
            },
        )
        .await;

        self.broadcast_rooms();
    }

    /// Handle room joining
    async fn handle_join(&mut self, client_id: ClientId, room: String, username: String) {
        if !self.peers.contains_key(&client_id) {
            return;
        }

        let name = RoomName::new(room);
        if !name.is_valid() || username.is_empty() {
            self.send_to(
                client_id,
                ServerMessage::Error {
                    message: "Missing room or username".to_string(),
                },
            )
            .await;
            return;
        }

        // One binding per connection; a second join requires leaving first
        if self.bindings.contains_key(&client_id) {
            self.send_to(client_id, RelayError::AlreadyJoined.into())
                .await;
            return;
        }

        // Join implicitly creates the room
        let room_entry = self.rooms.entry(name.clone()).or_default();

        if !room_entry.add_member(username.clone(), client_id) {
            self.send_to(client_id, RelayError::NameTaken.into()).await;
            return;
        }

        let users = room_entry.member_names();
        self.bindings
            .insert(client_id, (name.clone(), username.clone()));

        info!("Peer {} joined room '{}' as '{}'", client_id, name, username);

        self.send_to(
            client_id,
            ServerMessage::JoinSuccess {
                room: name.to_string(),
                username: username.clone(),
                users: users.clone(),
            },
        )
        .await;

        self.broadcast_room(
            &name,
            ServerMessage::UserJoined {
                username,
                users,
                time: Utc::now().to_rfc3339(),
            },
        );

        self.broadcast_rooms();
    }

    /// Handle voluntary room leaving
    ///
    /// A no-op when the room or username is not present, mirroring the
    /// disconnect path.
    fn handle_leave(&mut self, client_id: ClientId, room: String, username: String) {
        let name = RoomName::new(room);

        let owns_binding = matches!(
            self.bindings.get(&client_id),
            Some((bound_room, bound_user)) if *bound_room == name && *bound_user == username
        );
        if !owns_binding {
            return;
        }
        self.bindings.remove(&client_id);

        info!("Peer {} left room '{}'", client_id, name);

        self.remove_from_room(&name, &username);
    }

    /// Handle chat message
    ///
    /// Requires an active binding and non-blank text. The broadcast includes
    /// the sender, whose UI renders from this authoritative echo.
    async fn handle_message(&mut self, client_id: ClientId, text: String) {
        if !self.peers.contains_key(&client_id) {
            return;
        }

        let Some((room_name, username)) = self.bindings.get(&client_id).cloned() else {
            self.send_to(client_id, RelayError::NotInRoom.into()).await;
            return;
        };

        if text.trim().is_empty() {
            self.send_to(client_id, RelayError::EmptyMessage.into())
                .await;
            return;
        }

        // Text goes out exactly as received; only the blank check trims
        self.broadcast_room(
            &room_name,
            ServerMessage::Message {
                username,
                text,
                time: Utc::now().to_rfc3339(),
            },
        );
    }

    /// Liveness sweep
    ///
    /// Peers that never answered the previous probe are forcibly dropped
    /// through the disconnect path; the rest are marked unconfirmed and
    /// probed again. A dead connection holds its room slot for at most two
    /// sweep periods.
    fn handle_sweep(&mut self) {
        let dead: Vec<ClientId> = self
            .peers
            .values()
            .filter(|p| !p.is_alive())
            .map(|p| p.id)
            .collect();

        for client_id in dead {
            warn!("Peer {} failed liveness probe, terminating", client_id);
            if let Some(peer) = self.peers.get(&client_id) {
                let _ = peer.close();
            }
            self.handle_disconnect(client_id);
        }

        for peer in self.peers.values_mut() {
            peer.mark_unconfirmed();
            if peer.probe().is_err() {
                debug!("Probe to {} failed (channel closed)", peer.id);
            }
        }
    }

    /// Helper: remove a member from a room and handle cleanup
    ///
    /// Broadcasts `user_left` to the remaining members, deletes the room
    /// when it becomes empty, then refreshes the room list globally.
    fn remove_from_room(&mut self, room_name: &RoomName, username: &str) {
        let Some(room) = self.rooms.get_mut(room_name) else {
            return;
        };

        if !room.remove_member(username) {
            return;
        }

        let users = room.member_names();

        if room.is_empty() {
            self.rooms.remove(room_name);
            debug!("Room '{}' deleted (empty)", room_name);
        } else {
            self.broadcast_room(
                room_name,
                ServerMessage::UserLeft {
                    username: username.to_string(),
                    users,
                    time: Utc::now().to_rfc3339(),
                },
            );
        }

        self.broadcast_rooms();
    }

    /// Best-effort fan-out to every member of a room
    fn broadcast_room(&self, room_name: &RoomName, msg: ServerMessage) {
        let Some(room) = self.rooms.get(room_name) else {
            return;
        };

        for client_id in room.member_channels() {
            let Some(peer) = self.peers.get(&client_id) else {
                continue;
            };
            if peer.try_send(msg.clone()).is_err() {
                warn!("Dropping broadcast to {} (channel unavailable)", client_id);
            }
        }
    }

    /// Best-effort fan-out to every connected peer
    fn broadcast_all(&self, msg: ServerMessage) {
        for peer in self.peers.values() {
            if peer.try_send(msg.clone()).is_err() {
                warn!("Dropping broadcast to {} (channel unavailable)", peer.id);
            }
        }
    }

    /// Refresh the room list on every connected peer
    fn broadcast_rooms(&self) {
        self.broadcast_all(ServerMessage::Rooms {
            rooms: self.room_list(),
        });
    }

    /// Public room list, sorted by name
    fn room_list(&self) -> Vec<RoomInfo> {
        let mut list: Vec<RoomInfo> = self
            .rooms
            .iter()
            .map(|(name, room)| RoomInfo {
                name: name.to_string(),
                users: room.member_count(),
                created_at: room.created_at.to_rfc3339(),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }
}
