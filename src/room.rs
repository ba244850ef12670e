//! Room struct definition
//!
//! Represents a named chat room holding a set of member bindings.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::ClientId;

/// A named chat room
///
/// Members are usernames bound to the connection that joined under them.
/// Usernames are unique within a room, not globally. A room with zero
/// members is removed by the registry immediately; `Room` itself never
/// outlives its last member.
#[derive(Debug)]
pub struct Room {
    /// Username -> owning connection
    members: HashMap<String, ClientId>,
    /// Room creation time
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Create a new empty room timestamped now
    pub fn new() -> Self {
        Self {
            members: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Check if a username is already present in this room
    pub fn contains_user(&self, username: &str) -> bool {
        self.members.contains_key(username)
    }

    /// Add a member binding
    ///
    /// Returns false if the username is already taken in this room;
    /// the existing binding is left untouched.
    pub fn add_member(&mut self, username: String, client_id: ClientId) -> bool {
        if self.members.contains_key(&username) {
            return false;
        }
        self.members.insert(username, client_id);
        true
    }

    /// Remove a member binding by username
    ///
    /// Returns true if the username was present and removed.
    pub fn remove_member(&mut self, username: &str) -> bool {
        self.members.remove(username).is_some()
    }

    /// Check if the room has no members left
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Get the number of members in the room
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Member usernames, sorted for deterministic listings
    pub fn member_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.members.keys().cloned().collect();
        names.sort();
        names
    }

    /// Connections of all current members
    pub fn member_channels(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.members.values().copied()
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_starts_empty() {
        let room = Room::new();
        assert!(room.is_empty());
        assert_eq!(room.member_count(), 0);
        assert!(room.member_names().is_empty());
    }

    #[test]
    fn test_add_member() {
        let mut room = Room::new();
        let id = ClientId::new();

        assert!(room.add_member("alice".to_string(), id));
        assert!(room.contains_user("alice"));
        assert_eq!(room.member_count(), 1);
        assert_eq!(room.member_names(), vec!["alice".to_string()]);
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let mut room = Room::new();
        let first = ClientId::new();
        let second = ClientId::new();

        assert!(room.add_member("alice".to_string(), first));
        assert!(!room.add_member("alice".to_string(), second));

        // Original binding untouched
        assert_eq!(room.member_count(), 1);
        assert_eq!(room.member_channels().next(), Some(first));
    }

    #[test]
    fn test_same_username_different_rooms() {
        let mut a = Room::new();
        let mut b = Room::new();
        let id = ClientId::new();

        assert!(a.add_member("alice".to_string(), id));
        assert!(b.add_member("alice".to_string(), ClientId::new()));
    }

    #[test]
    fn test_remove_member() {
        let mut room = Room::new();
        room.add_member("alice".to_string(), ClientId::new());
        room.add_member("bob".to_string(), ClientId::new());

        assert!(room.remove_member("alice"));
        assert!(!room.remove_member("alice"));
        assert_eq!(room.member_names(), vec!["bob".to_string()]);

        assert!(room.remove_member("bob"));
        assert!(room.is_empty());
    }

    #[test]
    fn test_member_names_sorted() {
        let mut room = Room::new();
        room.add_member("carol".to_string(), ClientId::new());
        room.add_member("alice".to_string(), ClientId::new());
        room.add_member("bob".to_string(), ClientId::new());

        assert_eq!(
            room.member_names(),
            vec!["alice".to_string(), "bob".to_string(), "carol".to_string()]
        );
    }
}
