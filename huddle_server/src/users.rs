//! Registry of connected participants, keyed by transport connection

use crate::protocol::{ConnectionId, RoomId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A participant that has created or joined a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedUser {
    pub id: UserId,
    #[serde(rename = "socketId")]
    pub connection_id: ConnectionId,
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    /// Caller-supplied display label, not sanitized
    pub username: String,
    #[serde(rename = "onlyAudio")]
    pub audio_only: bool,
}

impl ConnectedUser {
    /// Create a user with a freshly generated identity
    pub fn new(
        connection_id: ConnectionId,
        room_id: RoomId,
        username: impl Into<String>,
        audio_only: bool,
    ) -> Self {
        Self {
            id: UserId::generate(),
            connection_id,
            room_id,
            username: username.into(),
            audio_only,
        }
    }
}

/// Every registered user, at most one per connection
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: HashMap<ConnectionId, ConnectedUser>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user under its connection id
    ///
    /// Returns the user back if the connection is already registered.
    pub fn register(&mut self, user: ConnectedUser) -> Result<(), ConnectedUser> {
        if self.users.contains_key(&user.connection_id) {
            return Err(user);
        }
        self.users.insert(user.connection_id.clone(), user);
        Ok(())
    }

    pub fn find_by_connection_id(&self, connection_id: &ConnectionId) -> Option<&ConnectedUser> {
        self.users.get(connection_id)
    }

    /// Remove the user for a connection; a no-op for unknown connections
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<ConnectedUser> {
        self.users.remove(connection_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &ConnectedUser> {
        self.users.values()
    }
}
