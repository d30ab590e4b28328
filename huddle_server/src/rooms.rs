//! Room lifecycle and ordered membership

use crate::error::SignalingError;
use crate::protocol::{ConnectionId, RoomId};
use crate::users::ConnectedUser;
use serde::Serialize;
use std::collections::HashMap;

/// Members a room admits unless configured otherwise
pub const DEFAULT_ROOM_CAPACITY: usize = 4;

/// A group of participants that signal with one another
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    /// Join order
    members: Vec<ConnectedUser>,
}

impl Room {
    fn new(id: RoomId) -> Self {
        Self {
            id,
            members: Vec::new(),
        }
    }

    pub fn members(&self) -> &[ConnectedUser] {
        &self.members
    }

    pub fn connection_ids(&self) -> impl Iterator<Item = &ConnectionId> {
        self.members.iter().map(|m| &m.connection_id)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connection_ids().any(|c| c == connection_id)
    }
}

/// Whether a room can take another member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityState {
    NotExists,
    Open,
    Full,
}

/// Outcome of removing a member from a room
#[derive(Debug)]
pub enum Departure<'a> {
    /// The room does not exist or the connection was not a member
    NotMember,
    /// The member left and others remain
    Remaining(&'a Room),
    /// The last member left and the room was deleted
    Closed,
}

/// Every active room
///
/// A room exists only while it has members, except between
/// [`RoomRegistry::create_room`] and the first [`RoomRegistry::add_member`]
/// inside a single gateway event.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    capacity: usize,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ROOM_CAPACITY)
    }
}

impl RoomRegistry {
    /// Create a registry with the default room capacity
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry whose rooms admit at most `capacity` members
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Allocate a fresh room with no members
    pub fn create_room(&mut self) -> RoomId {
        let mut id = RoomId::generate();
        while self.rooms.contains_key(&id) {
            id = RoomId::generate();
        }
        self.rooms.insert(id.clone(), Room::new(id.clone()));
        tracing::info!(room_id = %id, "Room created");
        id
    }

    pub fn find(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Append a member, keeping join order
    pub fn add_member(
        &mut self,
        room_id: &RoomId,
        user: ConnectedUser,
    ) -> Result<&Room, SignalingError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SignalingError::RoomNotFound(room_id.clone()))?;

        if room.contains(&user.connection_id) {
            return Err(SignalingError::AlreadyInRoom(
                user.connection_id,
                room_id.clone(),
            ));
        }

        room.members.push(user);
        Ok(room)
    }

    /// Remove a member; the room is deleted in the same step if it empties
    pub fn remove_member(&mut self, room_id: &RoomId, connection_id: &ConnectionId) -> Departure<'_> {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return Departure::NotMember;
        };

        let before = room.members.len();
        room.members.retain(|m| &m.connection_id != connection_id);
        if room.members.len() == before {
            return Departure::NotMember;
        }

        if room.members.is_empty() {
            self.rooms.remove(room_id);
            tracing::info!(room_id = %room_id, "Room closed");
            return Departure::Closed;
        }

        match self.rooms.get(room_id) {
            Some(room) => Departure::Remaining(room),
            None => Departure::Closed,
        }
    }

    /// A room is full once it holds `capacity` members
    pub fn capacity_state(&self, room_id: &RoomId) -> CapacityState {
        match self.rooms.get(room_id) {
            None => CapacityState::NotExists,
            Some(room) if room.members.len() >= self.capacity => CapacityState::Full,
            Some(_) => CapacityState::Open,
        }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }
}
