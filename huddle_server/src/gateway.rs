//! Per-connection event dispatch
//!
//! [`ConnectionGateway::dispatch`] is the single entry point from the
//! transport: it maps `(connection, event)` onto a state transition, mutates
//! the registries and fans out the resulting events. One lock covers both
//! registries and the fan-out, so every event is applied atomically and each
//! connection observes events in the order they were produced.

use crate::error::SignalingError;
use crate::protocol::{
    ClientEvent, ConnectionId, CreateRoomRequest, DirectMessageRequest, InitRequest,
    JoinRoomErrorReason, JoinRoomRequest, RoomId, SignalRequest,
};
use crate::relay::SignalRelay;
use crate::rooms::{CapacityState, Departure, RoomRegistry};
use crate::users::{ConnectedUser, UserRegistry};
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Lifecycle of one connection as seen by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport established, no room yet
    Connected,
    /// Member of exactly one room
    InRoom(RoomId),
    /// Terminal; all resources released
    Disconnected,
}

#[derive(Debug)]
struct Registries {
    rooms: RoomRegistry,
    users: UserRegistry,
    live: HashSet<ConnectionId>,
}

/// Routes inbound events to the registries and the relay
pub struct ConnectionGateway {
    registries: Mutex<Registries>,
    relay: SignalRelay,
}

impl ConnectionGateway {
    pub fn new(relay: SignalRelay, room_capacity: usize) -> Self {
        Self {
            registries: Mutex::new(Registries {
                rooms: RoomRegistry::with_capacity(room_capacity),
                users: UserRegistry::new(),
                live: HashSet::new(),
            }),
            relay,
        }
    }

    /// Start tracking a freshly established connection
    pub fn connect(&self, connection_id: ConnectionId) {
        info!(conn_id = %connection_id, "User connected");
        self.registries.lock().live.insert(connection_id);
    }

    pub fn state(&self, connection_id: &ConnectionId) -> ConnectionState {
        let registries = self.registries.lock();
        if !registries.live.contains(connection_id) {
            return ConnectionState::Disconnected;
        }
        match registries.users.find_by_connection_id(connection_id) {
            Some(user) => ConnectionState::InRoom(user.room_id.clone()),
            None => ConnectionState::Connected,
        }
    }

    /// Whether a room exists and can take another member
    pub fn room_status(&self, room_id: &RoomId) -> CapacityState {
        self.registries.lock().rooms.capacity_state(room_id)
    }

    /// Snapshot of a room's members in join order
    pub fn room_members(&self, room_id: &RoomId) -> Option<Vec<ConnectedUser>> {
        self.registries
            .lock()
            .rooms
            .find(room_id)
            .map(|room| room.members().to_vec())
    }

    pub fn room_count(&self) -> usize {
        self.registries.lock().rooms.len()
    }

    pub fn user_count(&self) -> usize {
        self.registries.lock().users.len()
    }

    /// Apply one inbound event from `connection_id`
    ///
    /// Errors describe why an event was refused or dropped; they never
    /// leave the registries partially updated.
    pub fn dispatch(
        &self,
        connection_id: &ConnectionId,
        event: ClientEvent,
    ) -> Result<(), SignalingError> {
        let mut guard = self.registries.lock();
        let registries = &mut *guard;

        if !registries.live.contains(connection_id) {
            return match event {
                ClientEvent::Disconnect => Ok(()),
                _ => Err(SignalingError::ConnectionClosed(connection_id.clone())),
            };
        }

        match event {
            ClientEvent::CreateRoom(request) => self.create_room(registries, connection_id, request),
            ClientEvent::JoinRoom(request) => self.join_room(registries, connection_id, request),
            ClientEvent::Signal(request) => self.signal(registries, connection_id, request),
            ClientEvent::Init(request) => self.init(registries, connection_id, request),
            ClientEvent::DirectMessage(request) => {
                self.direct_message(registries, connection_id, request)
            }
            ClientEvent::Disconnect => {
                self.disconnect(registries, connection_id);
                Ok(())
            }
        }
    }

    fn ensure_not_in_room(
        registries: &Registries,
        connection_id: &ConnectionId,
    ) -> Result<(), SignalingError> {
        match registries.users.find_by_connection_id(connection_id) {
            Some(user) => Err(SignalingError::AlreadyInRoom(
                connection_id.clone(),
                user.room_id.clone(),
            )),
            None => Ok(()),
        }
    }

    fn create_room(
        &self,
        registries: &mut Registries,
        connection_id: &ConnectionId,
        request: CreateRoomRequest,
    ) -> Result<(), SignalingError> {
        Self::ensure_not_in_room(registries, connection_id)?;

        let room_id = registries.rooms.create_room();
        let user = ConnectedUser::new(
            connection_id.clone(),
            room_id.clone(),
            request.username,
            request.only_audio,
        );
        registries
            .users
            .register(user.clone())
            .map_err(|_| SignalingError::AlreadyInRoom(connection_id.clone(), room_id.clone()))?;
        let room = match registries.rooms.add_member(&room_id, user) {
            Ok(room) => room,
            Err(e) => {
                registries.users.remove(connection_id);
                return Err(e);
            }
        };

        info!(conn_id = %connection_id, room_id = %room_id, "Room created by user");
        self.relay.send_room_id(connection_id, &room_id);
        self.relay.send_room_update(room);
        Ok(())
    }

    fn join_room(
        &self,
        registries: &mut Registries,
        connection_id: &ConnectionId,
        request: JoinRoomRequest,
    ) -> Result<(), SignalingError> {
        Self::ensure_not_in_room(registries, connection_id)?;

        let room_id = request.room_id;
        let refusal = match registries.rooms.capacity_state(&room_id) {
            CapacityState::Open => None,
            CapacityState::NotExists => Some((
                JoinRoomErrorReason::RoomNotFound,
                SignalingError::RoomNotFound(room_id.clone()),
            )),
            CapacityState::Full => Some((
                JoinRoomErrorReason::RoomFull,
                SignalingError::RoomFull(room_id.clone()),
            )),
        };
        if let Some((reason, error)) = refusal {
            self.relay.send_join_error(connection_id, &room_id, reason);
            return Err(error);
        }

        let user = ConnectedUser::new(
            connection_id.clone(),
            room_id.clone(),
            request.username,
            request.only_audio,
        );
        registries
            .users
            .register(user.clone())
            .map_err(|_| SignalingError::AlreadyInRoom(connection_id.clone(), room_id.clone()))?;
        let room = match registries.rooms.add_member(&room_id, user) {
            Ok(room) => room,
            Err(e) => {
                registries.users.remove(connection_id);
                if let SignalingError::RoomNotFound(_) = e {
                    self.relay
                        .send_join_error(connection_id, &room_id, JoinRoomErrorReason::RoomNotFound);
                }
                return Err(e);
            }
        };

        info!(
            conn_id = %connection_id,
            room_id = %room_id,
            members = room.members().len(),
            "User joined room"
        );
        for existing in room.connection_ids().filter(|c| *c != connection_id) {
            self.relay.send_connection_prepare(existing, connection_id);
        }
        self.relay.send_room_update(room);
        Ok(())
    }

    fn signal(
        &self,
        registries: &Registries,
        connection_id: &ConnectionId,
        request: SignalRequest,
    ) -> Result<(), SignalingError> {
        if registries.users.find_by_connection_id(connection_id).is_none() {
            return Err(SignalingError::UserUnknown(connection_id.clone()));
        }
        self.relay.send_signal(
            &request.connected_user_socket_id,
            request.signal,
            connection_id,
        );
        Ok(())
    }

    fn init(
        &self,
        registries: &Registries,
        connection_id: &ConnectionId,
        request: InitRequest,
    ) -> Result<(), SignalingError> {
        if registries.users.find_by_connection_id(connection_id).is_none() {
            return Err(SignalingError::UserUnknown(connection_id.clone()));
        }
        self.relay
            .send_connection_init(&request.connected_user_socket_id, connection_id);
        Ok(())
    }

    fn direct_message(
        &self,
        registries: &Registries,
        connection_id: &ConnectionId,
        request: DirectMessageRequest,
    ) -> Result<(), SignalingError> {
        self.relay.relay_direct_message(
            &registries.users,
            &request.receiver_socket_id,
            connection_id,
            &request.message_content,
            &request.username,
        )
    }

    fn disconnect(&self, registries: &mut Registries, connection_id: &ConnectionId) {
        registries.live.remove(connection_id);
        info!(conn_id = %connection_id, "User disconnected");

        let Some(user) = registries.users.remove(connection_id) else {
            debug!(conn_id = %connection_id, "Disconnected before joining a room");
            return;
        };

        match registries.rooms.remove_member(&user.room_id, connection_id) {
            Departure::Remaining(room) => {
                self.relay.send_user_disconnected(room, connection_id);
                self.relay.send_room_update(room);
            }
            Departure::Closed => {}
            Departure::NotMember => {
                warn!(
                    conn_id = %connection_id,
                    room_id = %user.room_id,
                    "Registered user was not a member of its room"
                );
            }
        }
    }

    /// Panics if the registries break a membership invariant
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let registries = self.registries.lock();

        for user in registries.users.iter() {
            let room = registries
                .rooms
                .find(&user.room_id)
                .unwrap_or_else(|| panic!("user {} references missing room", user.connection_id));
            let entries = room
                .connection_ids()
                .filter(|c| **c == user.connection_id)
                .count();
            assert_eq!(entries, 1, "user {} listed {entries} times", user.connection_id);
            assert!(registries.live.contains(&user.connection_id));
        }

        for room in registries.rooms.iter() {
            assert!(!room.members().is_empty(), "empty room {} is observable", room.id);
            let unique: HashSet<_> = room.connection_ids().collect();
            assert_eq!(unique.len(), room.members().len(), "duplicate member in {}", room.id);
            for member in room.members() {
                let user = registries
                    .users
                    .find_by_connection_id(&member.connection_id)
                    .unwrap_or_else(|| panic!("member {} is not registered", member.connection_id));
                assert_eq!(user.room_id, room.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DirectMessage, MessagePeer, ServerEvent};
    use crate::relay::ConnectionHub;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        gateway: ConnectionGateway,
        hub: Arc<ConnectionHub>,
        inboxes: HashMap<ConnectionId, UnboundedReceiver<ServerEvent>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_capacity(crate::rooms::DEFAULT_ROOM_CAPACITY)
        }

        fn with_capacity(capacity: usize) -> Self {
            let hub = Arc::new(ConnectionHub::new());
            let gateway = ConnectionGateway::new(SignalRelay::new(hub.clone()), capacity);
            Self {
                gateway,
                hub,
                inboxes: HashMap::new(),
            }
        }

        fn connect(&mut self, name: &str) -> ConnectionId {
            let conn = ConnectionId::from(name);
            let rx = self.hub.register(conn.clone());
            self.inboxes.insert(conn.clone(), rx);
            self.gateway.connect(conn.clone());
            conn
        }

        fn send(&self, conn: &ConnectionId, event: ClientEvent) -> Result<(), SignalingError> {
            let result = self.gateway.dispatch(conn, event);
            self.gateway.assert_consistent();
            result
        }

        fn disconnect(&self, conn: &ConnectionId) {
            self.send(conn, ClientEvent::Disconnect).unwrap();
            self.hub.unregister(conn);
        }

        fn create(&mut self, name: &str) -> (ConnectionId, RoomId) {
            let conn = self.connect(name);
            self.send(
                &conn,
                ClientEvent::CreateRoom(CreateRoomRequest {
                    username: name.into(),
                    only_audio: false,
                }),
            )
            .unwrap();
            let room_id = match self.drain(&conn).first() {
                Some(ServerEvent::RoomId { room_id }) => room_id.clone(),
                other => panic!("expected room-id, got {other:?}"),
            };
            (conn, room_id)
        }

        fn join(&mut self, name: &str, room_id: &RoomId) -> ConnectionId {
            let conn = self.connect(name);
            self.send(&conn, join_request(name, room_id)).unwrap();
            conn
        }

        fn drain(&mut self, conn: &ConnectionId) -> Vec<ServerEvent> {
            let rx = self.inboxes.get_mut(conn).unwrap();
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        }

        fn drain_all(&mut self) {
            let conns: Vec<_> = self.inboxes.keys().cloned().collect();
            for conn in conns {
                self.drain(&conn);
            }
        }
    }

    fn join_request(name: &str, room_id: &RoomId) -> ClientEvent {
        ClientEvent::JoinRoom(JoinRoomRequest {
            room_id: room_id.clone(),
            username: name.into(),
            only_audio: false,
        })
    }

    fn usernames(event: &ServerEvent) -> Vec<&str> {
        match event {
            ServerEvent::RoomUpdate { connected_users } => {
                connected_users.iter().map(|u| u.username.as_str()).collect()
            }
            other => panic!("expected room-update, got {other:?}"),
        }
    }

    #[test]
    fn create_room_replies_with_id_then_update() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        h.send(
            &alice,
            ClientEvent::CreateRoom(CreateRoomRequest {
                username: "alice".into(),
                only_audio: true,
            }),
        )
        .unwrap();

        let events = h.drain(&alice);
        assert_eq!(events.len(), 2);
        let ServerEvent::RoomId { room_id } = &events[0] else {
            panic!("expected room-id first, got {:?}", events[0]);
        };
        match &events[1] {
            ServerEvent::RoomUpdate { connected_users } => {
                assert_eq!(connected_users.len(), 1);
                assert_eq!(connected_users[0].connection_id, alice);
                assert_eq!(&connected_users[0].room_id, room_id);
                assert!(connected_users[0].audio_only);
            }
            other => panic!("expected room-update, got {other:?}"),
        }

        assert_eq!(h.gateway.state(&alice), ConnectionState::InRoom(room_id.clone()));
        assert_eq!(h.gateway.room_status(room_id), CapacityState::Open);
    }

    #[test]
    fn join_prepares_existing_members_only() {
        let mut h = Harness::new();
        let (alice, room_id) = h.create("alice");
        h.drain_all();

        let bob = h.join("bob", &room_id);

        let to_alice = h.drain(&alice);
        assert_eq!(
            to_alice[0],
            ServerEvent::ConnectionPrepare {
                connected_user_socket_id: bob.clone()
            }
        );
        assert_eq!(usernames(&to_alice[1]), ["alice", "bob"]);
        assert_eq!(to_alice.len(), 2);

        let to_bob = h.drain(&bob);
        assert_eq!(to_bob.len(), 1);
        assert_eq!(usernames(&to_bob[0]), ["alice", "bob"]);
    }

    #[test]
    fn third_joiner_prepares_both_existing_members() {
        let mut h = Harness::new();
        let (alice, room_id) = h.create("alice");
        let bob = h.join("bob", &room_id);
        h.drain_all();

        let carol = h.join("carol", &room_id);
        for existing in [&alice, &bob] {
            let events = h.drain(existing);
            assert_eq!(
                events[0],
                ServerEvent::ConnectionPrepare {
                    connected_user_socket_id: carol.clone()
                }
            );
            assert_eq!(usernames(&events[1]), ["alice", "bob", "carol"]);
        }
    }

    #[test]
    fn join_missing_room_is_reported_to_caller() {
        let mut h = Harness::new();
        let bob = h.connect("bob");
        let missing = RoomId::from("missing");

        let err = h.send(&bob, join_request("bob", &missing)).unwrap_err();

        assert_eq!(err, SignalingError::RoomNotFound(missing.clone()));
        assert_eq!(
            h.drain(&bob),
            [ServerEvent::JoinRoomError {
                room_id: missing,
                reason: JoinRoomErrorReason::RoomNotFound,
            }]
        );
        assert_eq!(h.gateway.state(&bob), ConnectionState::Connected);
        assert_eq!(h.gateway.user_count(), 0);
    }

    #[test]
    fn fifth_joiner_is_refused_by_default_capacity() {
        let mut h = Harness::new();
        let (_, room_id) = h.create("a");
        h.join("b", &room_id);
        h.join("c", &room_id);
        assert_eq!(h.gateway.room_status(&room_id), CapacityState::Open);

        h.join("d", &room_id);
        assert_eq!(h.gateway.room_status(&room_id), CapacityState::Full);
        h.drain_all();

        let e = h.connect("e");
        let err = h.send(&e, join_request("e", &room_id)).unwrap_err();
        assert_eq!(err, SignalingError::RoomFull(room_id.clone()));
        assert_eq!(
            h.drain(&e),
            [ServerEvent::JoinRoomError {
                room_id: room_id.clone(),
                reason: JoinRoomErrorReason::RoomFull,
            }]
        );
        assert_eq!(h.gateway.room_members(&room_id).unwrap().len(), 4);
        assert!(h.drain(&"a".into()).is_empty());
    }

    #[test]
    fn departure_notifies_then_updates_remaining_members() {
        let mut h = Harness::new();
        let (alice, room_id) = h.create("alice");
        let bob = h.join("bob", &room_id);
        h.drain_all();

        h.disconnect(&bob);

        let events = h.drain(&alice);
        assert_eq!(
            events[0],
            ServerEvent::UserDisconnected {
                socket_id: bob.clone()
            }
        );
        assert_eq!(usernames(&events[1]), ["alice"]);
        assert_eq!(h.gateway.state(&bob), ConnectionState::Disconnected);
        assert_eq!(h.gateway.room_status(&room_id), CapacityState::Open);
    }

    #[test]
    fn last_member_leaving_deletes_room() {
        let mut h = Harness::new();
        let (alice, room_id) = h.create("alice");
        let bob = h.join("bob", &room_id);

        h.disconnect(&bob);
        h.disconnect(&alice);

        assert_eq!(h.gateway.room_status(&room_id), CapacityState::NotExists);
        assert_eq!(h.gateway.room_count(), 0);
        assert_eq!(h.gateway.user_count(), 0);
    }

    #[test]
    fn middle_member_leaving_keeps_join_order() {
        let mut h = Harness::new();
        let (alice, room_id) = h.create("alice");
        let bob = h.join("bob", &room_id);
        h.join("carol", &room_id);
        h.drain_all();

        h.disconnect(&bob);

        let events = h.drain(&alice);
        assert_eq!(usernames(&events[1]), ["alice", "carol"]);
    }

    #[test]
    fn signal_and_init_are_addressed_with_origin() {
        let mut h = Harness::new();
        let (alice, room_id) = h.create("alice");
        let bob = h.join("bob", &room_id);
        h.drain_all();

        h.send(
            &alice,
            ClientEvent::Init(InitRequest {
                connected_user_socket_id: bob.clone(),
            }),
        )
        .unwrap();
        let offer = json!({"type": "offer", "sdp": "v=0"});
        h.send(
            &bob,
            ClientEvent::Signal(SignalRequest {
                connected_user_socket_id: alice.clone(),
                signal: offer.clone(),
            }),
        )
        .unwrap();

        assert_eq!(
            h.drain(&bob),
            [ServerEvent::ConnectionInit {
                connected_user_socket_id: alice.clone()
            }]
        );
        assert_eq!(
            h.drain(&alice),
            [ServerEvent::ConnectionSignal {
                signal: offer,
                connected_user_socket_id: bob,
            }]
        );
    }

    #[test]
    fn signal_before_joining_is_ignored() {
        let mut h = Harness::new();
        let (alice, _) = h.create("alice");
        let stranger = h.connect("stranger");

        let err = h
            .send(
                &stranger,
                ClientEvent::Signal(SignalRequest {
                    connected_user_socket_id: alice.clone(),
                    signal: json!("x"),
                }),
            )
            .unwrap_err();

        assert_eq!(err, SignalingError::UserUnknown(stranger));
        assert!(h.drain(&alice).is_empty());
    }

    #[test]
    fn second_create_while_in_room_is_refused() {
        let mut h = Harness::new();
        let (alice, room_id) = h.create("alice");

        let err = h
            .send(
                &alice,
                ClientEvent::CreateRoom(CreateRoomRequest {
                    username: "alice".into(),
                    only_audio: false,
                }),
            )
            .unwrap_err();
        assert_eq!(err, SignalingError::AlreadyInRoom(alice.clone(), room_id.clone()));

        let err = h.send(&alice, join_request("alice", &room_id)).unwrap_err();
        assert!(matches!(err, SignalingError::AlreadyInRoom(..)));
        assert_eq!(h.gateway.room_count(), 1);
        assert!(h.drain(&alice).is_empty());
    }

    #[test]
    fn direct_message_reaches_receiver_and_echoes_to_author() {
        let mut h = Harness::new();
        let (alice, room_id) = h.create("alice");
        let bob = h.join("bob", &room_id);
        h.drain_all();

        h.send(
            &alice,
            ClientEvent::DirectMessage(DirectMessageRequest {
                receiver_socket_id: bob.clone(),
                message_content: "hi".into(),
                username: "alice".into(),
            }),
        )
        .unwrap();

        assert_eq!(
            h.drain(&bob),
            [ServerEvent::DirectMessage(DirectMessage {
                peer: MessagePeer::Author(alice.clone()),
                message_content: "hi".into(),
                is_author: false,
                username: "alice".into(),
            })]
        );
        assert_eq!(
            h.drain(&alice),
            [ServerEvent::DirectMessage(DirectMessage {
                peer: MessagePeer::Receiver(bob),
                message_content: "hi".into(),
                is_author: true,
                username: "alice".into(),
            })]
        );
    }

    #[test]
    fn direct_message_to_unknown_receiver_is_dropped() {
        let mut h = Harness::new();
        let (alice, _) = h.create("alice");
        h.drain_all();

        let err = h
            .send(
                &alice,
                ClientEvent::DirectMessage(DirectMessageRequest {
                    receiver_socket_id: "ghost".into(),
                    message_content: "hi".into(),
                    username: "alice".into(),
                }),
            )
            .unwrap_err();

        assert_eq!(err, SignalingError::ReceiverUnknown("ghost".into()));
        assert!(h.drain(&alice).is_empty());
    }

    #[test]
    fn events_after_disconnect_are_rejected() {
        let mut h = Harness::new();
        let alice = h.connect("alice");
        h.disconnect(&alice);

        let err = h
            .send(
                &alice,
                ClientEvent::CreateRoom(CreateRoomRequest {
                    username: "alice".into(),
                    only_audio: false,
                }),
            )
            .unwrap_err();
        assert_eq!(err, SignalingError::ConnectionClosed(alice.clone()));
        assert!(h.send(&alice, ClientEvent::Disconnect).is_ok());
        assert_eq!(h.gateway.room_count(), 0);
    }

    #[test]
    fn churn_keeps_registries_consistent() {
        let mut h = Harness::with_capacity(3);
        let (_, first) = h.create("p0");
        let (_, second) = h.create("q0");

        let mut joined = Vec::new();
        for i in 1..6 {
            for room in [&first, &second] {
                let conn = h.connect(&format!("{room}-{i}"));
                if h.send(&conn, join_request("x", room)).is_ok() {
                    joined.push(conn);
                }
            }
        }
        assert_eq!(joined.len(), 4);

        for conn in joined.iter().step_by(2) {
            h.disconnect(conn);
        }
        for conn in ["p0", "q0"] {
            h.disconnect(&conn.into());
        }
        for conn in joined.iter().skip(1).step_by(2) {
            h.disconnect(conn);
        }
        assert_eq!(h.gateway.room_count(), 0);
        assert_eq!(h.gateway.user_count(), 0);
    }
}
