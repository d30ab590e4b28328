//! Addressed delivery of server events to connections
//!
//! [`SignalRelay`] holds no room or user state. Every operation names its
//! destination connections explicitly and hands events to an [`Outbox`];
//! delivery is fire-and-forget.

use crate::error::SignalingError;
use crate::protocol::{ConnectionId, DirectMessage, JoinRoomErrorReason, MessagePeer, RoomId, ServerEvent};
use crate::rooms::Room;
use crate::users::UserRegistry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Sends one event to one connection
pub trait Outbox: Send + Sync {
    /// Queue `event` for `to` without waiting on the network
    fn send(&self, to: &ConnectionId, event: ServerEvent) -> Result<(), SignalingError>;
}

/// Outgoing queues of all live connections
#[derive(Default)]
pub struct ConnectionHub {
    senders: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return the receiving end of its queue
    pub fn register(&self, connection_id: ConnectionId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.write().insert(connection_id, tx);
        rx
    }

    pub fn unregister(&self, connection_id: &ConnectionId) {
        self.senders.write().remove(connection_id);
    }

    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.senders.read().contains_key(connection_id)
    }

    pub fn connection_count(&self) -> usize {
        self.senders.read().len()
    }
}

impl Outbox for ConnectionHub {
    fn send(&self, to: &ConnectionId, event: ServerEvent) -> Result<(), SignalingError> {
        let senders = self.senders.read();
        let sender = senders
            .get(to)
            .ok_or_else(|| SignalingError::SendError(format!("no connection {to}")))?;
        sender
            .send(event)
            .map_err(|_| SignalingError::SendError(format!("connection {to} closed")))
    }
}

/// Forwards signaling traffic and membership changes
#[derive(Clone)]
pub struct SignalRelay {
    outbox: Arc<dyn Outbox>,
}

impl SignalRelay {
    pub fn new(outbox: Arc<dyn Outbox>) -> Self {
        Self { outbox }
    }

    fn send(&self, to: &ConnectionId, event: ServerEvent) {
        if let Err(e) = self.outbox.send(to, event) {
            debug!(conn_id = %to, error = %e, "Dropped outbound event");
        }
    }

    fn send_to_room(&self, room: &Room, event: &ServerEvent) {
        for conn in room.connection_ids() {
            self.send(conn, event.clone());
        }
    }

    /// Tell the creator of a room its id
    pub fn send_room_id(&self, to: &ConnectionId, room_id: &RoomId) {
        self.send(
            to,
            ServerEvent::RoomId {
                room_id: room_id.clone(),
            },
        );
    }

    /// Send the full ordered membership to every member of `room`
    pub fn send_room_update(&self, room: &Room) {
        let event = ServerEvent::RoomUpdate {
            connected_users: room.members().to_vec(),
        };
        self.send_to_room(room, &event);
    }

    /// Tell an existing member that `new_connection` joined and awaits its handshake
    pub fn send_connection_prepare(&self, target: &ConnectionId, new_connection: &ConnectionId) {
        self.send(
            target,
            ServerEvent::ConnectionPrepare {
                connected_user_socket_id: new_connection.clone(),
            },
        );
    }

    /// Forward an opaque negotiation payload, tagged with its origin
    pub fn send_signal(&self, target: &ConnectionId, signal: serde_json::Value, origin: &ConnectionId) {
        self.send(
            target,
            ServerEvent::ConnectionSignal {
                signal,
                connected_user_socket_id: origin.clone(),
            },
        );
    }

    pub fn send_connection_init(&self, target: &ConnectionId, origin: &ConnectionId) {
        self.send(
            target,
            ServerEvent::ConnectionInit {
                connected_user_socket_id: origin.clone(),
            },
        );
    }

    /// Notify the remaining members of `room` that `departed` left
    pub fn send_user_disconnected(&self, room: &Room, departed: &ConnectionId) {
        let event = ServerEvent::UserDisconnected {
            socket_id: departed.clone(),
        };
        self.send_to_room(room, &event);
    }

    pub fn send_join_error(&self, to: &ConnectionId, room_id: &RoomId, reason: JoinRoomErrorReason) {
        self.send(
            to,
            ServerEvent::JoinRoomError {
                room_id: room_id.clone(),
                reason,
            },
        );
    }

    /// Deliver a text message to `receiver` and echo it to `sender`
    ///
    /// When no user is registered for `receiver` nothing is sent to either
    /// side and `ReceiverUnknown` is returned for the caller to log.
    pub fn relay_direct_message(
        &self,
        users: &UserRegistry,
        receiver: &ConnectionId,
        sender: &ConnectionId,
        content: &str,
        username: &str,
    ) -> Result<(), SignalingError> {
        if users.find_by_connection_id(receiver).is_none() {
            return Err(SignalingError::ReceiverUnknown(receiver.clone()));
        }

        self.send(
            receiver,
            ServerEvent::DirectMessage(DirectMessage {
                peer: MessagePeer::Author(sender.clone()),
                message_content: content.to_string(),
                is_author: false,
                username: username.to_string(),
            }),
        );
        self.send(
            sender,
            ServerEvent::DirectMessage(DirectMessage {
                peer: MessagePeer::Receiver(receiver.clone()),
                message_content: content.to_string(),
                is_author: true,
                username: username.to_string(),
            }),
        );
        Ok(())
    }
}
