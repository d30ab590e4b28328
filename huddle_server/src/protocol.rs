//! Wire protocol spoken over each WebSocket connection
//!
//! Every frame is a JSON object of the form `{"event": "<name>", "data": {...}}`.
//!
//! Inbound (client → server):
//! - `create-new-room` `{username, onlyAudio}`
//! - `join-room` `{roomId, username, onlyAudio}`
//! - `connection-signal` `{connectedUserSocketId, signal}`
//! - `connection-init` `{connectedUserSocketId}`
//! - `direct-message` `{receiverSocketId, messageContent, username}`
//!
//! Outbound (server → client):
//! - `room-id` `{roomId}`
//! - `room-update` `{connectedUsers}`
//! - `connection-prepare` `{connectedUserSocketId}`
//! - `connection-signal` `{signal, connectedUserSocketId}`
//! - `connection-init` `{connectedUserSocketId}`
//! - `user-disconnected` `{socketId}`
//! - `direct-message` `{authorSocketId | receiverSocketId, messageContent, isAuthor, username}`
//! - `join-room-error` `{roomId, reason}`
//!
//! The `signal` payload is opaque and forwarded unchanged.

use crate::error::ClientRequestError;
use crate::users::ConnectedUser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random identifier
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Borrow the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Room identifier
    RoomId
);
string_id!(
    /// Participant identity, distinct from the transport connection
    UserId
);
string_id!(
    /// Identity of one live transport connection; the addressing unit for relay
    ConnectionId
);

/// Payload of `create-new-room`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub username: String,
    #[serde(default)]
    pub only_audio: bool,
}

/// Payload of `join-room`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_id: RoomId,
    pub username: String,
    #[serde(default)]
    pub only_audio: bool,
}

/// Payload of an inbound `connection-signal`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRequest {
    pub connected_user_socket_id: ConnectionId,
    pub signal: serde_json::Value,
}

/// Payload of an inbound `connection-init`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub connected_user_socket_id: ConnectionId,
}

/// Payload of an inbound `direct-message`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessageRequest {
    pub receiver_socket_id: ConnectionId,
    pub message_content: String,
    pub username: String,
}

/// Events a connection can deliver to the gateway
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    CreateRoom(CreateRoomRequest),
    JoinRoom(JoinRoomRequest),
    Signal(SignalRequest),
    Init(InitRequest),
    DirectMessage(DirectMessageRequest),
    /// Raised by the transport when the connection ends; never read off the wire
    Disconnect,
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl FromStr for ClientEvent {
    type Err = ClientRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let RawFrame { event, data } = serde_json::from_str(s)?;
        let event = match event.as_str() {
            "create-new-room" => Self::CreateRoom(serde_json::from_value(data)?),
            "join-room" => Self::JoinRoom(serde_json::from_value(data)?),
            "connection-signal" => Self::Signal(serde_json::from_value(data)?),
            "connection-init" => Self::Init(serde_json::from_value(data)?),
            "direct-message" => Self::DirectMessage(serde_json::from_value(data)?),
            _ => return Err(ClientRequestError::UnsupportedType),
        };
        Ok(event)
    }
}

impl ClientEvent {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateRoom(_) => "create-new-room",
            Self::JoinRoom(_) => "join-room",
            Self::Signal(_) => "connection-signal",
            Self::Init(_) => "connection-init",
            Self::DirectMessage(_) => "direct-message",
            Self::Disconnect => "disconnect",
        }
    }
}

/// The other end of a direct message, from the point of view of the recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagePeer {
    /// Set on the copy delivered to the receiver
    #[serde(rename = "authorSocketId")]
    Author(ConnectionId),
    /// Set on the copy echoed back to the author
    #[serde(rename = "receiverSocketId")]
    Receiver(ConnectionId),
}

/// Outbound `direct-message` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    #[serde(flatten)]
    pub peer: MessagePeer,
    pub message_content: String,
    pub is_author: bool,
    pub username: String,
}

/// Why a `join-room` was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinRoomErrorReason {
    RoomNotFound,
    RoomFull,
}

/// Events the server delivers to a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    RoomId {
        room_id: RoomId,
    },
    RoomUpdate {
        connected_users: Vec<ConnectedUser>,
    },
    ConnectionPrepare {
        connected_user_socket_id: ConnectionId,
    },
    ConnectionSignal {
        signal: serde_json::Value,
        connected_user_socket_id: ConnectionId,
    },
    ConnectionInit {
        connected_user_socket_id: ConnectionId,
    },
    UserDisconnected {
        socket_id: ConnectionId,
    },
    DirectMessage(DirectMessage),
    JoinRoomError {
        room_id: RoomId,
        reason: JoinRoomErrorReason,
    },
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl FromStr for ServerEvent {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}
