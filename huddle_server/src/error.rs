//! Error types for the signaling server

use crate::protocol::{ConnectionId, RoomId};
use thiserror::Error;

/// Errors that can occur while handling a connection's event
///
/// None of these are fatal to the process or to other connections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    /// The room a connection tried to join does not exist
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    /// The room a connection tried to join is at capacity
    #[error("Room is full: {0}")]
    RoomFull(RoomId),

    /// No user is registered for this connection
    #[error("Unknown user for connection {0}")]
    UserUnknown(ConnectionId),

    /// Direct message receiver is not registered
    #[error("Unknown receiver {0}")]
    ReceiverUnknown(ConnectionId),

    /// Connection already belongs to a room
    #[error("Connection {0} is already in room {1}")]
    AlreadyInRoom(ConnectionId, RoomId),

    /// Event arrived for a connection that has already disconnected
    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnectionId),

    /// Failed to hand a message to a connection
    #[error("Failed to send message: {0}")]
    SendError(String),
}

/// Errors from client requests
#[derive(Error, Debug)]
pub enum ClientRequestError {
    /// Connection was closed
    #[error("Connection closed")]
    Close,

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unsupported message type
    #[error("Unsupported message type")]
    UnsupportedType,

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

/// Errors from the relay credential issuer
#[derive(Error, Debug)]
pub enum CredentialError {
    /// Request to the issuer failed
    #[error("Credential request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Issuer answered with a non-success status
    #[error("Credential issuer returned status {0}")]
    Status(u16),
}
