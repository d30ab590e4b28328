//! Room-based signaling server for WebRTC peer-to-peer sessions
//!
//! Clients meet in a room, learn each other's connection ids and exchange
//! opaque negotiation payloads (offers, answers, candidates) through the
//! server, which only routes them. Participants can also send each other
//! short text messages.
//!
//! # Protocol
//!
//! Each client holds one WebSocket on **GET /ws**. Frames are JSON objects
//! `{"event": "<name>", "data": {...}}`; see [`protocol`] for the events.
//!
//! A typical session:
//!
//! 1. Alice sends `create-new-room` and receives `room-id` and `room-update`.
//! 2. Bob checks **GET /room-exists/{room}**, then sends `join-room`.
//! 3. Alice receives `connection-prepare` naming Bob and replies with
//!    `connection-init`; both then trade `connection-signal` payloads.
//! 4. When Bob's socket closes Alice receives `user-disconnected` and a
//!    fresh `room-update`. The room is deleted once its last member leaves.
//!
//! # Example
//!
//! ```bash
//! # Start the server
//! PORT=8000 huddle-signaling
//!
//! # Check a room
//! curl http://127.0.0.1:8000/room-exists/<room-id>
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod protocol;
pub mod relay;
pub mod rooms;
pub mod state;
pub mod users;

pub use config::Config;
pub use error::{ClientRequestError, CredentialError, SignalingError};
pub use gateway::{ConnectionGateway, ConnectionState};
pub use handler::{RoomExistsResponse, router};
pub use protocol::{ClientEvent, ConnectionId, RoomId, ServerEvent, UserId};
pub use state::ServerState;
