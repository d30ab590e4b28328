//! HTTP and WebSocket transport
//!
//! - **GET /ws** - WebSocket carrying the event protocol in [`crate::protocol`]
//! - **GET /room-exists/{room}** - Whether a room exists and is full
//! - **GET /turn-credentials** - Relay credentials from the configured issuer
//! - **GET /health** - Health check
//!
//! `/api/room-exists/{room}` and `/api/get-turn-credentials` are kept as
//! aliases for existing clients.

use crate::error::ClientRequestError;
use crate::protocol::{ClientEvent, ConnectionId, RoomId};
use crate::rooms::CapacityState;
use crate::state::ServerState;
use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, warn};

/// Body of `GET /room-exists/{room}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomExistsResponse {
    pub is_room_exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full: Option<bool>,
}

impl From<CapacityState> for RoomExistsResponse {
    fn from(state: CapacityState) -> Self {
        match state {
            CapacityState::NotExists => Self {
                is_room_exists: false,
                full: None,
            },
            CapacityState::Open => Self {
                is_room_exists: true,
                full: Some(false),
            },
            CapacityState::Full => Self {
                is_room_exists: true,
                full: Some(true),
            },
        }
    }
}

/// Build the application router
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade))
        .route("/room-exists/{room_id}", get(room_exists))
        .route("/api/room-exists/{room_id}", get(room_exists))
        .route("/turn-credentials", get(turn_credentials))
        .route("/api/get-turn-credentials", get(turn_credentials))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn room_exists(
    State(state): State<ServerState>,
    Path(room_id): Path<RoomId>,
) -> Json<RoomExistsResponse> {
    Json(state.gateway.room_status(&room_id).into())
}

async fn turn_credentials(State(state): State<ServerState>) -> Response {
    let Some(issuer) = state.credentials.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Relay credentials are not configured",
        )
            .into_response();
    };

    match issuer.issue().await {
        Ok(token) => Json(serde_json::json!({ "token": token })).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to issue relay credentials");
            (StatusCode::BAD_GATEWAY, "Failed to issue relay credentials").into_response()
        }
    }
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Decode one frame into an inbound event; `Ok(None)` for control frames
fn read_event(frame: Result<Message, axum::Error>) -> Result<Option<ClientEvent>, ClientRequestError> {
    match frame.map_err(|e| ClientRequestError::WebSocket(e.to_string()))? {
        Message::Text(text) => text.as_str().parse().map(Some),
        Message::Binary(_) => Err(ClientRequestError::UnsupportedType),
        Message::Close(_) => Err(ClientRequestError::Close),
        Message::Ping(_) | Message::Pong(_) => Ok(None),
    }
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let conn_id = ConnectionId::generate();
    let mut outbound = state.hub.register(conn_id.clone());
    state.gateway.connect(conn_id.clone());

    let (mut sink, mut stream) = socket.split();

    let writer_conn = conn_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(conn_id = %writer_conn, error = %e, "Failed to serialize event");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                debug!(conn_id = %writer_conn, "Socket closed while writing");
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match read_event(frame) {
            Ok(Some(event)) => {
                let name = event.name();
                if let Err(e) = state.gateway.dispatch(&conn_id, event) {
                    debug!(conn_id = %conn_id, event = name, error = %e, "Event not applied");
                }
            }
            Ok(None) => {}
            Err(e @ (ClientRequestError::Close | ClientRequestError::WebSocket(_))) => {
                debug!(conn_id = %conn_id, reason = %e, "Connection ending");
                break;
            }
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "Ignoring malformed request");
            }
        }
    }

    if let Err(e) = state.gateway.dispatch(&conn_id, ClientEvent::Disconnect) {
        debug!(conn_id = %conn_id, error = %e, "Disconnect not applied");
    }
    state.hub.unregister(&conn_id);
    if let Err(e) = writer.await {
        debug!(conn_id = %conn_id, error = %e, "Writer task ended abnormally");
    }
}
