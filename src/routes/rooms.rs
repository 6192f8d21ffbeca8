//! Room routes — CRUD plus the websocket relay.
//!
//! DESIGN
//! ======
//! On upgrade the connection splits into two cooperative tasks: a writer that
//! drains the client's hub mailbox to the socket, and a reader (this task)
//! that enriches inbound frames with the authenticated identity and a
//! server-side timestamp before submitting them to the hub. Inbound chat
//! frames are persisted fire-and-forget with a 24-hour expiry.
//!
//! LIFECYCLE
//! =========
//! 1. Validate `?token=` and the room, then upgrade.
//! 2. Register with the hub (hub announces the join).
//! 3. Relay until read error, close frame, or mailbox shutdown.
//! 4. Unregister (hub announces the leave and closes the mailbox).

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::hub::{ClientHandle, EventKind, MAILBOX_CAPACITY, RoomEvent};
use crate::jwt::TokenType;
use crate::response;
use crate::services::auth as auth_svc;
use crate::services::room as room_svc;
use crate::services::room::RoomError;
use crate::state::AppState;

fn error_response(e: RoomError) -> Response {
    match e {
        RoomError::NotFound => response::not_found("Room not found"),
        RoomError::NotCreator => response::forbidden("Only the creator may delete a room"),
        RoomError::Database(e) => {
            tracing::error!(error = %e, "room operation failed");
            response::internal_error("Room operation failed")
        }
    }
}

// =============================================================================
// REST
// =============================================================================

#[derive(Deserialize)]
pub struct CreateRoomRequest {
    name: String,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    zodiac_filter: String,
}

/// `POST /rooms`
pub async fn create_room(
    State(state): State<AppState>,
    auth: super::auth::AuthUser,
    body: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return response::bad_request("Invalid request body", None);
    };
    if req.name.trim().is_empty() {
        return response::bad_request("name is required", None);
    }

    match room_svc::create_room(&state.pool, auth.user_id, &req.name, &req.topic, &req.zodiac_filter).await {
        Ok(room) => response::created("Room created successfully", room),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct ListRoomsQuery {
    topic: Option<String>,
    zodiac: Option<String>,
    limit: Option<i64>,
}

/// `GET /rooms`
pub async fn list_rooms(
    State(state): State<AppState>,
    _auth: super::auth::AuthUser,
    Query(query): Query<ListRoomsQuery>,
) -> Response {
    match room_svc::list_rooms(&state.pool, query.topic.as_deref(), query.zodiac.as_deref(), query.limit.unwrap_or(20))
        .await
    {
        Ok(rooms) => response::success("Rooms retrieved successfully", rooms),
        Err(e) => error_response(e),
    }
}

/// `DELETE /rooms/{id}`
pub async fn delete_room(
    State(state): State<AppState>,
    auth: super::auth::AuthUser,
    Path(room_id): Path<Uuid>,
) -> Response {
    match room_svc::delete_room(&state.pool, room_id, auth.user_id).await {
        Ok(()) => response::success("Room deleted", serde_json::json!({})),
        Err(e) => error_response(e),
    }
}

// =============================================================================
// WEBSOCKET
// =============================================================================

#[derive(Deserialize)]
pub struct JoinRoomQuery {
    token: Option<String>,
}

/// `GET /rooms/{id}/ws?token=` — upgrade into the room relay.
pub async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<JoinRoomQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = query.token else {
        return response::unauthorized("token query parameter required");
    };
    let Ok(claims) = state.tokens.verify_typed(&token, TokenType::Access) else {
        return response::unauthorized("Invalid token");
    };

    if let Err(e) = room_svc::get_room(&state.pool, room_id).await {
        return error_response(e);
    }

    let username = match auth_svc::get_profile(&state.pool, claims.user_id).await {
        Ok(user) => user.display_name,
        Err(_) => return response::unauthorized("Unknown user"),
    };

    ws.on_upgrade(move |socket| run_room_socket(socket, state, room_id, claims.user_id, username))
        .into_response()
}

/// Frame accepted from clients; identity and timestamp fields are ignored and
/// restamped server-side.
#[derive(Deserialize)]
struct InboundFrame {
    #[serde(rename = "type", default = "default_kind")]
    kind: EventKind,
    #[serde(default)]
    content: String,
}

fn default_kind() -> EventKind {
    EventKind::Message
}

async fn run_room_socket(socket: WebSocket, state: AppState, room_id: Uuid, user_id: Uuid, username: String) {
    let client_id = Uuid::new_v4();
    let (mailbox_tx, mut mailbox_rx) = tokio::sync::mpsc::channel::<RoomEvent>(MAILBOX_CAPACITY);

    state
        .hub
        .register(room_id, ClientHandle { client_id, user_id, username: username.clone(), mailbox: mailbox_tx })
        .await;
    info!(%room_id, %client_id, %username, "ws: client connected");

    let (mut sink, mut stream) = socket.split();

    // Writer: drain the mailbox to the connection. Ends when the hub closes
    // the mailbox (leave or eviction) or the socket dies.
    let writer = tokio::spawn(async move {
        while let Some(event) = mailbox_rx.recv().await {
            let Ok(json) = serde_json::to_string(&event) else { continue };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Reader: enrich inbound frames and submit them to the hub.
    while let Some(message) = stream.next().await {
        let Ok(message) = message else { break };
        match message {
            Message::Text(text) => {
                let frame: InboundFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(%client_id, error = %e, "ws: invalid inbound frame");
                        continue;
                    }
                };
                if frame.content.is_empty() {
                    continue;
                }

                if frame.kind == EventKind::Message {
                    room_svc::persist_message_fire_and_forget(&state.pool, room_id, user_id, &username, &frame.content);
                }
                state
                    .hub
                    .broadcast(room_id, RoomEvent::new(frame.kind, user_id, &username, frame.content))
                    .await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.hub.unregister(room_id, client_id).await;
    // The hub dropped the mailbox sender; the writer drains and exits.
    let _ = writer.await;
    info!(%room_id, %client_id, "ws: client disconnected");
}
