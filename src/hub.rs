//! Room broadcast hub.
//!
//! DESIGN
//! ======
//! A single hub task owns the room-to-clients map; register, unregister, and
//! broadcast arrive as messages on the hub channel, so the map needs no lock
//! at all. Each client has a bounded outbound mailbox the hub writes with
//! `try_send`: a full mailbox means a slow consumer, and slow consumers are
//! evicted rather than ever blocking the hub.
//!
//! OWNERSHIP
//! =========
//! The hub owns the mailbox senders; each connection task owns its receiver
//! and the socket. Dropping the sender on eviction closes the mailbox, which
//! the connection's writer observes as end-of-stream.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Outbound mailbox capacity per client.
pub const MAILBOX_CAPACITY: usize = 256;

/// Hub command channel capacity.
const COMMAND_CAPACITY: usize = 256;

// =============================================================================
// WIRE EVENTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Message,
    Join,
    Leave,
}

/// A frame delivered to room members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub user_id: Uuid,
    pub username: String,
    pub content: String,
    /// ISO-8601, stamped server-side.
    pub timestamp: String,
}

impl RoomEvent {
    #[must_use]
    pub fn new(kind: EventKind, user_id: Uuid, username: &str, content: String) -> Self {
        Self { kind, user_id, username: username.to_string(), content, timestamp: now_timestamp() }
    }
}

/// Server-authoritative event timestamp.
#[must_use]
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// =============================================================================
// CLIENTS AND COMMANDS
// =============================================================================

/// A registered room member, as the hub sees it.
pub struct ClientHandle {
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    /// Bounded outbound mailbox; the hub holds the only sender.
    pub mailbox: mpsc::Sender<RoomEvent>,
}

enum Command {
    Register { room_id: Uuid, client: ClientHandle },
    Unregister { room_id: Uuid, client_id: Uuid },
    Broadcast { room_id: Uuid, event: RoomEvent },
    RoomSize { room_id: Uuid, reply: oneshot::Sender<usize> },
}

// =============================================================================
// HUB
// =============================================================================

/// Cheap-to-clone handle to the hub task.
#[derive(Clone)]
pub struct Hub {
    tx: mpsc::Sender<Command>,
}

impl Hub {
    /// Spawn the hub task. Abort the returned handle at shutdown, after the
    /// dispatch queue has drained.
    #[must_use]
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = tokio::spawn(run(rx));
        (Self { tx }, handle)
    }

    /// Add a client to a room and announce the join.
    pub async fn register(&self, room_id: Uuid, client: ClientHandle) {
        let _ = self.tx.send(Command::Register { room_id, client }).await;
    }

    /// Remove a client from a room and announce the leave.
    pub async fn unregister(&self, room_id: Uuid, client_id: Uuid) {
        let _ = self.tx.send(Command::Unregister { room_id, client_id }).await;
    }

    /// Fan an event out to every member of a room.
    pub async fn broadcast(&self, room_id: Uuid, event: RoomEvent) {
        let _ = self.tx.send(Command::Broadcast { room_id, event }).await;
    }

    /// Number of clients currently in a room. Diagnostics only.
    pub async fn room_size(&self, room_id: Uuid) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::RoomSize { room_id, reply }).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

// =============================================================================
// HUB TASK
// =============================================================================

async fn run(mut rx: mpsc::Receiver<Command>) {
    let mut rooms: HashMap<Uuid, HashMap<Uuid, ClientHandle>> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Register { room_id, client } => {
                let event =
                    RoomEvent::new(EventKind::Join, client.user_id, &client.username, format!("{} joined the room", client.username));
                info!(%room_id, client_id = %client.client_id, username = %client.username, "client joined room");
                rooms.entry(room_id).or_default().insert(client.client_id, client);
                broadcast_to_room(&mut rooms, room_id, &event);
            }
            Command::Unregister { room_id, client_id } => {
                let Some(clients) = rooms.get_mut(&room_id) else { continue };
                let Some(client) = clients.remove(&client_id) else { continue };
                if clients.is_empty() {
                    rooms.remove(&room_id);
                }
                info!(%room_id, %client_id, username = %client.username, "client left room");
                let event =
                    RoomEvent::new(EventKind::Leave, client.user_id, &client.username, format!("{} left the room", client.username));
                // Dropping the handle closes the mailbox.
                drop(client);
                broadcast_to_room(&mut rooms, room_id, &event);
            }
            Command::Broadcast { room_id, event } => {
                broadcast_to_room(&mut rooms, room_id, &event);
            }
            Command::RoomSize { room_id, reply } => {
                let _ = reply.send(rooms.get(&room_id).map_or(0, HashMap::len));
            }
        }
    }
}

/// Non-blocking fan-out; members whose mailbox is full or closed are evicted.
fn broadcast_to_room(rooms: &mut HashMap<Uuid, HashMap<Uuid, ClientHandle>>, room_id: Uuid, event: &RoomEvent) {
    let Some(clients) = rooms.get_mut(&room_id) else { return };

    let mut evicted = Vec::new();
    for (client_id, client) in clients.iter() {
        if client.mailbox.try_send(event.clone()).is_err() {
            evicted.push(*client_id);
        }
    }

    for client_id in evicted {
        if let Some(client) = clients.remove(&client_id) {
            warn!(%room_id, %client_id, username = %client.username, "evicting slow room client");
        }
    }
    if clients.is_empty() {
        rooms.remove(&room_id);
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
