//! Room service — discussion room CRUD and room-message persistence.
//!
//! DESIGN
//! ======
//! Rooms are plain rows; live membership is the hub's concern, not the
//! store's. Room messages are short-lived (24h) and persisted fire-and-forget
//! from the websocket path so broadcast latency never waits on the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room not found")]
    NotFound,
    #[error("only the creator may delete a room")]
    NotCreator,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub topic: String,
    pub zodiac_filter: String,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// CRUD
// =============================================================================

/// Create a discussion room.
///
/// # Errors
///
/// Storage errors only.
pub async fn create_room(
    pool: &PgPool,
    creator_id: Uuid,
    name: &str,
    topic: &str,
    zodiac_filter: &str,
) -> Result<Room, RoomError> {
    let room = sqlx::query_as::<_, Room>(
        "INSERT INTO rooms (name, topic, zodiac_filter, creator_id)
         VALUES ($1, $2, $3, $4)
         RETURNING id, name, topic, zodiac_filter, creator_id, created_at",
    )
    .bind(name)
    .bind(topic)
    .bind(zodiac_filter)
    .bind(creator_id)
    .fetch_one(pool)
    .await?;
    Ok(room)
}

/// List rooms, optionally filtered by topic or zodiac tag, newest first.
///
/// # Errors
///
/// Storage errors only.
pub async fn list_rooms(
    pool: &PgPool,
    topic: Option<&str>,
    zodiac_filter: Option<&str>,
    limit: i64,
) -> Result<Vec<Room>, RoomError> {
    let rooms = sqlx::query_as::<_, Room>(
        "SELECT id, name, topic, zodiac_filter, creator_id, created_at FROM rooms
         WHERE ($1::text IS NULL OR topic = $1)
           AND ($2::text IS NULL OR zodiac_filter = $2)
         ORDER BY created_at DESC
         LIMIT $3",
    )
    .bind(topic)
    .bind(zodiac_filter)
    .bind(limit.clamp(1, 100))
    .fetch_all(pool)
    .await?;
    Ok(rooms)
}

/// Fetch one room.
///
/// # Errors
///
/// `NotFound` when the id does not resolve.
pub async fn get_room(pool: &PgPool, room_id: Uuid) -> Result<Room, RoomError> {
    sqlx::query_as::<_, Room>(
        "SELECT id, name, topic, zodiac_filter, creator_id, created_at FROM rooms WHERE id = $1",
    )
    .bind(room_id)
    .fetch_optional(pool)
    .await?
    .ok_or(RoomError::NotFound)
}

/// Delete a room; creator only.
///
/// # Errors
///
/// `NotFound` or `NotCreator`.
pub async fn delete_room(pool: &PgPool, room_id: Uuid, user_id: Uuid) -> Result<(), RoomError> {
    let room = get_room(pool, room_id).await?;
    if room.creator_id != user_id {
        return Err(RoomError::NotCreator);
    }
    sqlx::query("DELETE FROM rooms WHERE id = $1").bind(room_id).execute(pool).await?;
    Ok(())
}

// =============================================================================
// MESSAGE PERSISTENCE
// =============================================================================

/// Persist a room message in the background. Broadcast never waits on the
/// store; a failed write is logged and lost (room history is best-effort and
/// expires in 24h regardless).
pub fn persist_message_fire_and_forget(pool: &PgPool, room_id: Uuid, user_id: Uuid, username: &str, content: &str) {
    let pool = pool.clone();
    let username = username.to_string();
    let content = content.to_string();
    tokio::spawn(async move {
        let result = sqlx::query(
            "INSERT INTO room_messages (room_id, user_id, username, content) VALUES ($1, $2, $3, $4)",
        )
        .bind(room_id)
        .bind(user_id)
        .bind(&username)
        .bind(&content)
        .execute(&pool)
        .await;
        if let Err(e) = result {
            warn!(%room_id, %user_id, error = %e, "failed to persist room message");
        }
    });
}
