//! Friendship service — requests, acceptance, and the adjacency graph.
//!
//! DESIGN
//! ======
//! Each user owns one adjacency row: accepted friends plus pending-sent and
//! pending-received sets. Accepting a request is a bidirectional two-row
//! mutation and runs in a single transaction together with the request status
//! flip and both `friends_count` increments. The status flip is guarded on
//! `PENDING`, so a concurrent duplicate accept loses the race and observes
//! not-found instead of double-counting.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FriendshipError {
    #[error("already friends")]
    AlreadyFriends,
    #[error("friend request not found")]
    RequestNotFound,
    #[error("not the receiver of this request")]
    NotReceiver,
    #[error("cannot befriend yourself")]
    SelfRequest,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Relationship between two users, as seen from the asking side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FriendStatus {
    #[serde(rename = "ARE_FRIENDS")]
    AreFriends,
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "NOT_FRIENDS")]
    NotFriends,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct FriendRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: String,
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Send a friend request and mark it pending on both adjacency rows.
///
/// # Errors
///
/// `SelfRequest`, `AlreadyFriends`, or storage errors.
pub async fn send_request(pool: &PgPool, sender_id: Uuid, target_id: Uuid) -> Result<FriendRequest, FriendshipError> {
    if sender_id == target_id {
        return Err(FriendshipError::SelfRequest);
    }
    if are_friends(pool, sender_id, target_id).await? {
        return Err(FriendshipError::AlreadyFriends);
    }

    let mut tx = pool.begin().await?;

    ensure_row(&mut tx, sender_id).await?;
    ensure_row(&mut tx, target_id).await?;

    let request = sqlx::query_as::<_, FriendRequest>(
        "INSERT INTO friend_requests (sender_id, receiver_id)
         VALUES ($1, $2)
         RETURNING id, sender_id, receiver_id, status",
    )
    .bind(sender_id)
    .bind(target_id)
    .fetch_one(&mut *tx)
    .await?;

    add_to_set(&mut tx, sender_id, "pending_sent", target_id).await?;
    add_to_set(&mut tx, target_id, "pending_received", sender_id).await?;

    tx.commit().await?;
    Ok(request)
}

/// Accept a friend request. The whole mutation is one transaction; each
/// party's friend set gains the other and both counters move by exactly one.
///
/// # Errors
///
/// `RequestNotFound` when the id is unknown or the request already resolved
/// (including a lost race), `NotReceiver` when the caller did not receive it.
pub async fn accept_request(pool: &PgPool, request_id: Uuid, user_id: Uuid) -> Result<(), FriendshipError> {
    let mut tx = pool.begin().await?;

    let request = sqlx::query_as::<_, FriendRequest>(
        "SELECT id, sender_id, receiver_id, status FROM friend_requests WHERE id = $1",
    )
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(FriendshipError::RequestNotFound)?;

    if request.receiver_id != user_id {
        return Err(FriendshipError::NotReceiver);
    }

    // Guarded flip: a concurrent accept already consumed the request.
    let flipped = sqlx::query(
        "UPDATE friend_requests SET status = 'ACCEPTED', updated_at = now()
         WHERE id = $1 AND status = 'PENDING'",
    )
    .bind(request_id)
    .execute(&mut *tx)
    .await?;
    if flipped.rows_affected() == 0 {
        return Err(FriendshipError::RequestNotFound);
    }

    ensure_row(&mut tx, user_id).await?;
    ensure_row(&mut tx, request.sender_id).await?;

    // Bidirectional adjacency update.
    sqlx::query(
        "UPDATE friendships SET
             friend_ids       = array_append(array_remove(friend_ids, $2), $2),
             pending_received = array_remove(pending_received, $2),
             updated_at       = now()
         WHERE user_id = $1",
    )
    .bind(user_id)
    .bind(request.sender_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE friendships SET
             friend_ids   = array_append(array_remove(friend_ids, $2), $2),
             pending_sent = array_remove(pending_sent, $2),
             updated_at   = now()
         WHERE user_id = $1",
    )
    .bind(request.sender_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    // Atomic counter side-effects.
    sqlx::query("UPDATE users SET friends_count = friends_count + 1 WHERE id = ANY($1)")
        .bind(vec![user_id, request.sender_id])
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Reject a friend request, clearing both pending sets.
///
/// # Errors
///
/// Same contract as [`accept_request`], without counter effects.
pub async fn reject_request(pool: &PgPool, request_id: Uuid, user_id: Uuid) -> Result<(), FriendshipError> {
    let mut tx = pool.begin().await?;

    let request = sqlx::query_as::<_, FriendRequest>(
        "SELECT id, sender_id, receiver_id, status FROM friend_requests WHERE id = $1",
    )
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(FriendshipError::RequestNotFound)?;

    if request.receiver_id != user_id {
        return Err(FriendshipError::NotReceiver);
    }

    let flipped = sqlx::query(
        "UPDATE friend_requests SET status = 'REJECTED', updated_at = now()
         WHERE id = $1 AND status = 'PENDING'",
    )
    .bind(request_id)
    .execute(&mut *tx)
    .await?;
    if flipped.rows_affected() == 0 {
        return Err(FriendshipError::RequestNotFound);
    }

    sqlx::query(
        "UPDATE friendships SET pending_received = array_remove(pending_received, $2), updated_at = now()
         WHERE user_id = $1",
    )
    .bind(user_id)
    .bind(request.sender_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE friendships SET pending_sent = array_remove(pending_sent, $2), updated_at = now()
         WHERE user_id = $1",
    )
    .bind(request.sender_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

// =============================================================================
// QUERIES
// =============================================================================

/// Accepted friend ids for a user. Absent adjacency row means no friends.
///
/// # Errors
///
/// Storage errors only.
pub async fn get_friends(pool: &PgPool, user_id: Uuid) -> Result<Vec<Uuid>, FriendshipError> {
    let row: Option<(Vec<Uuid>,)> = sqlx::query_as("SELECT friend_ids FROM friendships WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(ids,)| ids).unwrap_or_default())
}

/// Membership check on the adjacency array; covered by the primary key plus
/// array containment.
///
/// # Errors
///
/// Storage errors only.
pub async fn are_friends(pool: &PgPool, user_id: Uuid, other_id: Uuid) -> Result<bool, FriendshipError> {
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM friendships WHERE user_id = $1 AND friend_ids @> ARRAY[$2]::uuid[])",
    )
    .bind(user_id)
    .bind(other_id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Relationship status between the caller and another user.
///
/// # Errors
///
/// Storage errors only.
pub async fn status(pool: &PgPool, user_id: Uuid, target_id: Uuid) -> Result<FriendStatus, FriendshipError> {
    if are_friends(pool, user_id, target_id).await? {
        return Ok(FriendStatus::AreFriends);
    }

    let row: Option<(Vec<Uuid>, Vec<Uuid>)> =
        sqlx::query_as("SELECT pending_sent, pending_received FROM friendships WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    if let Some((sent, received)) = row {
        if sent.contains(&target_id) || received.contains(&target_id) {
            return Ok(FriendStatus::Pending);
        }
    }
    Ok(FriendStatus::NotFriends)
}

// =============================================================================
// INTERNAL
// =============================================================================

async fn ensure_row(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO friendships (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn add_to_set(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    column: &str,
    member: Uuid,
) -> Result<(), sqlx::Error> {
    // Column names come from this module only, never from input.
    let query = format!(
        "UPDATE friendships SET {column} = array_append(array_remove({column}, $2), $2), updated_at = now()
         WHERE user_id = $1"
    );
    sqlx::query(&query).bind(user_id).bind(member).execute(&mut **tx).await?;
    Ok(())
}
